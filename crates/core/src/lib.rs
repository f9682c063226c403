pub mod clone;
pub mod colorway;
pub mod completeness;
pub mod diff;
pub mod error;
pub mod ids;
pub mod model;
pub mod page;
pub mod revision;
pub mod validate;

pub use error::CoreError;
pub use ids::*;
pub use model::*;
pub use page::Pagination;
pub use revision::{Revision, RevisionAction, RevisionComment, RevisionStatus};
