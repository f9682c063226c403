pub mod clone;
pub mod config;
pub mod draft;
pub mod error;
pub mod ledger;
pub mod list_cache;
pub mod normalize;
pub mod reconcile;
pub mod session;
pub mod transport;

pub use config::EngineConfig;
pub use draft::{Autosave, DRAFT_SCHEMA_VERSION, DraftEnvelope, DraftStore};
pub use error::EngineError;
pub use ledger::RevisionLedger;
pub use list_cache::{ListCache, ListOutcome, ListSource};
pub use normalize::{ListPage, RecordPatch, RevisionPage};
pub use reconcile::{EditorState, MergeOutcome, WriteMode};
pub use session::{EditorSession, SaveTicket};
pub use transport::{ListQuery, RevisionQuery, Transport, TransportError};
