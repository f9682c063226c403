use std::collections::BTreeMap;

use techpack_core::CoreError;
use techpack_storage::StorageError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("unexpected response shape: {0}")]
    ShapeMismatch(String),

    #[error("a save is already in flight for {0}")]
    SaveInFlight(String),

    #[error("record has not been saved yet")]
    RecordNotSaved,

    #[error("revision not found: {0}")]
    RevisionNotFound(String),
}

impl EngineError {
    /// Field-level messages from client validation or from the server.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Core(e) => e.field_errors(),
            Self::Transport(e) => e.field_errors().clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Core(CoreError::Validation(_)))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
