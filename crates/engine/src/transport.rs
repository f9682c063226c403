use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use techpack_core::clone::{CloneIdentity, CloneSection};
use techpack_core::{RecordId, RecordStatus, RevisionId};

static NO_FIELDS: BTreeMap<String, String> = BTreeMap::new();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error {status}: {message}")]
    Server {
        status: u16,
        message: String,
        field_errors: BTreeMap<String, String>,
    },
}

impl TransportError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Server { field_errors, .. } => field_errors,
            _ => &NO_FIELDS,
        }
    }

    /// Network-level failure, as opposed to an answer from the server.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
}

impl ListQuery {
    pub fn first_page(limit: u32) -> Self {
        Self {
            page: 1,
            limit,
            query: None,
            status: None,
        }
    }

    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionQuery {
    pub page: u32,
    pub limit: u32,
}

impl Default for RevisionQuery {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

/// Server operations consumed by the engine. Every call returns the raw JSON
/// body; shape normalization happens in [`crate::normalize`]. Retries, auth
/// refresh and timeouts are the implementor's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn list_records(&self, query: &ListQuery) -> Result<Value, TransportError>;

    async fn create_record(&self, payload: &Value) -> Result<Value, TransportError>;

    async fn clone_record(
        &self,
        source_id: &RecordId,
        identity: &CloneIdentity,
        sections: &[CloneSection],
    ) -> Result<Value, TransportError>;

    async fn get_record(&self, id: &RecordId) -> Result<Value, TransportError>;

    async fn update_record(&self, id: &RecordId, payload: &Value) -> Result<Value, TransportError>;

    async fn delete_record(&self, id: &RecordId) -> Result<Value, TransportError>;

    async fn list_revisions(
        &self,
        record_id: &RecordId,
        query: &RevisionQuery,
    ) -> Result<Value, TransportError>;

    async fn revert_revision(
        &self,
        record_id: &RecordId,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<Value, TransportError>;

    async fn approve_revision(
        &self,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<Value, TransportError>;

    async fn reject_revision(
        &self,
        revision_id: &RevisionId,
        reason: &str,
    ) -> Result<Value, TransportError>;

    async fn add_comment(&self, revision_id: &RevisionId, text: &str) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn list_records(&self, query: &ListQuery) -> Result<Value, TransportError> {
        (**self).list_records(query).await
    }

    async fn create_record(&self, payload: &Value) -> Result<Value, TransportError> {
        (**self).create_record(payload).await
    }

    async fn clone_record(
        &self,
        source_id: &RecordId,
        identity: &CloneIdentity,
        sections: &[CloneSection],
    ) -> Result<Value, TransportError> {
        (**self).clone_record(source_id, identity, sections).await
    }

    async fn get_record(&self, id: &RecordId) -> Result<Value, TransportError> {
        (**self).get_record(id).await
    }

    async fn update_record(&self, id: &RecordId, payload: &Value) -> Result<Value, TransportError> {
        (**self).update_record(id, payload).await
    }

    async fn delete_record(&self, id: &RecordId) -> Result<Value, TransportError> {
        (**self).delete_record(id).await
    }

    async fn list_revisions(
        &self,
        record_id: &RecordId,
        query: &RevisionQuery,
    ) -> Result<Value, TransportError> {
        (**self).list_revisions(record_id, query).await
    }

    async fn revert_revision(
        &self,
        record_id: &RecordId,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<Value, TransportError> {
        (**self).revert_revision(record_id, revision_id, reason).await
    }

    async fn approve_revision(
        &self,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<Value, TransportError> {
        (**self).approve_revision(revision_id, reason).await
    }

    async fn reject_revision(
        &self,
        revision_id: &RevisionId,
        reason: &str,
    ) -> Result<Value, TransportError> {
        (**self).reject_revision(revision_id, reason).await
    }

    async fn add_comment(&self, revision_id: &RevisionId, text: &str) -> Result<Value, TransportError> {
        (**self).add_comment(revision_id, text).await
    }
}
