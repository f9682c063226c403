use chrono::Utc;
use tracing::{debug, info};

use techpack_core::{CoreError, Pagination, RecordId, Revision, RevisionAction, RevisionId};

use crate::error::EngineError;
use crate::normalize::{normalize_ack, normalize_new_revision_id, normalize_revisions};
use crate::transport::{RevisionQuery, Transport};

/// Client-side mirror of one record's revision history, oldest first.
#[derive(Debug, Clone, Default)]
pub struct RevisionLedger {
    record_id: Option<RecordId>,
    revisions: Vec<Revision>,
    pagination: Pagination,
    highlighted: Option<RevisionId>,
}

impl RevisionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn get(&self, id: &RevisionId) -> Option<&Revision> {
        self.revisions.iter().find(|r| &r.id == id)
    }

    /// The rollback revision created by the most recent revert.
    pub fn highlighted(&self) -> Option<&Revision> {
        self.highlighted.as_ref().and_then(|id| self.get(id))
    }

    pub fn highlight(&mut self, id: RevisionId) {
        self.highlighted = Some(id);
    }

    /// Replace the mirror with the server's ledger for `record_id`. On
    /// failure the previous mirror is left as it was.
    pub async fn load<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        record_id: &RecordId,
    ) -> Result<&[Revision], EngineError> {
        let body = transport
            .list_revisions(record_id, &RevisionQuery::default())
            .await?;
        let page = normalize_revisions(&body)?;

        if self.record_id.as_ref() != Some(record_id) {
            self.highlighted = None;
        }
        self.record_id = Some(record_id.clone());
        self.revisions = page
            .revisions
            .into_iter()
            .map(|mut revision| {
                if revision.record_id.is_empty() {
                    revision.record_id = record_id.clone();
                }
                revision
            })
            .collect();
        self.pagination = page.pagination;
        debug!(record = %record_id, revisions = self.revisions.len(), "revision ledger loaded");
        Ok(&self.revisions)
    }

    /// Pending -> Approved/Rejected. A decision on a revision already known
    /// to be terminal is refused without a round trip.
    async fn decide<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        revision_id: &RevisionId,
        action: RevisionAction,
        actor: &str,
    ) -> Result<(), EngineError> {
        match self.get(revision_id) {
            Some(revision) => {
                revision.status.apply(&action)?;
            }
            None => action.check()?,
        }

        let body = match &action {
            RevisionAction::Approve { reason } => {
                transport
                    .approve_revision(revision_id, reason.as_deref())
                    .await?
            }
            RevisionAction::Reject { reason } => {
                transport.reject_revision(revision_id, reason).await?
            }
        };
        normalize_ack(&body)?;

        if let Some(revision) = self.revisions.iter_mut().find(|r| &r.id == revision_id) {
            revision.decide(&action, actor, Utc::now())?;
        }
        info!(revision = %revision_id, action = action.as_str(), "revision decided");
        Ok(())
    }

    pub async fn approve<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        revision_id: &RevisionId,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<(), EngineError> {
        let action = RevisionAction::Approve {
            reason: reason.map(str::to_string),
        };
        self.decide(transport, revision_id, action, actor).await
    }

    pub async fn reject<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        revision_id: &RevisionId,
        reason: &str,
        actor: &str,
    ) -> Result<(), EngineError> {
        let action = RevisionAction::Reject {
            reason: reason.to_string(),
        };
        self.decide(transport, revision_id, action, actor).await
    }

    /// Append a comment. Allowed in every approval state. The ledger is
    /// reloaded so the thread shows the server's copy.
    pub async fn comment<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        revision_id: &RevisionId,
        text: &str,
    ) -> Result<(), EngineError> {
        if text.trim().is_empty() {
            return Err(CoreError::field("message", "comment cannot be empty").into());
        }
        let body = transport.add_comment(revision_id, text).await?;
        normalize_ack(&body)?;

        if let Some(record_id) = self.record_id.clone() {
            self.load(transport, &record_id).await?;
        }
        Ok(())
    }

    /// Ask the server to restore `revision_id`. History is not touched here;
    /// the caller reloads it once the live record has been refreshed.
    pub async fn request_revert<T: Transport + ?Sized>(
        &self,
        transport: &T,
        record_id: &RecordId,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<RevisionId, EngineError> {
        if let Some(loaded) = &self.record_id
            && loaded == record_id
            && self.get(revision_id).is_none()
        {
            return Err(EngineError::RevisionNotFound(revision_id.to_string()));
        }
        let body = transport
            .revert_revision(record_id, revision_id, reason)
            .await?;
        let new_id = normalize_new_revision_id(&body)?;
        info!(record = %record_id, from = %revision_id, rollback = %new_id, "revision reverted");
        Ok(new_id)
    }
}
