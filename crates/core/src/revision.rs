use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{RecordId, RevisionId};
use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RevisionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Pending is the only state that accepts a decision.
    pub fn apply(&self, action: &RevisionAction) -> Result<Self, CoreError> {
        if self.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.as_str(),
                action: action.as_str(),
            });
        }
        action.check()?;
        Ok(match action {
            RevisionAction::Approve { .. } => Self::Approved,
            RevisionAction::Reject { .. } => Self::Rejected,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionAction {
    Approve { reason: Option<String> },
    Reject { reason: String },
}

impl RevisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Approve { reason } => reason.as_deref(),
            Self::Reject { reason } => Some(reason.as_str()),
        }
    }

    /// Reject must carry a reason; approve may omit one.
    pub fn check(&self) -> Result<(), CoreError> {
        match self {
            Self::Reject { reason } if reason.trim().is_empty() => {
                Err(CoreError::field("reason", "a reason is required to reject"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RevisionComment {
    pub user: String,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry of a record's append-only history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Revision {
    pub id: RevisionId,
    pub record_id: RecordId,
    pub version: u32,
    pub status: RevisionStatus,
    pub changes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverted_from: Option<u32>,
    pub comments: Vec<RevisionComment>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
}

impl Revision {
    pub fn decide(
        &mut self,
        action: &RevisionAction,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.status = self.status.apply(action)?;
        self.decided_by = Some(actor.to_string());
        self.decided_at = Some(at);
        self.decision_reason = action.reason().map(str::to_string);
        Ok(())
    }

    /// Comments are accepted regardless of approval state.
    pub fn add_comment(&mut self, user: &str, message: &str, at: DateTime<Utc>) -> Result<(), CoreError> {
        if message.trim().is_empty() {
            return Err(CoreError::field("message", "comment cannot be empty"));
        }
        self.comments.push(RevisionComment {
            user: user.to_string(),
            message: message.to_string(),
            created_at: Some(at),
        });
        Ok(())
    }
}
