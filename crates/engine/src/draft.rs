use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use techpack_core::{DraftKey, EditorTab, Record};
use techpack_storage::LocalStore;

use crate::reconcile::EditorState;

/// Bumped whenever the envelope layout changes. Drafts written under any
/// other version are discarded on load.
pub const DRAFT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftEnvelope {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: Record,
    pub current_tab: EditorTab,
    pub has_unsaved_changes: bool,
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    version: u32,
}

/// Hashed portion of an envelope. `saved_at` is left out so re-saving
/// unchanged content is a no-op.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedBody<'a> {
    version: u32,
    state: &'a Record,
    current_tab: EditorTab,
    has_unsaved_changes: bool,
    last_saved: Option<DateTime<Utc>>,
}

impl DraftEnvelope {
    fn body(&self) -> HashedBody<'_> {
        HashedBody {
            version: self.version,
            state: &self.state,
            current_tab: self.current_tab,
            has_unsaved_changes: self.has_unsaved_changes,
            last_saved: self.last_saved,
        }
    }

    fn content_hash(&self) -> Result<[u8; 32], rmp_serde::encode::Error> {
        let bytes = rmp_serde::to_vec_named(&self.body())?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }
}

/// Schema-checked draft persistence over a [`LocalStore`]. Storage failures
/// are logged and swallowed; callers only learn whether a write happened.
#[derive(Debug, Clone, Copy)]
pub struct DraftStore {
    schema_version: u32,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self {
            schema_version: DRAFT_SCHEMA_VERSION,
        }
    }
}

impl DraftStore {
    pub fn with_schema_version(schema_version: u32) -> Self {
        Self { schema_version }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn capture(&self, state: &EditorState, now: DateTime<Utc>) -> DraftEnvelope {
        DraftEnvelope {
            version: self.schema_version,
            saved_at: now,
            state: state.record.clone(),
            current_tab: state.current_tab,
            has_unsaved_changes: state.has_unsaved_changes,
            last_saved: state.last_saved,
        }
    }

    /// Returns `true` when bytes were written.
    pub fn save<S: LocalStore>(&self, store: &mut S, key: &DraftKey, envelope: &DraftEnvelope) -> bool {
        let encoded = rmp_serde::to_vec_named(envelope)
            .and_then(|bytes| envelope.content_hash().map(|hash| (bytes, hash)));
        let (bytes, hash) = match encoded {
            Ok(pair) => pair,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode draft");
                return false;
            }
        };

        match store.put_draft(key, &bytes, &hash) {
            Ok(written) => {
                if written {
                    debug!(key = %key, bytes = bytes.len(), "draft saved");
                } else {
                    debug!(key = %key, "draft unchanged, write skipped");
                }
                written
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to persist draft");
                false
            }
        }
    }

    /// Absent, unreadable and schema-mismatched drafts all load as `None`;
    /// the latter two are deleted.
    pub fn load<S: LocalStore>(&self, store: &mut S, key: &DraftKey) -> Option<DraftEnvelope> {
        let stored = match store.get_draft(key) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read draft");
                return None;
            }
        };

        let header: EnvelopeHeader = match rmp_serde::from_slice(&stored.payload) {
            Ok(header) => header,
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable draft");
                self.clear(store, key);
                return None;
            }
        };
        if header.version != self.schema_version {
            warn!(
                key = %key,
                found = header.version,
                expected = self.schema_version,
                "discarding draft with mismatched schema version"
            );
            self.clear(store, key);
            return None;
        }

        match rmp_serde::from_slice::<DraftEnvelope>(&stored.payload) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable draft");
                self.clear(store, key);
                None
            }
        }
    }

    pub fn clear<S: LocalStore>(&self, store: &mut S, key: &DraftKey) -> bool {
        match store.delete_draft(key) {
            Ok(removed) => {
                if removed {
                    debug!(key = %key, "draft cleared");
                }
                removed
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to clear draft");
                false
            }
        }
    }
}

/// Idle-interval debounce. Each edit pushes the deadline out; the event loop
/// flushes once the deadline passes.
#[derive(Debug, Clone)]
pub struct Autosave {
    idle: Duration,
    deadline: Option<Instant>,
}

impl Autosave {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.idle);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Disarm and report `true` if the deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.due(now) {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}
