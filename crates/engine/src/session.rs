//! The editor session: live state of the open record plus everything it
//! delegates to (drafts, list cache, revision ledger).
//!
//! A session is driven from a single task. Methods that talk to the server
//! take `&mut self` and await inline, except saving, which is split into
//! [`EditorSession::begin_save`], [`SaveTicket::dispatch`] and
//! [`EditorSession::complete_save`] so edits can continue while the request
//! is outstanding.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use techpack_core::clone::{CloneIdentity, CloneSection};
use techpack_core::validate::prepare_for_save;
use techpack_core::{DraftKey, EditorTab, Record, RecordId, RevisionId};
use techpack_storage::{LocalStore, SqliteStore};

use crate::config::EngineConfig;
use crate::draft::{Autosave, DraftStore};
use crate::error::EngineError;
use crate::ledger::RevisionLedger;
use crate::list_cache::{ListCache, ListOutcome};
use crate::normalize::{ListPage, RecordPatch, normalize_ack, normalize_server_record};
use crate::reconcile::{EditorState, MergeOutcome, WriteMode, apply_patch, initial_state, merge_draft};
use crate::transport::{ListQuery, Transport, TransportError};

const DEFAULT_ACTOR: &str = "local";

/// A save that has been validated and handed out for dispatch.
#[derive(Debug, Clone)]
pub struct SaveTicket {
    key: DraftKey,
    record_id: RecordId,
    payload: Record,
    generation: u64,
    epoch: u64,
}

impl SaveTicket {
    pub fn is_create(&self) -> bool {
        self.record_id.is_unsaved()
    }

    fn body(&self) -> Value {
        let mut body = match serde_json::to_value(&self.payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to encode save payload");
                Value::Null
            }
        };
        if let Value::Object(map) = &mut body {
            map.remove("completeness");
            if self.is_create() {
                map.remove("id");
            }
        }
        body
    }

    /// Send the save. Create for an unsaved record, update otherwise.
    pub async fn dispatch<T: Transport + ?Sized>(&self, transport: &T) -> Result<Value, TransportError> {
        let body = self.body();
        if self.is_create() {
            transport.create_record(&body).await
        } else {
            transport.update_record(&self.record_id, &body).await
        }
    }
}

fn same_content(a: &Record, b: &Record) -> bool {
    a.article_info == b.article_info
        && a.bom == b.bom
        && a.measurements == b.measurements
        && a.how_to_measures == b.how_to_measures
        && a.colorways == b.colorways
        && a.packing == b.packing
}

pub struct EditorSession<S: LocalStore, T: Transport + ?Sized> {
    store: S,
    transport: Arc<T>,
    actor: String,
    drafts: DraftStore,
    autosave: Autosave,
    list: ListCache,
    ledger: RevisionLedger,
    state: EditorState,
    /// Bumped whenever a different record is opened or the editor closes.
    epoch: u64,
    in_flight: HashSet<DraftKey>,
    tx: watch::Sender<EditorState>,
}

impl<T: Transport + ?Sized> EditorSession<SqliteStore, T> {
    pub fn from_config(config: &EngineConfig, transport: Arc<T>) -> Result<Self, EngineError> {
        let store = SqliteStore::open(&config.db_path)?;
        Ok(Self::new(store, transport, config))
    }
}

impl<S: LocalStore, T: Transport + ?Sized> EditorSession<S, T> {
    pub fn new(store: S, transport: Arc<T>, config: &EngineConfig) -> Self {
        let list = ListCache::load(&store, config.default_page_size);
        let state = EditorState::default();
        let (tx, _) = watch::channel(state.clone());
        Self {
            store,
            transport,
            actor: DEFAULT_ACTOR.to_string(),
            drafts: DraftStore::default(),
            autosave: Autosave::new(config.autosave_idle),
            list,
            ledger: RevisionLedger::new(),
            state,
            epoch: 0,
            in_flight: HashSet::new(),
            tx,
        }
    }

    /// Name recorded on approval decisions made from this session.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_draft_store(mut self, drafts: DraftStore) -> Self {
        self.drafts = drafts;
        self
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn subscribe(&self) -> watch::Receiver<EditorState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn record(&self) -> &Record {
        &self.state.record
    }

    pub fn ledger(&self) -> &RevisionLedger {
        &self.ledger
    }

    pub fn list_cache(&self) -> &ListCache {
        &self.list
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    fn draft_key(&self) -> DraftKey {
        DraftKey::for_record(&self.state.record.id)
    }

    fn notify(&mut self) {
        self.state.saving = self.in_flight.contains(&self.draft_key());
        self.tx.send_replace(self.state.clone());
    }

    // ========================================================================
    // Opening and closing
    // ========================================================================

    /// Start editing a new record, recovering the shared new-record draft.
    pub fn open_new(&mut self) {
        self.close();
        let draft = self.drafts.load(&mut self.store, &DraftKey::New);
        self.state = initial_state(draft);
        if self.state.recovered_draft {
            info!("recovered new-record draft");
        }
        self.notify();
    }

    /// Load `id` from the server and lay any unsaved draft over it. When the
    /// server cannot be reached a stored draft is still recovered and the
    /// error is returned.
    pub async fn open(&mut self, id: &RecordId) -> Result<(), EngineError> {
        if id.is_unsaved() {
            self.open_new();
            return Ok(());
        }
        self.close();
        let key = DraftKey::Record(id.clone());
        let draft = self.drafts.load(&mut self.store, &key);

        let fetched = match self.transport.get_record(id).await {
            Ok(body) => normalize_server_record(&body),
            Err(e) => Err(e.into()),
        };
        let base = match fetched {
            Ok(patch) => patch.into_record(),
            Err(e) => {
                if let Some(envelope) = draft {
                    warn!(record = %id, error = %e, "server unavailable, editing recovered draft");
                    let mut state = initial_state(Some(envelope));
                    state.record.id = id.clone();
                    self.state = state;
                    self.notify();
                }
                return Err(e);
            }
        };

        if base.id != *id {
            return Err(EngineError::ShapeMismatch(format!(
                "requested {id}, server returned {}",
                base.id
            )));
        }

        let mut state = EditorState {
            record: base,
            ..EditorState::default()
        };
        match draft {
            Some(envelope) if envelope.has_unsaved_changes => {
                info!(record = %id, "recovered unsaved draft");
                state.record = merge_draft(state.record, &envelope.state);
                state.current_tab = envelope.current_tab;
                state.last_saved = envelope.last_saved;
                state.has_unsaved_changes = true;
                state.recovered_draft = true;
            }
            Some(_) => {
                self.drafts.clear(&mut self.store, &key);
            }
            None => {}
        }
        self.state = state;

        if let Err(e) = self.ledger.load(&*self.transport, id).await {
            warn!(record = %id, error = %e, "failed to load revisions");
        }
        self.notify();
        Ok(())
    }

    /// Flush pending edits and leave the record. An in-flight save is not
    /// cancelled; its result is still persisted when it completes.
    pub fn close(&mut self) {
        if self.autosave.is_armed() || self.state.has_unsaved_changes {
            self.commit_draft();
        }
        self.autosave.disarm();
        self.epoch += 1;
        self.ledger.clear();
        self.state = EditorState::default();
        self.notify();
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Apply an operator edit and schedule an autosave.
    pub fn edit(&mut self, f: impl FnOnce(&mut Record)) {
        f(&mut self.state.record);
        self.state.record.refresh_completeness();
        self.state.has_unsaved_changes = true;
        self.state.edit_generation += 1;
        self.autosave.arm(Instant::now());
        self.notify();
    }

    pub fn set_tab(&mut self, tab: EditorTab) {
        self.state.current_tab = tab;
        if self.state.has_unsaved_changes {
            self.autosave.arm(Instant::now());
        }
        self.notify();
    }

    /// Merge a normalized patch with an explicit write mode. A server
    /// refresh merged here keeps the operator's content whenever they have
    /// unsaved edits.
    pub fn merge(&mut self, patch: &RecordPatch, mode: WriteMode) -> Result<MergeOutcome, EngineError> {
        let outcome = apply_patch(&mut self.state, patch, mode, None)?;
        if mode == WriteMode::UserEdit {
            self.autosave.arm(Instant::now());
        }
        self.notify();
        Ok(outcome)
    }

    // ========================================================================
    // Autosave
    // ========================================================================

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave.deadline()
    }

    /// Write the draft if the idle interval has passed.
    pub fn flush_draft_if_due(&mut self, now: Instant) -> bool {
        if self.autosave.take_due(now) {
            self.commit_draft()
        } else {
            false
        }
    }

    /// Write the draft now. Returns `true` when bytes were written.
    pub fn commit_draft(&mut self) -> bool {
        self.autosave.disarm();
        if !self.state.has_unsaved_changes {
            return false;
        }
        let envelope = self.drafts.capture(&self.state, Utc::now());
        let key = self.draft_key();
        self.drafts.save(&mut self.store, &key, &envelope)
    }

    /// Sleep until the pending autosave deadline and flush it.
    pub async fn run_autosave(&mut self) -> bool {
        let mut written = false;
        while let Some(deadline) = self.autosave.deadline() {
            tokio::time::sleep_until(deadline).await;
            written |= self.flush_draft_if_due(Instant::now());
        }
        written
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Validate live state and reserve the save slot for this record.
    pub fn begin_save(&mut self) -> Result<SaveTicket, EngineError> {
        let key = self.draft_key();
        if self.in_flight.contains(&key) {
            return Err(EngineError::SaveInFlight(key.to_string()));
        }
        let payload = prepare_for_save(&self.state.record)?;
        self.commit_draft();

        self.in_flight.insert(key.clone());
        let ticket = SaveTicket {
            key,
            record_id: self.state.record.id.clone(),
            payload,
            generation: self.state.edit_generation,
            epoch: self.epoch,
        };
        debug!(record = %ticket.record_id, generation = ticket.generation, "save started");
        self.notify();
        Ok(ticket)
    }

    /// Fold a save result back into the session.
    ///
    /// On failure the draft is kept and the error returned. On success the
    /// saved record is merged, the list cache is patched and both the list
    /// and the revision ledger are reloaded.
    pub async fn complete_save(
        &mut self,
        ticket: SaveTicket,
        result: Result<Value, TransportError>,
    ) -> Result<Record, EngineError> {
        self.in_flight.remove(&ticket.key);

        let patch = match result.map_err(EngineError::from).and_then(|body| normalize_server_record(&body)) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(record = %ticket.record_id, error = %e, "save failed, draft kept");
                self.notify();
                return Err(e);
            }
        };
        let saved = patch.clone().into_record();
        let saved_key = DraftKey::Record(saved.id.clone());

        if ticket.epoch == self.epoch {
            let edited_since = self.state.edit_generation != ticket.generation;
            apply_patch(&mut self.state, &patch, WriteMode::ServerRefresh, Some(ticket.generation))?;
            self.state.last_saved = Some(Utc::now());
            self.state.recovered_draft = false;
            if ticket.key == DraftKey::New {
                self.drafts.clear(&mut self.store, &DraftKey::New);
            }
            if edited_since {
                self.commit_draft();
            } else {
                self.drafts.clear(&mut self.store, &saved_key);
            }
        } else {
            let key = if ticket.is_create() { DraftKey::New } else { saved_key };
            if let Some(envelope) = self.drafts.load(&mut self.store, &key)
                && same_content(&envelope.state, &ticket.payload)
            {
                self.drafts.clear(&mut self.store, &key);
            }
        }

        if ticket.is_create() {
            self.list.optimistic_insert(&mut self.store, saved.summary());
        } else if !self.list.optimistic_replace(&mut self.store, &saved.id, saved.summary()) {
            self.list.optimistic_insert(&mut self.store, saved.summary());
        }
        info!(record = %saved.id, version = saved.version, created = ticket.is_create(), "record saved");

        let _ = self.list.refresh(&mut self.store, &*self.transport).await;
        if ticket.epoch == self.epoch
            && let Err(e) = self.ledger.load(&*self.transport, &saved.id).await
        {
            warn!(record = %saved.id, error = %e, "failed to reload revisions");
        }
        self.notify();
        Ok(saved)
    }

    pub async fn save(&mut self) -> Result<Record, EngineError> {
        let ticket = self.begin_save()?;
        let transport = self.transport();
        let result = ticket.dispatch(&*transport).await;
        self.complete_save(ticket, result).await
    }

    // ========================================================================
    // Server round trips on the open record
    // ========================================================================

    fn saved_id(&self) -> Result<RecordId, EngineError> {
        if self.state.record.id.is_unsaved() {
            Err(EngineError::RecordNotSaved)
        } else {
            Ok(self.state.record.id.clone())
        }
    }

    /// Re-fetch the open record. Unsaved edits made before the call survive
    /// only if the operator has edited since the request was issued.
    pub async fn refresh(&mut self) -> Result<MergeOutcome, EngineError> {
        let id = self.saved_id()?;
        let issued = self.state.edit_generation;
        let body = self.transport.get_record(&id).await?;
        let patch = normalize_server_record(&body)?;
        let outcome = apply_patch(&mut self.state, &patch, WriteMode::ServerRefresh, Some(issued))?;
        if outcome == MergeOutcome::Applied {
            self.autosave.disarm();
            self.drafts.clear(&mut self.store, &DraftKey::Record(id));
        }
        self.notify();
        Ok(outcome)
    }

    /// Drop unsaved work and return to the last server state, or to an empty
    /// template for a record that was never created.
    ///
    /// Discarding a saved record needs the server: the draft is only cleared
    /// once the fresh copy has arrived. When the fetch fails nothing changes
    /// and the discard can be retried.
    pub async fn discard(&mut self) -> Result<(), EngineError> {
        let key = self.draft_key();
        let tab = self.state.current_tab;
        let state = if self.state.record.id.is_unsaved() {
            EditorState::default()
        } else {
            let body = self.transport.get_record(&self.state.record.id).await?;
            EditorState {
                record: normalize_server_record(&body)?.into_record(),
                ..EditorState::default()
            }
        };

        self.drafts.clear(&mut self.store, &key);
        self.autosave.disarm();
        self.state = EditorState {
            current_tab: tab,
            edit_generation: self.state.edit_generation + 1,
            ..state
        };
        info!(key = %key, "unsaved changes discarded");
        self.notify();
        Ok(())
    }

    /// Restore the content of `revision_id`. The server appends a new
    /// pending revision; its id is returned and highlighted in the ledger.
    /// A failed revert leaves live state and ledger untouched.
    pub async fn revert_to_revision(
        &mut self,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<RevisionId, EngineError> {
        let id = self.saved_id()?;
        let new_id = self
            .ledger
            .request_revert(&*self.transport, &id, revision_id, reason)
            .await?;

        let issued = self.state.edit_generation;
        let body = self.transport.get_record(&id).await?;
        let patch = normalize_server_record(&body)?;
        apply_patch(&mut self.state, &patch, WriteMode::ServerRefresh, Some(issued))?;
        self.autosave.disarm();
        self.drafts.clear(&mut self.store, &DraftKey::Record(id.clone()));

        self.ledger.load(&*self.transport, &id).await?;
        self.ledger.highlight(new_id.clone());
        self.list
            .optimistic_replace(&mut self.store, &id, self.state.record.summary());
        let _ = self.list.refresh(&mut self.store, &*self.transport).await;
        self.notify();
        Ok(new_id)
    }

    pub async fn approve(&mut self, revision_id: &RevisionId, reason: Option<&str>) -> Result<(), EngineError> {
        self.ledger
            .approve(&*self.transport, revision_id, reason, &self.actor)
            .await
    }

    pub async fn reject(&mut self, revision_id: &RevisionId, reason: &str) -> Result<(), EngineError> {
        self.ledger
            .reject(&*self.transport, revision_id, reason, &self.actor)
            .await
    }

    pub async fn comment(&mut self, revision_id: &RevisionId, text: &str) -> Result<(), EngineError> {
        self.ledger.comment(&*self.transport, revision_id, text).await
    }

    pub async fn load_revisions(&mut self) -> Result<(), EngineError> {
        let id = self.saved_id()?;
        self.ledger.load(&*self.transport, &id).await?;
        Ok(())
    }

    // ========================================================================
    // Record-level operations
    // ========================================================================

    pub async fn delete(&mut self, id: &RecordId) -> Result<(), EngineError> {
        let body = self.transport.delete_record(id).await?;
        normalize_ack(&body)?;

        self.list.optimistic_remove(&mut self.store, id);
        self.drafts.clear(&mut self.store, &DraftKey::Record(id.clone()));
        if &self.state.record.id == id {
            self.autosave.disarm();
            self.epoch += 1;
            self.ledger.clear();
            self.state = EditorState::default();
        }
        info!(record = %id, "record deleted");

        let _ = self.list.refresh(&mut self.store, &*self.transport).await;
        self.notify();
        Ok(())
    }

    pub async fn clone_record(
        &mut self,
        source_id: &RecordId,
        identity: &CloneIdentity,
        sections: &BTreeSet<CloneSection>,
    ) -> Result<Record, EngineError> {
        let record = crate::clone::clone_record(&*self.transport, source_id, identity, sections).await?;
        self.list.optimistic_insert(&mut self.store, record.summary());
        let _ = self.list.refresh(&mut self.store, &*self.transport).await;
        Ok(record)
    }

    pub async fn list(&mut self, query: ListQuery) -> Result<ListOutcome, EngineError> {
        self.list.list(&mut self.store, &*self.transport, query).await
    }

    pub async fn refresh_list(&mut self) -> Result<ListPage, EngineError> {
        self.list.refresh(&mut self.store, &*self.transport).await
    }
}
