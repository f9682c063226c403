use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use techpack_core::clone::{CloneIdentity, CloneSection, clone_sections};
use techpack_core::diff::changed_sections;
use techpack_core::page::total_pages;
use techpack_core::{
    Record, RecordId, RecordStatus, Revision, RevisionAction, RevisionId, RevisionStatus,
};
use techpack_engine::normalize::record_patch;
use techpack_engine::reconcile::apply_content;
use techpack_engine::{ListQuery, RevisionQuery, Transport, TransportError};

/// Server endpoints, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Create,
    Clone,
    Get,
    Update,
    Delete,
    Revisions,
    Revert,
    Approve,
    Reject,
    Comment,
}

/// Response layouts the server has been observed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseShape {
    /// Entities and arrays as-is.
    #[default]
    Bare,
    /// `{ success, data }` envelopes.
    Wrapped,
    /// `{ success, data: { techPack } }` and `{ data: { techPacks, total } }`.
    Nested,
    /// `_id` keys, article fields on the record, aliased collection names.
    Legacy,
}

#[derive(Default)]
struct ServerState {
    records: Vec<Record>,
    revisions: Vec<Revision>,
    shape: ResponseShape,
    offline: bool,
    failures: HashMap<Op, VecDeque<TransportError>>,
    calls: HashMap<Op, usize>,
}

impl ServerState {
    fn gate(&mut self, op: Op) -> Result<(), TransportError> {
        *self.calls.entry(op).or_default() += 1;
        if self.offline {
            return Err(TransportError::Unreachable("fake server is offline".into()));
        }
        if let Some(err) = self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            debug!(?op, error = %err, "injected failure");
            return Err(err);
        }
        Ok(())
    }

    fn record(&self, id: &RecordId) -> Result<&Record, TransportError> {
        self.records
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| TransportError::server(404, format!("tech pack {id} not found")))
    }

    fn record_mut(&mut self, id: &RecordId) -> Result<&mut Record, TransportError> {
        self.records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| TransportError::server(404, format!("tech pack {id} not found")))
    }

    fn revision_mut(&mut self, id: &RevisionId) -> Result<&mut Revision, TransportError> {
        self.revisions
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| TransportError::server(404, format!("revision {id} not found")))
    }

    fn next_version(&self, record_id: &RecordId) -> u32 {
        self.revisions
            .iter()
            .filter(|r| &r.record_id == record_id)
            .map(|r| r.version)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Article codes are unique across records.
    fn check_code(&self, code: &str, field: &str, except: Option<&RecordId>) -> Result<(), TransportError> {
        let taken = self
            .records
            .iter()
            .any(|r| r.article_info.article_code == code && Some(&r.id) != except);
        if taken {
            return Err(TransportError::Server {
                status: 422,
                message: "Validation failed".into(),
                field_errors: BTreeMap::from([(field.to_string(), "already exists".to_string())]),
            });
        }
        Ok(())
    }

    fn append_revision(&mut self, before: &Record, after: &Record, reverted_from: Option<u32>) -> RevisionId {
        let revision = Revision {
            id: RevisionId::generate(),
            record_id: after.id.clone(),
            version: after.version,
            status: RevisionStatus::Pending,
            changes: changed_sections(before, after),
            snapshot: Some(after.clone()),
            reverted_from,
            created_by: after.updated_by.clone(),
            created_at: after.updated_at,
            ..Default::default()
        };
        let id = revision.id.clone();
        self.revisions.push(revision);
        id
    }
}

/// In-memory stand-in for the tech pack API.
pub struct FakeServer {
    actor: String,
    state: Mutex<ServerState>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_payload(payload: &Value) -> Result<Record, TransportError> {
    record_patch(payload)
        .map(|patch| patch.into_record())
        .map_err(|e| TransportError::server(400, e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn legacy_record(record: &Record) -> Value {
    let Value::Object(mut map) = to_json(record) else {
        return Value::Null;
    };
    if let Some(id) = map.remove("id") {
        map.insert("_id".into(), id);
    }
    if let Some(Value::Object(info)) = map.remove("articleInfo") {
        for (key, value) in info {
            let key = if key == "productName" { "articleName".to_string() } else { key };
            map.insert(key, value);
        }
    }
    if let Some(bom) = map.remove("bom") {
        map.insert("bomItems".into(), json!({ "items": bom }));
    }
    if let Some(colorways) = map.remove("colorways") {
        map.insert("colorWays".into(), colorways);
    }
    if record.status == RecordStatus::InReview {
        map.insert("status".into(), json!("Process"));
    }
    map.remove("completeness");
    Value::Object(map)
}

fn legacy_revision(revision: &Revision) -> Value {
    let Value::Object(mut map) = to_json(revision) else {
        return Value::Null;
    };
    if let Some(id) = map.remove("id") {
        map.insert("_id".into(), id);
    }
    if let Some(record_id) = map.remove("recordId") {
        map.insert("techPackId".into(), record_id);
    }
    if let Some(snapshot) = &revision.snapshot {
        map.insert("snapshot".into(), legacy_record(snapshot));
    }
    Value::Object(map)
}

impl FakeServer {
    pub fn new() -> Self {
        Self::with_shape(ResponseShape::Bare)
    }

    pub fn with_shape(shape: ResponseShape) -> Self {
        Self {
            actor: "server-user".into(),
            state: Mutex::new(ServerState {
                shape,
                ..Default::default()
            }),
        }
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Fail the next call to `op` with `err`. Queued failures are consumed
    /// in order.
    pub async fn fail_next(&self, op: Op, err: TransportError) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub async fn calls(&self, op: Op) -> usize {
        self.state.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    pub async fn record(&self, id: &RecordId) -> Option<Record> {
        self.state.lock().await.record(id).ok().cloned()
    }

    pub async fn record_count(&self) -> usize {
        self.state.lock().await.records.len()
    }

    /// Ledger for `record_id`, oldest first.
    pub async fn revisions_of(&self, record_id: &RecordId) -> Vec<Revision> {
        let state = self.state.lock().await;
        let mut revisions: Vec<Revision> = state
            .revisions
            .iter()
            .filter(|r| &r.record_id == record_id)
            .cloned()
            .collect();
        revisions.sort_by_key(|r| r.version);
        revisions
    }

    /// Store a record directly, bypassing the API.
    pub async fn seed(&self, mut record: Record) -> RecordId {
        if record.id.is_unsaved() {
            record.id = RecordId::generate();
        }
        if record.version == 0 {
            record.version = 1;
        }
        record.refresh_completeness();
        let id = record.id.clone();
        self.state.lock().await.records.push(record);
        id
    }

    fn render_record(shape: ResponseShape, record: &Record) -> Value {
        match shape {
            ResponseShape::Bare => to_json(record),
            ResponseShape::Wrapped => json!({ "success": true, "data": to_json(record) }),
            ResponseShape::Nested => json!({ "success": true, "data": { "techPack": to_json(record) } }),
            ResponseShape::Legacy => legacy_record(record),
        }
    }

    fn render_ack(shape: ResponseShape) -> Value {
        match shape {
            ResponseShape::Bare => json!({}),
            _ => json!({ "success": true }),
        }
    }

    /// Errors with field details travel in-band for enveloped shapes.
    fn render_error(shape: ResponseShape, err: TransportError) -> Result<Value, TransportError> {
        match (shape, err) {
            (
                ResponseShape::Wrapped | ResponseShape::Nested,
                TransportError::Server {
                    message,
                    field_errors,
                    ..
                },
            ) if !field_errors.is_empty() => {
                let errors: Vec<Value> = field_errors
                    .into_iter()
                    .map(|(field, message)| json!({ "field": field, "message": message }))
                    .collect();
                Ok(json!({ "success": false, "message": message, "errors": errors }))
            }
            (_, err) => Err(err),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn list_records(&self, query: &ListQuery) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::List)?;

        let needle = query.query.as_deref().map(str::to_lowercase);
        let mut matching: Vec<&Record> = state
            .records
            .iter()
            .filter(|r| query.status.is_none_or(|s| r.status == s))
            .filter(|r| {
                needle.as_deref().is_none_or(|n| {
                    r.article_info.article_code.to_lowercase().contains(n)
                        || r.article_info.product_name.to_lowercase().contains(n)
                })
            })
            .collect();
        matching.reverse();

        let limit = query.limit.max(1);
        let total = matching.len() as u64;
        let pages = total_pages(total, limit);
        let start = (query.page.max(1) as usize - 1) * limit as usize;
        let page: Vec<&Record> = matching.into_iter().skip(start).take(limit as usize).collect();

        Ok(match state.shape {
            ResponseShape::Bare => Value::Array(page.iter().map(|r| to_json(*r)).collect()),
            ResponseShape::Wrapped => json!({
                "success": true,
                "data": page.iter().map(|r| to_json(*r)).collect::<Vec<_>>(),
                "pagination": { "total": total, "page": query.page, "totalPages": pages },
            }),
            ResponseShape::Nested => json!({
                "success": true,
                "data": {
                    "techPacks": page.iter().map(|r| to_json(*r)).collect::<Vec<_>>(),
                    "total": total,
                    "page": query.page,
                    "totalPages": pages,
                },
            }),
            ResponseShape::Legacy => json!({
                "items": page.iter().map(|r| legacy_record(r)).collect::<Vec<_>>(),
                "total": total,
                "page": query.page,
                "totalPages": pages,
            }),
        })
    }

    async fn create_record(&self, payload: &Value) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Create)?;
        let shape = state.shape;

        let mut record = parse_payload(payload)?;
        if let Err(err) = state.check_code(&record.article_info.article_code, "articleInfo.articleCode", None) {
            return Self::render_error(shape, err);
        }

        let now = Utc::now();
        record.id = RecordId::generate();
        record.version = state.next_version(&record.id);
        record.status = RecordStatus::Draft;
        record.created_by = Some(self.actor.clone());
        record.updated_by = Some(self.actor.clone());
        record.created_at = Some(now);
        record.updated_at = Some(now);
        record.refresh_completeness();

        state.append_revision(&Record::template(), &record, None);
        state.records.push(record.clone());
        debug!(record = %record.id, "created");
        Ok(Self::render_record(shape, &record))
    }

    async fn clone_record(
        &self,
        source_id: &RecordId,
        identity: &CloneIdentity,
        sections: &[CloneSection],
    ) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Clone)?;
        let shape = state.shape;

        if let Err(err) = state.check_code(&identity.new_article_code, "newArticleCode", None) {
            return Self::render_error(shape, err);
        }
        let source = state.record(source_id)?.clone();
        let sections: BTreeSet<CloneSection> = sections.iter().copied().collect();
        let record = clone_sections(
            &source,
            RecordId::generate(),
            identity,
            &sections,
            &self.actor,
            Utc::now(),
        );
        state.records.push(record.clone());
        Ok(Self::render_record(shape, &record))
    }

    async fn get_record(&self, id: &RecordId) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Get)?;
        let record = state.record(id)?;
        Ok(Self::render_record(state.shape, record))
    }

    async fn update_record(&self, id: &RecordId, payload: &Value) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Update)?;
        let shape = state.shape;

        let incoming = record_patch(payload).map_err(|e| TransportError::server(400, e.to_string()))?;
        if let Some(info) = &incoming.article_info
            && let Err(err) = state.check_code(&info.article_code, "articleInfo.articleCode", Some(id))
        {
            return Self::render_error(shape, err);
        }

        let before = state.record(id)?.clone();
        let version = state.next_version(id).max(before.version + 1);
        let actor = self.actor.clone();
        let record = state.record_mut(id)?;
        apply_content(record, &incoming);
        if let Some(status) = incoming.status {
            record.status = status;
        }
        record.version = version;
        record.updated_by = Some(actor);
        record.updated_at = Some(Utc::now());
        record.refresh_completeness();
        let after = record.clone();

        state.append_revision(&before, &after, None);
        Ok(Self::render_record(shape, &after))
    }

    async fn delete_record(&self, id: &RecordId) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Delete)?;
        state.record(id)?;
        state.records.retain(|r| &r.id != id);
        state.revisions.retain(|r| &r.record_id != id);
        Ok(Self::render_ack(state.shape))
    }

    async fn list_revisions(
        &self,
        record_id: &RecordId,
        query: &RevisionQuery,
    ) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Revisions)?;
        state.record(record_id)?;

        let mut revisions: Vec<&Revision> = state
            .revisions
            .iter()
            .filter(|r| &r.record_id == record_id)
            .collect();
        revisions.sort_by(|a, b| b.version.cmp(&a.version));
        let total = revisions.len() as u64;
        let limit = query.limit.max(1);
        let start = (query.page.max(1) as usize - 1) * limit as usize;
        let page: Vec<&Revision> = revisions.into_iter().skip(start).take(limit as usize).collect();
        let pagination = json!({
            "total": total,
            "page": query.page,
            "totalPages": total_pages(total, limit),
        });

        Ok(match state.shape {
            ResponseShape::Bare => Value::Array(page.iter().map(|r| to_json(*r)).collect()),
            ResponseShape::Wrapped => json!({
                "success": true,
                "data": page.iter().map(|r| to_json(*r)).collect::<Vec<_>>(),
                "pagination": pagination,
            }),
            ResponseShape::Nested => json!({
                "success": true,
                "data": {
                    "revisions": page.iter().map(|r| to_json(*r)).collect::<Vec<_>>(),
                    "pagination": pagination,
                },
            }),
            ResponseShape::Legacy => json!({
                "revisions": page.iter().map(|r| legacy_revision(r)).collect::<Vec<_>>(),
            }),
        })
    }

    async fn revert_revision(
        &self,
        record_id: &RecordId,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Revert)?;
        let shape = state.shape;

        let target = state
            .revisions
            .iter()
            .find(|r| &r.id == revision_id && &r.record_id == record_id)
            .cloned()
            .ok_or_else(|| TransportError::server(404, format!("revision {revision_id} not found")))?;
        let snapshot = target
            .snapshot
            .ok_or_else(|| TransportError::server(409, "revision has no snapshot"))?;

        let before = state.record(record_id)?.clone();
        let version = state.next_version(record_id).max(before.version + 1);
        let actor = self.actor.clone();
        let record = state.record_mut(record_id)?;
        record.article_info = snapshot.article_info;
        record.bom = snapshot.bom;
        record.measurements = snapshot.measurements;
        record.how_to_measures = snapshot.how_to_measures;
        record.colorways = snapshot.colorways;
        record.packing = snapshot.packing;
        record.version = version;
        record.updated_by = Some(actor);
        record.updated_at = Some(Utc::now());
        record.refresh_completeness();
        let after = record.clone();

        let new_id = state.append_revision(&before, &after, Some(target.version));
        if let Some(reason) = reason
            && let Ok(revision) = state.revision_mut(&new_id)
        {
            revision.decision_reason = Some(reason.to_string());
        }

        Ok(match shape {
            ResponseShape::Bare => json!({ "newRevisionId": new_id }),
            ResponseShape::Wrapped => json!({ "success": true, "data": { "newRevisionId": new_id } }),
            ResponseShape::Nested => json!({
                "success": true,
                "data": { "revision": { "_id": new_id, "version": version } },
            }),
            ResponseShape::Legacy => json!({ "revisionId": new_id }),
        })
    }

    async fn approve_revision(
        &self,
        revision_id: &RevisionId,
        reason: Option<&str>,
    ) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Approve)?;
        let actor = self.actor.clone();
        let action = RevisionAction::Approve {
            reason: reason.map(str::to_string),
        };
        state
            .revision_mut(revision_id)?
            .decide(&action, &actor, Utc::now())
            .map_err(|e| TransportError::server(409, e.to_string()))?;
        Ok(Self::render_ack(state.shape))
    }

    async fn reject_revision(&self, revision_id: &RevisionId, reason: &str) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Reject)?;
        let actor = self.actor.clone();
        let action = RevisionAction::Reject {
            reason: reason.to_string(),
        };
        state
            .revision_mut(revision_id)?
            .decide(&action, &actor, Utc::now())
            .map_err(|e| TransportError::server(409, e.to_string()))?;
        Ok(Self::render_ack(state.shape))
    }

    async fn add_comment(&self, revision_id: &RevisionId, text: &str) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.gate(Op::Comment)?;
        let actor = self.actor.clone();
        state
            .revision_mut(revision_id)?
            .add_comment(&actor, text, Utc::now())
            .map_err(|e| TransportError::server(422, e.to_string()))?;
        Ok(Self::render_ack(state.shape))
    }
}
