//! Pure adapters from the server's response bodies to canonical types.
//!
//! The server has answered with several shapes over time: bare objects,
//! `{ success, data }` envelopes, entities nested one level further
//! (`{ data: { techPack } }`), Mongo-style `_id` keys, article fields
//! flattened onto the record, and collections wrapped in `{ items: [...] }`.
//! Everything that crosses the transport boundary goes through this module
//! before it may touch live state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use techpack_core::colorway::sanitize_colorway;
use techpack_core::page::total_pages;
use techpack_core::{
    ArticleInfo, BomItem, Colorway, HowToMeasure, Measurement, PackingInfo, Pagination, RecordId,
    RecordStatus, RecordSummary, Revision, RevisionComment, RevisionId, RevisionStatus,
};

use crate::error::EngineError;
use crate::transport::{ListQuery, TransportError};

const ENVELOPE_KEYS: [&str; 3] = ["data", "result", "payload"];
const RECORD_KEYS: [&str; 5] = ["techPack", "techpack", "record", "item", "doc"];
const RECORD_LIST_KEYS: [&str; 6] = ["techPacks", "techpacks", "records", "items", "docs", "results"];
const REVISION_LIST_KEYS: [&str; 3] = ["revisions", "items", "docs"];
const MAX_DEPTH: usize = 4;

const ARTICLE_FIELDS: [&str; 12] = [
    "articleCode",
    "productName",
    "articleName",
    "brand",
    "season",
    "gender",
    "category",
    "fabricDescription",
    "productDescription",
    "supplier",
    "designer",
    "notes",
];

/// Partial record as read from a payload. `None` means the key was absent,
/// which is different from an explicitly empty collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub id: Option<RecordId>,
    pub article_info: Option<ArticleInfo>,
    pub bom: Option<Vec<BomItem>>,
    pub measurements: Option<Vec<Measurement>>,
    pub how_to_measures: Option<Vec<HowToMeasure>>,
    pub colorways: Option<Vec<Colorway>>,
    pub packing: Option<Option<PackingInfo>>,
    pub status: Option<RecordStatus>,
    pub version: Option<u32>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<RecordSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RevisionPage {
    pub revisions: Vec<Revision>,
    pub pagination: Pagination,
}

fn shape(msg: impl Into<String>) -> EngineError {
    EngineError::ShapeMismatch(msg.into())
}

// ============================================================================
// Scalar helpers
// ============================================================================

fn text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Identifier of a value that may be a plain id or an embedded document.
fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => text(map, &["id", "_id"]),
        _ => None,
    }
}

/// Display name of an actor that may be a string or a user document.
fn actor_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => text(map, &["name", "fullName", "username", "email", "id", "_id"]),
        _ => None,
    }
}

fn number(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().trim_start_matches(['v', 'V']).parse().ok(),
        _ => None,
    })
}

/// Integer field that must fit the narrower type it is stored in.
fn narrow<T: TryFrom<u64>>(value: Option<u64>, what: &str) -> Result<Option<T>, EngineError> {
    value
        .map(|v| T::try_from(v).map_err(|_| shape(format!("{what} {v} out of range"))))
        .transpose()
}

fn timestamp(map: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) => s.parse::<DateTime<Utc>>().ok(),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

/// Clone an element with `_id` lifted to `id` and null-valued keys dropped,
/// so serde defaults apply instead of type errors.
fn tidy(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                if k == "_id" {
                    if !map.contains_key("id")
                        && let Some(id) = id_of(v)
                    {
                        out.insert("id".to_string(), Value::String(id));
                    }
                    continue;
                }
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

// ============================================================================
// In-band failures
// ============================================================================

fn field_errors(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    match value {
        Some(Value::Object(map)) => {
            for (field, msg) in map {
                let message = match msg {
                    Value::String(s) => s.clone(),
                    Value::Object(inner) => text(inner, &["message", "msg"]).unwrap_or_default(),
                    other => other.to_string(),
                };
                out.insert(field.clone(), message);
            }
        }
        Some(Value::Array(items)) => {
            for item in items.iter().filter_map(Value::as_object) {
                if let Some(field) = text(item, &["field", "path", "param"]) {
                    let message = text(item, &["message", "msg"]).unwrap_or_default();
                    out.insert(field, message);
                }
            }
        }
        _ => {}
    }
    out
}

/// A `{ success: false }` body is a server-reported failure even when the
/// transport delivered it as a success.
pub fn check_in_band(value: &Value) -> Result<(), EngineError> {
    let Some(map) = value.as_object() else {
        return Ok(());
    };
    if map.get("success") != Some(&Value::Bool(false)) {
        return Ok(());
    }
    let message = text(map, &["message", "error"]).unwrap_or_else(|| "request failed".to_string());
    let status = narrow::<u16>(number(map, &["status", "statusCode"]), "status")?.unwrap_or(422);
    Err(EngineError::Transport(TransportError::Server {
        status,
        message,
        field_errors: field_errors(map.get("errors").or_else(|| map.get("details"))),
    }))
}

pub fn normalize_ack(value: &Value) -> Result<(), EngineError> {
    check_in_band(value)
}

// ============================================================================
// Records
// ============================================================================

fn looks_like_record(map: &Map<String, Value>) -> bool {
    ["id", "_id", "articleInfo", "articleCode", "bom"]
        .iter()
        .any(|k| map.contains_key(*k))
}

/// Walk down `{ data: { techPack: {...} } }`-style wrappers to the entity.
fn peel_record(value: &Value) -> &Value {
    let mut current = value;
    for _ in 0..MAX_DEPTH {
        let Some(map) = current.as_object() else {
            break;
        };
        if looks_like_record(map) {
            break;
        }
        let next = ENVELOPE_KEYS
            .iter()
            .chain(RECORD_KEYS.iter())
            .find_map(|k| map.get(*k).filter(|v| v.is_object()));
        match next {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

fn collection<T: DeserializeOwned>(
    map: &Map<String, Value>,
    canonical: &str,
    aliases: &[&str],
) -> Result<Option<Vec<T>>, EngineError> {
    let Some(raw) = std::iter::once(canonical)
        .chain(aliases.iter().copied())
        .find_map(|k| map.get(k))
    else {
        return Ok(None);
    };

    let items = match raw {
        Value::Null => return Ok(Some(Vec::new())),
        Value::Array(items) => items,
        Value::Object(inner) => match ["items", "data", canonical].iter().find_map(|k| inner.get(*k)) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => return Ok(Some(Vec::new())),
            None if inner.is_empty() => return Ok(Some(Vec::new())),
            _ => return Err(shape(format!("{canonical} is not a list"))),
        },
        _ => return Err(shape(format!("{canonical} is not a list"))),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(tidy(item)).map_err(|e| shape(format!("{canonical}[{i}]: {e}")))
        })
        .collect::<Result<Vec<T>, _>>()
        .map(Some)
}

fn article_info(map: &Map<String, Value>) -> Result<Option<ArticleInfo>, EngineError> {
    let source = match map.get("articleInfo") {
        Some(Value::Object(_)) => tidy(&map["articleInfo"]),
        Some(Value::Null) => return Ok(Some(ArticleInfo::default())),
        Some(_) => return Err(shape("articleInfo is not an object")),
        None => {
            let flattened: Map<String, Value> = ARTICLE_FIELDS
                .iter()
                .filter_map(|k| map.get(*k).map(|v| (k.to_string(), v.clone())))
                .collect();
            if flattened.is_empty() {
                return Ok(None);
            }
            tidy(&Value::Object(flattened))
        }
    };

    let legacy_name = source
        .as_object()
        .and_then(|m| text(m, &["articleName"]));
    let mut info: ArticleInfo =
        serde_json::from_value(source).map_err(|e| shape(format!("articleInfo: {e}")))?;
    if info.product_name.is_empty()
        && let Some(name) = legacy_name
    {
        info.product_name = name;
    }
    Ok(Some(info))
}

fn packing(map: &Map<String, Value>) -> Result<Option<Option<PackingInfo>>, EngineError> {
    match ["packing", "packingInfo"].iter().find_map(|k| map.get(*k)) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(value @ Value::Object(_)) => serde_json::from_value(tidy(value))
            .map(|p| Some(Some(p)))
            .map_err(|e| shape(format!("packing: {e}"))),
        Some(_) => Err(shape("packing is not an object")),
    }
}

/// Read every recognized field of a record-shaped object.
pub fn record_patch(value: &Value) -> Result<RecordPatch, EngineError> {
    let map = value
        .as_object()
        .ok_or_else(|| shape("record is not an object"))?;

    let status = match map.get("status") {
        Some(Value::String(s)) => Some(
            RecordStatus::parse(s).ok_or_else(|| shape(format!("unknown status {s:?}")))?,
        ),
        _ => None,
    };

    Ok(RecordPatch {
        id: ["id", "_id"]
            .iter()
            .find_map(|k| map.get(*k).and_then(id_of))
            .map(RecordId::new),
        article_info: article_info(map)?,
        bom: collection(map, "bom", &["bomItems", "materials"])?,
        measurements: collection(map, "measurements", &["measurementPoints"])?,
        how_to_measures: collection(map, "howToMeasures", &["howToMeasure", "construction"])?,
        colorways: collection::<Colorway>(map, "colorways", &["colorWays"])?
            .map(|cs| cs.into_iter().map(sanitize_colorway).collect()),
        packing: packing(map)?,
        status,
        version: narrow(number(map, &["version", "currentVersion"]), "version")?,
        created_by: map.get("createdBy").and_then(actor_of),
        updated_by: map.get("updatedBy").and_then(actor_of),
        created_at: timestamp(map, &["createdAt"]),
        updated_at: timestamp(map, &["updatedAt"]),
    })
}

/// Normalize a create/get/update/clone response. The result must carry a
/// server-assigned identity.
pub fn normalize_server_record(value: &Value) -> Result<RecordPatch, EngineError> {
    check_in_band(value)?;
    let patch = record_patch(peel_record(value))?;
    match &patch.id {
        Some(id) if !id.is_empty() => Ok(patch),
        _ => Err(shape("record response carries no identity")),
    }
}

// ============================================================================
// Lists
// ============================================================================

/// Locate the item array in a list body, returning it together with every
/// object passed on the way down (candidates for pagination metadata).
fn find_list<'a>(
    value: &'a Value,
    list_keys: &[&str],
    trail: &mut Vec<&'a Map<String, Value>>,
    depth: usize,
) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) if depth < MAX_DEPTH => {
            trail.push(map);
            for key in ENVELOPE_KEYS.iter().chain(list_keys.iter()) {
                match map.get(*key) {
                    Some(Value::Array(items)) => return Some(items),
                    Some(inner @ Value::Object(_)) => {
                        if let Some(items) = find_list(inner, list_keys, trail, depth + 1) {
                            return Some(items);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

fn pagination(trail: &[&Map<String, Value>], len: usize, page: u32, limit: u32) -> Pagination {
    let candidates = trail.iter().rev().flat_map(|map| {
        let nested = ["pagination", "meta"]
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_object))
            .collect::<Vec<_>>();
        nested.into_iter().chain(std::iter::once(*map))
    });

    let mut total = None;
    let mut current = None;
    let mut pages = None;
    for map in candidates {
        total = total.or_else(|| number(map, &["total", "totalCount", "count"]));
        current = current.or_else(|| number(map, &["page", "currentPage"]));
        pages = pages.or_else(|| number(map, &["totalPages", "pages"]));
    }

    let total = total.unwrap_or(len as u64);
    Pagination {
        total,
        page: current
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(page)
            .max(1),
        total_pages: pages
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or_else(|| total_pages(total, limit.max(1))),
    }
}

pub fn normalize_list(value: &Value, query: &ListQuery) -> Result<ListPage, EngineError> {
    check_in_band(value)?;
    let mut trail = Vec::new();
    let raw = find_list(value, &RECORD_LIST_KEYS, &mut trail, 0)
        .ok_or_else(|| shape("list response carries no items"))?;

    let mut items = Vec::with_capacity(raw.len());
    for (i, item) in raw.iter().enumerate() {
        let patch = record_patch(item).map_err(|e| shape(format!("items[{i}]: {e}")))?;
        if patch.id.as_ref().is_none_or(|id| id.is_empty()) {
            return Err(shape(format!("items[{i}] carries no identity")));
        }
        items.push(patch.into_record().summary());
    }

    let pagination = pagination(&trail, items.len(), query.page, query.limit);
    Ok(ListPage { items, pagination })
}

// ============================================================================
// Revisions
// ============================================================================

fn changes_of(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(m) => text(m, &["field", "path", "section"]),
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn comment_of(value: &Value) -> Option<RevisionComment> {
    let map = value.as_object()?;
    Some(RevisionComment {
        user: ["user", "author", "createdBy"]
            .iter()
            .find_map(|k| map.get(*k).and_then(actor_of))
            .unwrap_or_default(),
        message: text(map, &["message", "comment", "text"])?,
        created_at: timestamp(map, &["createdAt"]),
    })
}

fn revision_of(value: &Value) -> Result<Revision, EngineError> {
    let map = value
        .as_object()
        .ok_or_else(|| shape("revision is not an object"))?;

    let id = ["id", "_id"]
        .iter()
        .find_map(|k| map.get(*k).and_then(id_of))
        .ok_or_else(|| shape("revision carries no identity"))?;
    let version: u32 = narrow(number(map, &["version", "versionNumber"]), "version")?
        .ok_or_else(|| shape(format!("revision {id} carries no version")))?;
    let status = match text(map, &["status"]) {
        Some(s) => RevisionStatus::parse(&s)
            .ok_or_else(|| shape(format!("unknown revision status {s:?}")))?,
        None => RevisionStatus::Pending,
    };
    let snapshot = match ["snapshot", "data"].iter().find_map(|k| map.get(*k)) {
        Some(v @ Value::Object(_)) => Some(record_patch(v)?.into_record()),
        _ => None,
    };

    Ok(Revision {
        id: RevisionId::new(id),
        record_id: ["recordId", "techPackId", "techpackId", "techPack"]
            .iter()
            .find_map(|k| map.get(*k).and_then(id_of))
            .map(RecordId::new)
            .unwrap_or_default(),
        version,
        status,
        changes: changes_of(map.get("changes").or_else(|| map.get("diff"))),
        snapshot,
        reverted_from: narrow(number(map, &["revertedFrom", "rollbackFrom"]), "revertedFrom")?,
        comments: map
            .get("comments")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(comment_of).collect())
            .unwrap_or_default(),
        created_by: map.get("createdBy").and_then(actor_of),
        created_at: timestamp(map, &["createdAt"]),
        decided_by: ["decidedBy", "approvedBy", "rejectedBy"]
            .iter()
            .find_map(|k| map.get(*k).and_then(actor_of)),
        decided_at: timestamp(map, &["decidedAt", "approvedAt", "rejectedAt"]),
        decision_reason: text(map, &["decisionReason", "statusReason", "reason"]),
    })
}

/// Revisions come back in ascending version order regardless of how the
/// server sorted them.
pub fn normalize_revisions(value: &Value) -> Result<RevisionPage, EngineError> {
    check_in_band(value)?;
    let mut trail = Vec::new();
    let raw = find_list(value, &REVISION_LIST_KEYS, &mut trail, 0)
        .ok_or_else(|| shape("revision response carries no revisions"))?;

    let mut revisions = raw
        .iter()
        .map(revision_of)
        .collect::<Result<Vec<_>, _>>()?;
    revisions.sort_by_key(|r| r.version);

    let len = revisions.len();
    let limit = len.max(1) as u32;
    let pagination = pagination(&trail, len, 1, limit);
    Ok(RevisionPage {
        revisions,
        pagination,
    })
}

/// Identity of the rollback revision created by a revert.
pub fn normalize_new_revision_id(value: &Value) -> Result<RevisionId, EngineError> {
    check_in_band(value)?;
    let mut current = value;
    for _ in 0..MAX_DEPTH {
        let Some(map) = current.as_object() else {
            break;
        };
        if let Some(id) = text(map, &["newRevisionId", "revisionId"]) {
            return Ok(RevisionId::new(id));
        }
        if let Some(id) = map.get("revision").and_then(id_of) {
            return Ok(RevisionId::new(id));
        }
        match ENVELOPE_KEYS.iter().find_map(|k| map.get(*k)) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    Err(shape("revert response carries no revision identity"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_body() -> Value {
        json!({
            "id": "rec-1",
            "articleInfo": { "articleCode": "TCRUD1234", "productName": "Tee" },
            "bom": [{ "part": "Body", "quantity": 2 }],
            "status": "Draft",
            "version": 1
        })
    }

    #[test]
    fn bare_record() {
        let patch = normalize_server_record(&record_body()).unwrap();
        assert_eq!(patch.id, Some(RecordId::new("rec-1")));
        assert_eq!(patch.article_info.unwrap().article_code, "TCRUD1234");
        assert_eq!(patch.bom.unwrap()[0].quantity, 2.0);
        assert_eq!(patch.version, Some(1));
        assert!(patch.measurements.is_none());
    }

    #[test]
    fn success_data_envelope() {
        let body = json!({ "success": true, "data": record_body() });
        let patch = normalize_server_record(&body).unwrap();
        assert_eq!(patch.id, Some(RecordId::new("rec-1")));
    }

    #[test]
    fn doubly_nested_entity() {
        let body = json!({ "success": true, "data": { "techPack": record_body() } });
        let patch = normalize_server_record(&body).unwrap();
        assert_eq!(patch.article_info.unwrap().product_name, "Tee");
    }

    #[test]
    fn mongo_ids_and_flattened_article_fields() {
        let body = json!({
            "_id": "665f",
            "articleCode": "AB-1",
            "articleName": "Legacy name",
            "season": null,
            "status": "Process",
            "bom": { "items": [{ "_id": "b1", "part": "Collar", "quantity": 1.5 }] },
            "measurements": null
        });
        let patch = normalize_server_record(&body).unwrap();
        assert_eq!(patch.id, Some(RecordId::new("665f")));
        let info = patch.article_info.unwrap();
        assert_eq!(info.article_code, "AB-1");
        assert_eq!(info.product_name, "Legacy name");
        assert_eq!(info.season, "");
        assert_eq!(patch.status, Some(RecordStatus::InReview));
        let bom = patch.bom.unwrap();
        assert_eq!(bom[0].id.as_deref(), Some("b1"));
        assert_eq!(patch.measurements, Some(Vec::new()));
        assert!(patch.colorways.is_none());
    }

    #[test]
    fn collection_aliases() {
        let body = json!({
            "id": "r",
            "bomItems": [],
            "howToMeasure": [{ "pomCode": "A", "description": "Chest" }],
            "colorWays": [{ "name": "Ocean blue", "hexColor": "12ab3" }]
        });
        let patch = normalize_server_record(&body).unwrap();
        assert_eq!(patch.bom, Some(Vec::new()));
        assert_eq!(patch.how_to_measures.unwrap()[0].pom_code, "A");
        let colorway = &patch.colorways.unwrap()[0];
        assert_eq!(colorway.code, "OCEAN-BLUE");
        assert_eq!(colorway.hex_color, "#000000");
    }

    #[test]
    fn audit_fields_accept_user_documents() {
        let body = json!({
            "id": "r",
            "createdBy": { "_id": "u1", "name": "Ana" },
            "updatedBy": "u2",
            "createdAt": "2024-05-01T10:00:00Z",
            "updatedAt": 1714557600000i64,
            "version": "v3"
        });
        let patch = normalize_server_record(&body).unwrap();
        assert_eq!(patch.created_by.as_deref(), Some("Ana"));
        assert_eq!(patch.updated_by.as_deref(), Some("u2"));
        assert!(patch.created_at.is_some());
        assert!(patch.updated_at.is_some());
        assert_eq!(patch.version, Some(3));
    }

    #[test]
    fn record_without_identity_is_rejected() {
        let body = json!({ "data": { "articleInfo": { "articleCode": "X" } } });
        let err = normalize_server_record(&body).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch(_)));
    }

    #[test]
    fn malformed_collection_is_rejected() {
        let body = json!({ "id": "r", "bom": "nope" });
        assert!(matches!(
            normalize_server_record(&body),
            Err(EngineError::ShapeMismatch(_))
        ));
        let body = json!({ "id": "r", "bom": [{ "quantity": "lots" }] });
        assert!(matches!(
            normalize_server_record(&body),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let body = json!({ "id": "r", "status": "Shipped" });
        assert!(matches!(
            normalize_server_record(&body),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn in_band_failure_surfaces_field_errors() {
        let body = json!({
            "success": false,
            "message": "Validation failed",
            "errors": [{ "field": "articleInfo.articleCode", "message": "already exists" }]
        });
        let err = normalize_server_record(&body).unwrap_err();
        match &err {
            EngineError::Transport(TransportError::Server { status, message, .. }) => {
                assert_eq!(*status, 422);
                assert_eq!(message, "Validation failed");
            }
            other => panic!("expected server error, got {other:?}"),
        }
        assert_eq!(
            err.field_errors().get("articleInfo.articleCode").map(String::as_str),
            Some("already exists")
        );
    }

    fn summary_item(id: &str) -> Value {
        json!({ "_id": id, "articleInfo": { "articleCode": id.to_uppercase() }, "status": "Draft" })
    }

    #[test]
    fn list_as_bare_array() {
        let body = json!([summary_item("a"), summary_item("b")]);
        let page = normalize_list(&body, &ListQuery::first_page(10)).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[test]
    fn list_with_data_and_pagination_object() {
        let body = json!({
            "success": true,
            "data": [summary_item("a")],
            "pagination": { "total": 21, "page": 3, "totalPages": 3 }
        });
        let page = normalize_list(&body, &ListQuery::first_page(10)).unwrap();
        assert_eq!(page.items[0].article_code, "A");
        assert_eq!(page.pagination.total, 21);
        assert_eq!(page.pagination.page, 3);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn list_nested_under_secondary_wrapper() {
        let body = json!({
            "data": { "techPacks": [summary_item("a"), summary_item("b")], "total": 12, "page": 2 }
        });
        let query = ListQuery::first_page(10).with_page(2);
        let page = normalize_list(&body, &query).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total, 12);
        assert_eq!(page.pagination.page, 2);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn list_items_with_flat_totals() {
        let body = json!({ "items": [summary_item("a")], "total": 1, "page": 1, "totalPages": 1 });
        let page = normalize_list(&body, &ListQuery::first_page(10)).unwrap();
        assert_eq!(page.items[0].id, RecordId::new("a"));
    }

    #[test]
    fn list_without_items_is_rejected() {
        let body = json!({ "data": { "message": "ok" } });
        assert!(matches!(
            normalize_list(&body, &ListQuery::first_page(10)),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    fn revision_item(id: &str, version: u32) -> Value {
        json!({
            "_id": id,
            "techPackId": "rec-1",
            "version": version,
            "status": "pending",
            "changes": { "bom": { "old": 2, "new": 3 } },
            "comments": [{ "user": { "name": "Ana" }, "comment": "looks good" }]
        })
    }

    #[test]
    fn revisions_nested_with_pagination() {
        let body = json!({
            "success": true,
            "data": {
                "revisions": [revision_item("r2", 2), revision_item("r1", 1)],
                "pagination": { "total": 2, "page": 1, "totalPages": 1 }
            }
        });
        let page = normalize_revisions(&body).unwrap();
        assert_eq!(page.revisions.len(), 2);
        assert_eq!(page.revisions[0].version, 1);
        assert_eq!(page.revisions[1].id, RevisionId::new("r2"));
        assert_eq!(page.revisions[0].record_id, RecordId::new("rec-1"));
        assert_eq!(page.revisions[0].changes, vec!["bom"]);
        assert_eq!(page.revisions[0].comments[0].user, "Ana");
        assert_eq!(page.revisions[0].comments[0].message, "looks good");
        assert_eq!(page.pagination.total, 2);
    }

    #[test]
    fn revisions_as_flat_data_array() {
        let body = json!({ "data": [revision_item("r1", 1)] });
        let page = normalize_revisions(&body).unwrap();
        assert_eq!(page.revisions.len(), 1);
        assert_eq!(page.pagination.total, 1);
    }

    #[test]
    fn revision_without_version_is_rejected() {
        let body = json!({ "revisions": [{ "_id": "r1" }] });
        assert!(matches!(
            normalize_revisions(&body),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn oversized_integers_are_rejected_not_wrapped() {
        let mut body = record_body();
        body["version"] = json!(4_294_967_297u64);
        assert!(matches!(
            normalize_server_record(&body),
            Err(EngineError::ShapeMismatch(_))
        ));

        let body = json!({ "revisions": [{ "_id": "r1", "version": 1, "revertedFrom": 4_294_967_296u64 }] });
        assert!(matches!(
            normalize_revisions(&body),
            Err(EngineError::ShapeMismatch(_))
        ));

        let body = json!({ "success": false, "status": 70000, "message": "odd" });
        assert!(matches!(check_in_band(&body), Err(EngineError::ShapeMismatch(_))));

        let body = json!({ "success": false, "status": 409, "message": "taken" });
        assert!(matches!(
            check_in_band(&body),
            Err(EngineError::Transport(TransportError::Server { status: 409, .. }))
        ));
    }

    #[test]
    fn new_revision_id_shapes() {
        for body in [
            json!({ "newRevisionId": "n1" }),
            json!({ "success": true, "data": { "newRevisionId": "n1" } }),
            json!({ "data": { "revision": { "_id": "n1", "version": 3 } } }),
            json!({ "revision": { "id": "n1" } }),
        ] {
            assert_eq!(normalize_new_revision_id(&body).unwrap(), RevisionId::new("n1"));
        }
        assert!(normalize_new_revision_id(&json!({ "success": true })).is_err());
    }
}
