use chrono::{DateTime, Utc};
use tracing::debug;

use techpack_core::{ArticleInfo, EditorTab, Record};

use crate::draft::DraftEnvelope;
use crate::error::EngineError;
use crate::normalize::RecordPatch;

/// Who a write comes from. Selected explicitly by the caller, never inferred
/// from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    UserEdit,
    ServerRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Content and metadata were adopted.
    Applied,
    /// Only identity, version, status and audit fields were adopted; the
    /// operator's newer content was kept.
    MetadataOnly,
    /// The payload was older than live state and was ignored.
    Stale,
}

/// Live editing state of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub record: Record,
    pub current_tab: EditorTab,
    pub has_unsaved_changes: bool,
    pub last_saved: Option<DateTime<Utc>>,
    /// Bumped on every operator edit.
    pub edit_generation: u64,
    pub saving: bool,
    pub recovered_draft: bool,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            record: Record::template(),
            current_tab: EditorTab::default(),
            has_unsaved_changes: false,
            last_saved: None,
            edit_generation: 0,
            saving: false,
            recovered_draft: false,
        }
    }
}

impl RecordPatch {
    /// Patch carrying every field of `record`.
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: Some(record.id.clone()),
            article_info: Some(record.article_info.clone()),
            bom: Some(record.bom.clone()),
            measurements: Some(record.measurements.clone()),
            how_to_measures: Some(record.how_to_measures.clone()),
            colorways: Some(record.colorways.clone()),
            packing: Some(record.packing.clone()),
            status: Some(record.status),
            version: Some(record.version),
            created_by: record.created_by.clone(),
            updated_by: record.updated_by.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn into_record(self) -> Record {
        let mut record = Record::template();
        apply_content(&mut record, &self);
        apply_metadata(&mut record, &self);
        record.refresh_completeness();
        record
    }
}

/// Replace every section the patch supplies. Absent sections are untouched;
/// present-but-empty collections clear the live ones.
pub fn apply_content(record: &mut Record, patch: &RecordPatch) {
    if let Some(info) = &patch.article_info {
        record.article_info = info.clone();
    }
    if let Some(bom) = &patch.bom {
        record.bom = bom.clone();
    }
    if let Some(measurements) = &patch.measurements {
        record.measurements = measurements.clone();
    }
    if let Some(how_to_measures) = &patch.how_to_measures {
        record.how_to_measures = how_to_measures.clone();
    }
    if let Some(colorways) = &patch.colorways {
        record.colorways = colorways.clone();
    }
    if let Some(packing) = &patch.packing {
        record.packing = packing.clone();
    }
}

pub fn apply_metadata(record: &mut Record, patch: &RecordPatch) {
    if let Some(id) = &patch.id
        && !id.is_empty()
    {
        record.id = id.clone();
    }
    if let Some(status) = patch.status {
        record.status = status;
    }
    if let Some(version) = patch.version {
        record.version = version;
    }
    if patch.created_by.is_some() {
        record.created_by = patch.created_by.clone();
    }
    if patch.updated_by.is_some() {
        record.updated_by = patch.updated_by.clone();
    }
    if patch.created_at.is_some() {
        record.created_at = patch.created_at;
    }
    if patch.updated_at.is_some() {
        record.updated_at = patch.updated_at;
    }
}

macro_rules! overlay_text {
    ($base:expr, $draft:expr, [$($field:ident),* $(,)?]) => {
        $(
            if !$draft.$field.trim().is_empty() {
                $base.$field = $draft.$field.clone();
            }
        )*
    };
}

fn overlay_article_info(base: &mut ArticleInfo, draft: &ArticleInfo) {
    overlay_text!(
        base,
        draft,
        [
            article_code,
            product_name,
            brand,
            season,
            gender,
            category,
            fabric_description,
            product_description,
            supplier,
            designer,
            notes,
        ]
    );
}

/// Lay a recovered draft over a base record. Populated article fields and
/// every collection come from the draft. Identity, version and audit stay
/// with the base once it has been created.
pub fn merge_draft(base: Record, draft: &Record) -> Record {
    let mut merged = base;
    overlay_article_info(&mut merged.article_info, &draft.article_info);
    merged.bom = draft.bom.clone();
    merged.measurements = draft.measurements.clone();
    merged.how_to_measures = draft.how_to_measures.clone();
    merged.colorways = draft.colorways.clone();
    if draft.packing.is_some() {
        merged.packing = draft.packing.clone();
    }
    if merged.id.is_unsaved() {
        merged.id = draft.id.clone();
        merged.status = draft.status;
        merged.version = draft.version;
        merged.created_by = draft.created_by.clone();
        merged.created_at = draft.created_at;
    }
    merged.refresh_completeness();
    merged
}

/// State of a freshly opened new-record editor, recovering `draft` if one
/// passed the schema check.
pub fn initial_state(draft: Option<DraftEnvelope>) -> EditorState {
    let Some(envelope) = draft else {
        return EditorState::default();
    };
    EditorState {
        record: merge_draft(Record::template(), &envelope.state),
        current_tab: envelope.current_tab,
        has_unsaved_changes: envelope.has_unsaved_changes,
        last_saved: envelope.last_saved,
        recovered_draft: true,
        ..EditorState::default()
    }
}

/// Merge a normalized patch into live state.
///
/// `issued_generation` is the edit generation observed when the request
/// that produced the patch was issued. A server refresh arriving after the
/// operator edited again keeps their content and dirty flag.
pub fn apply_patch(
    state: &mut EditorState,
    patch: &RecordPatch,
    mode: WriteMode,
    issued_generation: Option<u64>,
) -> Result<MergeOutcome, EngineError> {
    if let Some(id) = &patch.id
        && !id.is_empty()
        && !state.record.id.is_unsaved()
        && *id != state.record.id
    {
        return Err(EngineError::ShapeMismatch(format!(
            "payload for {id} cannot replace record {}",
            state.record.id
        )));
    }

    let outcome = match mode {
        WriteMode::UserEdit => {
            apply_content(&mut state.record, patch);
            apply_metadata(&mut state.record, patch);
            state.has_unsaved_changes = true;
            state.edit_generation += 1;
            MergeOutcome::Applied
        }
        WriteMode::ServerRefresh => {
            if let Some(version) = patch.version
                && !state.record.id.is_unsaved()
                && version < state.record.version
            {
                debug!(
                    record = %state.record.id,
                    incoming = version,
                    live = state.record.version,
                    "ignoring stale server payload"
                );
                return Ok(MergeOutcome::Stale);
            }

            let keep_local = state.has_unsaved_changes
                && issued_generation != Some(state.edit_generation);
            apply_metadata(&mut state.record, patch);
            if keep_local {
                MergeOutcome::MetadataOnly
            } else {
                apply_content(&mut state.record, patch);
                state.has_unsaved_changes = false;
                MergeOutcome::Applied
            }
        }
    };
    state.record.refresh_completeness();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use techpack_core::{BomItem, RecordId, RecordStatus};

    fn bom(part: &str, quantity: f64) -> BomItem {
        BomItem {
            part: part.into(),
            quantity,
            ..Default::default()
        }
    }

    fn saved(id: &str, version: u32) -> EditorState {
        let mut record = Record::template();
        record.id = RecordId::new(id);
        record.version = version;
        record.bom = vec![bom("Body", 1.0)];
        record.refresh_completeness();
        EditorState {
            record,
            ..EditorState::default()
        }
    }

    #[test]
    fn draft_wins_on_populated_fields() {
        let mut base = Record::template();
        base.article_info.brand = "Base brand".into();
        base.article_info.season = "SS25".into();

        let mut draft = Record::template();
        draft.article_info.brand = "Draft brand".into();
        draft.bom = vec![bom("Collar", 3.0)];

        let merged = merge_draft(base, &draft);
        assert_eq!(merged.article_info.brand, "Draft brand");
        assert_eq!(merged.article_info.season, "SS25");
        assert_eq!(merged.bom, vec![bom("Collar", 3.0)]);
    }

    #[test]
    fn draft_cannot_change_saved_identity() {
        let mut base = Record::template();
        base.id = RecordId::new("server");
        base.version = 4;
        let mut draft = Record::template();
        draft.id = RecordId::new("other");
        draft.version = 1;

        let merged = merge_draft(base, &draft);
        assert_eq!(merged.id, RecordId::new("server"));
        assert_eq!(merged.version, 4);
    }

    #[test]
    fn no_draft_starts_from_template() {
        let state = initial_state(None);
        assert!(state.record.id.is_unsaved());
        assert!(!state.has_unsaved_changes);
        assert!(!state.recovered_draft);
    }

    #[test]
    fn absent_collections_are_untouched_and_empty_ones_clear() {
        let mut state = saved("r1", 1);
        let patch = RecordPatch {
            version: Some(2),
            ..Default::default()
        };
        apply_patch(&mut state, &patch, WriteMode::ServerRefresh, None).unwrap();
        assert_eq!(state.record.bom.len(), 1);
        assert_eq!(state.record.version, 2);

        let patch = RecordPatch {
            bom: Some(Vec::new()),
            ..Default::default()
        };
        apply_patch(&mut state, &patch, WriteMode::ServerRefresh, None).unwrap();
        assert!(state.record.bom.is_empty());
    }

    #[test]
    fn changing_a_saved_identity_is_a_shape_mismatch() {
        let mut state = saved("r1", 1);
        let patch = RecordPatch {
            id: Some(RecordId::new("r2")),
            ..Default::default()
        };
        let err = apply_patch(&mut state, &patch, WriteMode::ServerRefresh, None).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch(_)));
        assert_eq!(state.record.id, RecordId::new("r1"));
    }

    #[test]
    fn unsaved_record_adopts_server_identity() {
        let mut state = EditorState::default();
        let patch = RecordPatch {
            id: Some(RecordId::new("fresh")),
            version: Some(1),
            ..Default::default()
        };
        let outcome = apply_patch(&mut state, &patch, WriteMode::ServerRefresh, Some(0)).unwrap();
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(state.record.id, RecordId::new("fresh"));
    }

    #[test]
    fn refresh_keeps_edits_made_after_issue() {
        let mut state = saved("r1", 1);
        let issued = state.edit_generation;

        let edit = RecordPatch {
            bom: Some(vec![bom("Body", 5.0)]),
            ..Default::default()
        };
        apply_patch(&mut state, &edit, WriteMode::UserEdit, None).unwrap();
        assert!(state.has_unsaved_changes);

        let server = RecordPatch {
            id: Some(RecordId::new("r1")),
            bom: Some(vec![bom("Body", 1.0)]),
            status: Some(RecordStatus::InReview),
            version: Some(2),
            ..Default::default()
        };
        let outcome =
            apply_patch(&mut state, &server, WriteMode::ServerRefresh, Some(issued)).unwrap();
        assert_eq!(outcome, MergeOutcome::MetadataOnly);
        assert_eq!(state.record.bom, vec![bom("Body", 5.0)]);
        assert_eq!(state.record.version, 2);
        assert_eq!(state.record.status, RecordStatus::InReview);
        assert!(state.has_unsaved_changes);
    }

    #[test]
    fn refresh_issued_after_last_edit_replaces_content() {
        let mut state = saved("r1", 1);
        let edit = RecordPatch {
            bom: Some(vec![bom("Body", 5.0)]),
            ..Default::default()
        };
        apply_patch(&mut state, &edit, WriteMode::UserEdit, None).unwrap();
        let issued = state.edit_generation;

        let server = RecordPatch {
            bom: Some(vec![bom("Body", 5.0), bom("Pocket", 1.0)]),
            version: Some(2),
            ..Default::default()
        };
        let outcome =
            apply_patch(&mut state, &server, WriteMode::ServerRefresh, Some(issued)).unwrap();
        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(state.record.bom.len(), 2);
        assert!(!state.has_unsaved_changes);
    }

    #[test]
    fn older_version_is_stale() {
        let mut state = saved("r1", 3);
        let patch = RecordPatch {
            version: Some(2),
            bom: Some(Vec::new()),
            ..Default::default()
        };
        let outcome = apply_patch(&mut state, &patch, WriteMode::ServerRefresh, None).unwrap();
        assert_eq!(outcome, MergeOutcome::Stale);
        assert_eq!(state.record.bom.len(), 1);
        assert_eq!(state.record.version, 3);
    }

    #[test]
    fn patch_round_trips_through_record() {
        let state = saved("r1", 2);
        let record = RecordPatch::from_record(&state.record).into_record();
        assert_eq!(record, state.record);
    }
}
