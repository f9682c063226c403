use std::collections::BTreeSet;

use tracing::info;

use techpack_core::clone::{CloneIdentity, CloneSection};
use techpack_core::validate::validate_clone_identity;
use techpack_core::{Record, RecordId};

use crate::error::EngineError;
use crate::normalize::normalize_server_record;
use crate::transport::Transport;

/// Create a new record from the selected sections of `source_id`.
///
/// The identity is validated before anything is sent; field errors returned
/// by the server surface through [`EngineError::field_errors`].
pub async fn clone_record<T: Transport + ?Sized>(
    transport: &T,
    source_id: &RecordId,
    identity: &CloneIdentity,
    sections: &BTreeSet<CloneSection>,
) -> Result<Record, EngineError> {
    validate_clone_identity(&identity.new_product_name, &identity.new_article_code)?;
    if source_id.is_unsaved() {
        return Err(EngineError::RecordNotSaved);
    }

    let identity = CloneIdentity {
        new_product_name: identity.new_product_name.trim().to_string(),
        new_article_code: identity.new_article_code.trim().to_string(),
    };
    let sections: Vec<CloneSection> = sections.iter().copied().collect();
    let body = transport
        .clone_record(source_id, &identity, &sections)
        .await?;
    let record = normalize_server_record(&body)?.into_record();

    info!(
        source = %source_id,
        clone = %record.id,
        sections = ?sections,
        "record cloned"
    );
    Ok(record)
}
