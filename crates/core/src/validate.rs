use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::colorway::{sanitize_colorway, validate_colorways};
use crate::error::CoreError;
use crate::model::Record;

static ARTICLE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9_-]+$").expect("static pattern"));

pub fn is_valid_article_code(code: &str) -> bool {
    ARTICLE_CODE.is_match(code)
}

fn check_article_code(code: &str, field: &str, errors: &mut BTreeMap<String, String>) {
    if code.trim().is_empty() {
        errors.insert(field.to_string(), "is required".to_string());
    } else if !is_valid_article_code(code) {
        errors.insert(
            field.to_string(),
            "must contain only uppercase letters, digits, dashes and underscores".to_string(),
        );
    }
}

/// Sanitize and validate a record before it is sent to the server.
/// Returns the record exactly as it should be persisted.
pub fn prepare_for_save(record: &Record) -> Result<Record, CoreError> {
    let mut prepared = record.clone();
    prepared.colorways = prepared
        .colorways
        .into_iter()
        .map(sanitize_colorway)
        .collect();

    let mut errors = BTreeMap::new();
    check_article_code(
        &prepared.article_info.article_code,
        "articleInfo.articleCode",
        &mut errors,
    );
    if let Err(CoreError::Validation(colorway_errors)) = validate_colorways(&prepared.colorways) {
        errors.extend(colorway_errors);
    }
    if !errors.is_empty() {
        return Err(CoreError::Validation(errors));
    }

    prepared.refresh_completeness();
    Ok(prepared)
}

/// Client-side check of the identity given to a clone.
pub fn validate_clone_identity(product_name: &str, article_code: &str) -> Result<(), CoreError> {
    let mut errors = BTreeMap::new();
    if product_name.trim().is_empty() {
        errors.insert("newProductName".to_string(), "is required".to_string());
    }
    check_article_code(article_code, "newArticleCode", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(errors))
    }
}
