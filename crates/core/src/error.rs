use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {}", format_fields(.0))]
    Validation(BTreeMap<String, String>),

    #[error("invalid transition: cannot {action} a {from} revision")]
    InvalidTransition { from: &'static str, action: &'static str },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CoreError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.into());
        Self::Validation(fields)
    }

    /// Per-field messages for a validation failure, empty for other kinds.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Validation(fields) => fields.clone(),
            _ => BTreeMap::new(),
        }
    }
}

fn format_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}
