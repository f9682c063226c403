use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;
use crate::model::{Colorway, ColorwayPart};

pub const DEFAULT_HEX_COLOR: &str = "#000000";

static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("static pattern"));

/// Normalize a hex color, falling back to black when it is not a 6-digit hex.
pub fn sanitize_hex(raw: &str) -> String {
    let trimmed = raw.trim();
    let candidate = if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{trimmed}")
    };
    if HEX_COLOR.is_match(&candidate) {
        candidate.to_ascii_uppercase()
    } else {
        DEFAULT_HEX_COLOR.to_string()
    }
}

/// Uppercase slug: alphanumeric runs joined by single dashes.
pub fn slug_code(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_uppercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn sanitize_part(part: ColorwayPart) -> ColorwayPart {
    ColorwayPart {
        part_name: part.part_name.trim().to_string(),
        color_name: part.color_name.trim().to_string(),
        hex_color: sanitize_hex(&part.hex_color),
        pantone_code: non_empty(part.pantone_code),
    }
}

/// Fill defaults on a partially edited colorway. Never rejects: required
/// fields that cannot be defaulted stay empty and are caught by
/// [`validate_colorways`] at save time.
pub fn sanitize_colorway(colorway: Colorway) -> Colorway {
    let name = colorway.name.trim().to_string();
    let code = match colorway.code.trim() {
        "" => slug_code(&name),
        given => slug_code(given),
    };
    Colorway {
        id: non_empty(colorway.id),
        code,
        placement: colorway.placement.trim().to_string(),
        material_type: colorway.material_type.trim().to_string(),
        hex_color: sanitize_hex(&colorway.hex_color),
        pantone_code: non_empty(colorway.pantone_code),
        approval_status: colorway.approval_status,
        production_status: colorway.production_status,
        parts: colorway.parts.into_iter().map(sanitize_part).collect(),
        name,
    }
}

pub fn validate_colorways(colorways: &[Colorway]) -> Result<(), CoreError> {
    let mut errors = BTreeMap::new();
    for (i, colorway) in colorways.iter().enumerate() {
        let required = [
            ("name", &colorway.name),
            ("code", &colorway.code),
            ("placement", &colorway.placement),
            ("materialType", &colorway.material_type),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.insert(format!("colorways[{i}].{field}"), "is required".to_string());
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(errors))
    }
}
