use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::completeness::Completeness;
use crate::ids::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecordStatus {
    #[default]
    Draft,
    #[serde(rename = "In Review", alias = "Process", alias = "InReview")]
    InReview,
    Approved,
    Rejected,
    Archived,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::InReview => "In Review",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Archived => "Archived",
        }
    }

    /// Lenient parse used on server payloads. Accepts the legacy `Process`
    /// spelling and ignores case and separators.
    pub fn parse(s: &str) -> Option<Self> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "draft" => Some(Self::Draft),
            "inreview" | "process" | "review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleInfo {
    pub article_code: String,
    pub product_name: String,
    pub brand: String,
    pub season: String,
    pub gender: String,
    pub category: String,
    pub fabric_description: String,
    pub product_description: String,
    pub supplier: String,
    pub designer: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BomItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub part: String,
    pub material_name: String,
    pub material_code: String,
    pub placement: String,
    pub quantity: f64,
    pub uom: String,
    pub supplier: String,
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Measurement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub pom_code: String,
    pub point_of_measure: String,
    pub tolerance: f64,
    pub sizes: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HowToMeasure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub pom_code: String,
    pub description: String,
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProductionStatus {
    #[default]
    #[serde(rename = "Lab Dip")]
    LabDip,
    #[serde(rename = "Bulk Fabric")]
    BulkFabric,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorwayPart {
    pub part_name: String,
    pub color_name: String,
    pub hex_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pantone_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Colorway {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub code: String,
    pub placement: String,
    pub material_type: String,
    pub hex_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pantone_code: Option<String>,
    pub approval_status: ApprovalStatus,
    pub production_status: ProductionStatus,
    pub parts: Vec<ColorwayPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackingInfo {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units_per_carton: Option<u32>,
    pub carton_dimensions: String,
    pub notes: String,
}

/// A tech pack as held by the client.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub id: RecordId,
    pub article_info: ArticleInfo,
    pub bom: Vec<BomItem>,
    pub measurements: Vec<Measurement>,
    pub how_to_measures: Vec<HowToMeasure>,
    pub colorways: Vec<Colorway>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packing: Option<PackingInfo>,
    pub status: RecordStatus,
    pub version: u32,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completeness: Completeness,
}

impl Record {
    /// Empty canonical record used as the base of every new edit session.
    pub fn template() -> Self {
        let mut record = Self::default();
        record.refresh_completeness();
        record
    }

    pub fn refresh_completeness(&mut self) {
        self.completeness = Completeness::of(self);
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id.clone(),
            article_code: self.article_info.article_code.clone(),
            product_name: self.article_info.product_name.clone(),
            brand: self.article_info.brand.clone(),
            season: self.article_info.season.clone(),
            status: self.status,
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

/// Row shape of the record list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordSummary {
    pub id: RecordId,
    pub article_code: String,
    pub product_name: String,
    pub brand: String,
    pub season: String,
    pub status: RecordStatus,
    pub version: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorTab {
    #[default]
    ArticleInfo,
    Bom,
    Measurements,
    HowToMeasure,
    Colorways,
    Packing,
    Revisions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_accepts_legacy_spellings() {
        assert_eq!(RecordStatus::parse("Process"), Some(RecordStatus::InReview));
        assert_eq!(RecordStatus::parse("in_review"), Some(RecordStatus::InReview));
        assert_eq!(RecordStatus::parse("APPROVED"), Some(RecordStatus::Approved));
        assert_eq!(RecordStatus::parse("shipped"), None);
    }

    #[test]
    fn status_serde_uses_display_names() {
        let json = serde_json::to_string(&RecordStatus::InReview).unwrap();
        assert_eq!(json, "\"In Review\"");
        let parsed: RecordStatus = serde_json::from_str("\"Process\"").unwrap();
        assert_eq!(parsed, RecordStatus::InReview);
    }

    #[test]
    fn template_is_unsaved_draft() {
        let record = Record::template();
        assert!(record.id.is_unsaved());
        assert_eq!(record.status, RecordStatus::Draft);
        assert_eq!(record.version, 0);
        assert!(record.bom.is_empty());
        assert!(!record.completeness.missing.is_empty());
    }

    #[test]
    fn record_uses_camel_case_wire_names() {
        let mut record = Record::template();
        record.article_info.article_code = "TCRUD1234".into();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["articleInfo"]["articleCode"], "TCRUD1234");
        assert!(value.get("howToMeasures").is_some());
    }
}
