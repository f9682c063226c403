use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RecordId;
use crate::model::{ArticleInfo, Record, RecordStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloneSection {
    ArticleInfo,
    #[serde(rename = "bom")]
    Bom,
    Measurements,
    /// Construction details, carried by the how-to-measure collection.
    Construction,
    Colorways,
    Packing,
}

impl CloneSection {
    pub const ALL: [CloneSection; 6] = [
        Self::ArticleInfo,
        Self::Bom,
        Self::Measurements,
        Self::Construction,
        Self::Colorways,
        Self::Packing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArticleInfo => "articleInfo",
            Self::Bom => "bom",
            Self::Measurements => "measurements",
            Self::Construction => "construction",
            Self::Colorways => "colorways",
            Self::Packing => "packing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// Identity given to the copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneIdentity {
    pub new_product_name: String,
    pub new_article_code: String,
}

/// Build a new record from the selected sections of `source`.
///
/// The copy always starts as a version-1 draft with fresh audit fields; the
/// identity fields of `identity` override whatever article info was copied.
pub fn clone_sections(
    source: &Record,
    id: RecordId,
    identity: &CloneIdentity,
    sections: &BTreeSet<CloneSection>,
    actor: &str,
    now: DateTime<Utc>,
) -> Record {
    let mut article_info = if sections.contains(&CloneSection::ArticleInfo) {
        source.article_info.clone()
    } else {
        ArticleInfo::default()
    };
    article_info.product_name = identity.new_product_name.trim().to_string();
    article_info.article_code = identity.new_article_code.trim().to_string();

    let copy = |section: CloneSection| sections.contains(&section);
    let mut record = Record {
        id,
        article_info,
        bom: if copy(CloneSection::Bom) { source.bom.clone() } else { Vec::new() },
        measurements: if copy(CloneSection::Measurements) {
            source.measurements.clone()
        } else {
            Vec::new()
        },
        how_to_measures: if copy(CloneSection::Construction) {
            source.how_to_measures.clone()
        } else {
            Vec::new()
        },
        colorways: if copy(CloneSection::Colorways) {
            source.colorways.clone()
        } else {
            Vec::new()
        },
        packing: if copy(CloneSection::Packing) { source.packing.clone() } else { None },
        status: RecordStatus::Draft,
        version: 1,
        created_by: Some(actor.to_string()),
        updated_by: Some(actor.to_string()),
        created_at: Some(now),
        updated_at: Some(now),
        completeness: Default::default(),
    };
    record.refresh_completeness();
    record
}
