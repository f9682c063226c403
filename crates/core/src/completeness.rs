use serde::{Deserialize, Serialize};

use crate::model::Record;

/// Share of required items present on a record, plus the names of the ones
/// still missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Completeness {
    pub percentage: u8,
    pub missing: Vec<String>,
}

const REQUIRED_ITEMS: usize = 6;

impl Completeness {
    pub fn of(record: &Record) -> Self {
        let info = &record.article_info;
        let checks: [(&str, bool); REQUIRED_ITEMS] = [
            ("articleCode", !info.article_code.trim().is_empty()),
            ("productName", !info.product_name.trim().is_empty()),
            ("season", !info.season.trim().is_empty()),
            ("bom", !record.bom.is_empty()),
            ("measurements", !record.measurements.is_empty()),
            ("colorways", !record.colorways.is_empty()),
        ];

        let missing: Vec<String> = checks
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| name.to_string())
            .collect();
        let present = REQUIRED_ITEMS - missing.len();
        let percentage = ((present * 100) as f64 / REQUIRED_ITEMS as f64).round() as u8;

        Self {
            percentage,
            missing,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BomItem, Colorway, Measurement};

    #[test]
    fn empty_record_is_zero_percent() {
        let c = Completeness::of(&Record::default());
        assert_eq!(c.percentage, 0);
        assert_eq!(c.missing.len(), REQUIRED_ITEMS);
    }

    #[test]
    fn partial_record_rounds_percentage() {
        let mut record = Record::default();
        record.article_info.article_code = "AB-1".into();
        record.bom.push(BomItem::default());
        let c = Completeness::of(&record);
        assert_eq!(c.percentage, 33);
        assert!(c.missing.contains(&"productName".to_string()));
        assert!(!c.missing.contains(&"bom".to_string()));
    }

    #[test]
    fn full_record_is_complete() {
        let mut record = Record::default();
        record.article_info.article_code = "AB-1".into();
        record.article_info.product_name = "Tee".into();
        record.article_info.season = "SS25".into();
        record.bom.push(BomItem::default());
        record.measurements.push(Measurement::default());
        record.colorways.push(Colorway::default());
        let c = Completeness::of(&record);
        assert_eq!(c.percentage, 100);
        assert!(c.is_complete());
    }
}
