use serde_json::Value;

use crate::model::Record;

fn article_fields(record: &Record) -> serde_json::Map<String, Value> {
    match serde_json::to_value(&record.article_info) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Names of the sections that differ between two versions of a record.
/// Article info is reported per field as `articleInfo.<field>`.
pub fn changed_sections(before: &Record, after: &Record) -> Vec<String> {
    let mut changes = Vec::new();

    let old_info = article_fields(before);
    for (key, new_value) in article_fields(after) {
        if old_info.get(&key) != Some(&new_value) {
            changes.push(format!("articleInfo.{key}"));
        }
    }

    if before.bom != after.bom {
        changes.push("bom".to_string());
    }
    if before.measurements != after.measurements {
        changes.push("measurements".to_string());
    }
    if before.how_to_measures != after.how_to_measures {
        changes.push("howToMeasures".to_string());
    }
    if before.colorways != after.colorways {
        changes.push("colorways".to_string());
    }
    if before.packing != after.packing {
        changes.push("packing".to_string());
    }
    if before.status != after.status {
        changes.push("status".to_string());
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BomItem, RecordStatus};

    #[test]
    fn identical_records_have_no_changes() {
        let r = Record::template();
        assert!(changed_sections(&r, &r.clone()).is_empty());
    }

    #[test]
    fn reports_article_fields_and_collections() {
        let before = Record::template();
        let mut after = before.clone();
        after.article_info.product_name = "Crew tee".into();
        after.bom.push(BomItem {
            part: "Body".into(),
            quantity: 2.0,
            ..Default::default()
        });
        after.status = RecordStatus::InReview;

        let changes = changed_sections(&before, &after);
        assert_eq!(changes, vec!["articleInfo.productName", "bom", "status"]);
    }
}
