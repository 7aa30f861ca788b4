//! Document record extraction.
//!
//! Turns one corpus file into a [`Document`]. Reading or parsing failures
//! never escape this module: they produce [`Document::Unparseable`].

use serde_json::Value;
use std::path::Path;

use crate::models::{Category, Document, Record};

/// Read and decode the document at `path`.
///
/// Top-level keys listed in `reserved` are dropped. Keys whose value is not
/// an array are ignored, as are array elements that are not objects.
pub fn extract_records(path: &Path, reserved: &[String]) -> Document {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "unreadable document");
            return Document::Unparseable;
        }
    };
    parse_document(&content, reserved).unwrap_or_else(|| {
        tracing::debug!(path = %path.display(), "document is not a JSON object");
        Document::Unparseable
    })
}

/// Decode document text. `None` when it is not a JSON object.
pub fn parse_document(content: &str, reserved: &[String]) -> Option<Document> {
    let Value::Object(root) = serde_json::from_str::<Value>(content).ok()? else {
        return None;
    };

    let categories = root
        .into_iter()
        .filter(|(key, _)| !reserved.iter().any(|r| r == key))
        .filter_map(|(key, value)| match value {
            Value::Array(items) => Some(Category {
                key,
                records: items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(fields) => Some(Record::new(fields)),
                        _ => None,
                    })
                    .collect(),
            }),
            _ => None,
        })
        .collect();

    Some(Document::Categories(categories))
}

/// Record names under the first non-reserved key of the document at `path`.
///
/// `None` when the document cannot be decoded or that key does not hold an
/// array. Later keys are never consulted.
pub fn leading_names(path: &Path, reserved: &[String]) -> Option<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "unreadable document");
            return None;
        }
    };
    let Value::Object(root) = serde_json::from_str::<Value>(&content).ok()? else {
        return None;
    };
    let (_, value) = root
        .into_iter()
        .find(|(key, _)| !reserved.iter().any(|r| r == key))?;
    let Value::Array(items) = value else {
        return None;
    };

    Some(
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(fields) => Record::new(fields).name().map(str::to_string),
                _ => None,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn reserved() -> Vec<String> {
        vec!["_meta".to_string(), "linkedFile".to_string()]
    }

    #[test]
    fn keeps_array_categories_in_order() {
        let doc = parse_document(
            r#"{"spell": [{"name": "Fireball"}], "monster": [{"name": "Goblin"}, {"name": "Orc"}]}"#,
            &reserved(),
        )
        .unwrap();
        let keys: Vec<&str> = doc.categories().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["spell", "monster"]);
        assert_eq!(doc.record_count(), 3);
    }

    #[test]
    fn reserved_keys_are_dropped() {
        let doc = parse_document(
            r#"{"_meta": [{"name": "Spada"}], "linkedFile": [{"name": "Spada"}], "item": []}"#,
            &reserved(),
        )
        .unwrap();
        let keys: Vec<&str> = doc.categories().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["item"]);
    }

    #[test]
    fn non_array_values_are_ignored() {
        let doc = parse_document(
            r#"{"source": "PHB", "count": 3, "nested": {"name": "x"}, "item": [{"name": "Rope"}]}"#,
            &reserved(),
        )
        .unwrap();
        assert_eq!(doc.categories().len(), 1);
        assert_eq!(doc.categories()[0].key, "item");
    }

    #[test]
    fn non_object_elements_are_skipped() {
        let doc = parse_document(r#"{"item": ["Rope", 4, null, {"name": "Torch"}]}"#, &reserved())
            .unwrap();
        let records = &doc.categories()[0].records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), Some("Torch"));
    }

    #[test]
    fn malformed_or_non_object_is_none() {
        assert!(parse_document("{ not json", &reserved()).is_none());
        assert!(parse_document("[1, 2, 3]", &reserved()).is_none());
        assert!(parse_document("\"text\"", &reserved()).is_none());
    }

    #[test]
    fn unreadable_file_is_unparseable() {
        let tmp = TempDir::new().unwrap();
        let doc = extract_records(&tmp.path().join("missing.json"), &reserved());
        assert_eq!(doc, Document::Unparseable);
        assert!(!doc.is_parseable());
    }

    #[test]
    fn malformed_file_is_unparseable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.json");
        fs::write(&path, "{\"item\": [").unwrap();
        assert_eq!(extract_records(&path, &reserved()), Document::Unparseable);
    }

    #[test]
    fn leading_names_use_first_unreserved_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("races.json");
        fs::write(
            &path,
            r#"{"_meta": {"x": 1}, "race": [{"name": "Elfo"}, "x", {"size": "M"}, {"name": "Nano"}],
                "subrace": [{"name": "Elfo Alto"}]}"#,
        )
        .unwrap();
        assert_eq!(
            leading_names(&path, &reserved()),
            Some(vec!["Elfo".to_string(), "Nano".to_string()])
        );
    }

    #[test]
    fn leading_names_need_an_array_first() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("class.json");
        fs::write(&path, r#"{"source": "PHB", "class": [{"name": "Mago"}]}"#).unwrap();
        assert_eq!(leading_names(&path, &reserved()), None);
        assert_eq!(leading_names(&tmp.path().join("missing.json"), &reserved()), None);
    }
}
