//! Core data models for the rules corpus.
//!
//! A corpus document is either a map of category keys to record lists, or
//! unusable. Records are kept as the raw JSON objects they were read from so
//! they can be serialized back verbatim into the prompt.

use serde_json::{Map, Value};

/// A single named entry of a document (one monster, one spell, one item).
#[derive(Debug, Clone, PartialEq)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The record's `name`, when it is a non-empty string.
    pub fn name(&self) -> Option<&str> {
        self.0
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// The record's full content, pretty-printed with two-space indentation.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.0)
    }
}

/// Records stored under one top-level key of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub key: String,
    pub records: Vec<Record>,
}

/// A decoded corpus document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// Category keys in document order, each with its records.
    Categories(Vec<Category>),
    /// Unreadable, malformed, or not a JSON object at the top level.
    Unparseable,
}

impl Document {
    pub fn categories(&self) -> &[Category] {
        match self {
            Document::Categories(categories) => categories,
            Document::Unparseable => &[],
        }
    }

    pub fn record_count(&self) -> usize {
        self.categories().iter().map(|c| c.records.len()).sum()
    }

    pub fn is_parseable(&self) -> bool {
        matches!(self, Document::Categories(_))
    }
}
