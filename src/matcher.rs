//! Keyword matching of queries against record names.
//!
//! A query is reduced to its significant terms: lower-cased
//! whitespace-separated tokens of at least [`MIN_KEYWORD_CHARS`] characters.
//! A record matches when its lower-cased name contains any term as a
//! substring. There is no stemming, fuzziness, or scoring.

use crate::models::Record;

/// Shortest token kept as a keyword. Shorter tokens are too generic.
pub const MIN_KEYWORD_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

impl KeywordSet {
    /// Derive the keyword set of `query`, de-duplicated in first-seen order.
    pub fn from_query(query: &str) -> Self {
        let mut keywords: Vec<String> = Vec::new();
        for token in query.split_whitespace() {
            let token = token.to_lowercase();
            if token.chars().count() >= MIN_KEYWORD_CHARS && !keywords.contains(&token) {
                keywords.push(token);
            }
        }
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// True when `name`, lower-cased, contains any keyword.
    pub fn matches_name(&self, name: &str) -> bool {
        if self.keywords.is_empty() || name.is_empty() {
            return false;
        }
        let name = name.to_lowercase();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }

    /// True when the record has a usable name that matches.
    pub fn matches(&self, record: &Record) -> bool {
        record.name().is_some_and(|name| self.matches_name(name))
    }
}
