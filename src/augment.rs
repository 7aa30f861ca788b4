//! Augmentation assembly.
//!
//! Drives the [`CorpusWalker`], the document extractor, and the
//! [`KeywordSet`] matcher across the corpus and accumulates every matching
//! record into a text block that is prepended to the model prompt.
//!
//! # Block format
//!
//! ```text
//!
//!
//! <header>
//!
//! [MONSTER - bestiary-mm.json]:
//! {
//!   "name": "Dragone Rosso",
//!   "hp": 200
//! }
//! ```
//!
//! # Bounds
//!
//! - A [`Budget`] soft-caps the entry text in characters. It is checked right
//!   after each appended record; once spent reaches the limit, assembly stops.
//!   The last entry may overshoot the cap by its own length.
//! - An optional deadline is checked before every document and record; when
//!   it passes, the block assembled so far is returned.
//!
//! [`Assembler::search`] never fails. Unreadable documents are skipped and
//! anything unexpected is logged and turned into an empty block.

use anyhow::Result;
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::CorpusConfig;
use crate::document::extract_records;
use crate::matcher::KeywordSet;
use crate::models::Record;
use crate::walker::CorpusWalker;

/// Character budget for accumulated record entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    limit: usize,
    spent: usize,
}

impl Budget {
    pub fn new(limit: usize) -> Self {
        Self { limit, spent: 0 }
    }

    pub fn charge(&mut self, chars: usize) {
        self.spent = self.spent.saturating_add(chars);
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent >= self.limit
    }

    pub fn spent(&self) -> usize {
        self.spent
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Outcome of one corpus pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    /// Concatenated record entries, without the header.
    pub entries: String,
    pub matched: usize,
    pub documents: usize,
    pub unparseable: usize,
    /// Stopped because the budget ran out.
    pub capped: bool,
    /// Stopped because the deadline passed.
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct Assembler {
    walker: CorpusWalker,
    reserved: Vec<String>,
    max_chars: usize,
    deadline: Option<Duration>,
    header: String,
}

impl Assembler {
    pub fn new(walker: CorpusWalker, max_chars: usize) -> Self {
        let defaults = CorpusConfig::default();
        Self {
            walker,
            reserved: defaults.reserved_keys,
            max_chars,
            deadline: None,
            header: defaults.header,
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Result<Self> {
        let walker = CorpusWalker::from_config(config)?;
        Ok(Self {
            walker,
            reserved: config.reserved_keys.clone(),
            max_chars: config.max_chars,
            deadline: (config.deadline_ms > 0).then(|| Duration::from_millis(config.deadline_ms)),
            header: config.header.clone(),
        })
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn walker(&self) -> &CorpusWalker {
        &self.walker
    }

    pub fn reserved_keys(&self) -> &[String] {
        &self.reserved
    }

    /// Build the augmentation block for `query`.
    ///
    /// Returns `""` when the query has no keywords, nothing matched, or the
    /// search failed. Otherwise the block starts with a blank line and the
    /// header and can be appended directly to a prompt.
    pub fn search(&self, query: &str) -> String {
        let keywords = KeywordSet::from_query(query);
        if keywords.is_empty() {
            return String::new();
        }

        match self.assemble(&keywords) {
            Ok(assembly) => {
                tracing::debug!(
                    keywords = ?keywords.keywords(),
                    matched = assembly.matched,
                    documents = assembly.documents,
                    unparseable = assembly.unparseable,
                    capped = assembly.capped,
                    timed_out = assembly.timed_out,
                    "corpus search finished"
                );
                self.wrap(&assembly)
            }
            Err(err) => {
                tracing::error!(error = %err, "corpus search failed, continuing without augmentation");
                String::new()
            }
        }
    }

    /// Wrap assembled entries with the header, or `""` when nothing matched.
    pub fn wrap(&self, assembly: &Assembly) -> String {
        if assembly.entries.is_empty() {
            String::new()
        } else {
            format!("\n\n{}\n{}", self.header, assembly.entries)
        }
    }

    /// Walk the corpus once and collect the entries of matching records.
    pub fn assemble(&self, keywords: &KeywordSet) -> Result<Assembly> {
        let mut assembly = Assembly::default();
        if keywords.is_empty() {
            return Ok(assembly);
        }

        let started = Instant::now();
        let expired = || self.deadline.is_some_and(|d| started.elapsed() >= d);
        let mut budget = Budget::new(self.max_chars);

        'documents: for path in self.walker.documents() {
            if expired() {
                assembly.timed_out = true;
                break;
            }

            let document = extract_records(&path, &self.reserved);
            assembly.documents += 1;
            if !document.is_parseable() {
                assembly.unparseable += 1;
                continue;
            }

            for category in document.categories() {
                for record in &category.records {
                    if expired() {
                        assembly.timed_out = true;
                        break 'documents;
                    }
                    if !keywords.matches(record) {
                        continue;
                    }

                    let Some(entry) = format_entry(&category.key, &path, record)? else {
                        continue;
                    };
                    budget.charge(entry.chars().count());
                    assembly.entries.push_str(&entry);
                    assembly.matched += 1;

                    if budget.is_exhausted() {
                        assembly.capped = true;
                        break 'documents;
                    }
                }
            }
        }

        if assembly.timed_out {
            tracing::warn!(
                deadline_ms = self.deadline.map(|d| d.as_millis() as u64),
                matched = assembly.matched,
                "corpus search deadline reached, returning partial augmentation"
            );
        }

        Ok(assembly)
    }
}

/// Render one labeled entry. `None` when the record cannot be serialized.
fn format_entry(category: &str, path: &Path, record: &Record) -> Result<Option<String>> {
    let body = match record.to_pretty_json() {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "skipping unserializable record");
            return Ok(None);
        }
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut entry = String::with_capacity(body.len() + category.len() + file_name.len() + 8);
    write!(entry, "\n[{} - {}]:\n{}\n", category.to_uppercase(), file_name, body)?;
    Ok(Some(entry))
}

/// One-shot search over the corpus described by `config`.
///
/// Never fails: an invalid configuration is logged and yields `""`.
pub fn search(config: &CorpusConfig, query: &str) -> String {
    match Assembler::from_config(config) {
        Ok(assembler) => assembler.search(query),
        Err(err) => {
            tracing::error!(error = %err, "corpus configuration unusable, continuing without augmentation");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn assembler(root: &Path, max_chars: usize) -> Assembler {
        Assembler::new(CorpusWalker::new(root, "json"), max_chars)
    }

    #[test]
    fn budget_exhausts_at_limit() {
        let mut budget = Budget::new(10);
        budget.charge(9);
        assert!(!budget.is_exhausted());
        budget.charge(1);
        assert!(budget.is_exhausted());
        assert_eq!(budget.spent(), 10);
        assert_eq!(budget.limit(), 10);
    }

    #[test]
    fn entry_format() {
        let record = match serde_json::json!({"name": "Dragone Rosso", "hp": 200}) {
            serde_json::Value::Object(map) => Record::new(map),
            _ => unreachable!(),
        };
        let entry = format_entry("monster", Path::new("/data/bestiary/mm.json"), &record)
            .unwrap()
            .unwrap();
        assert_eq!(
            entry,
            "\n[MONSTER - mm.json]:\n{\n  \"name\": \"Dragone Rosso\",\n  \"hp\": 200\n}\n"
        );
    }

    #[test]
    fn generic_query_skips_filesystem() {
        // Root does not exist, but no keyword survives, so it is never touched.
        let assembler = assembler(Path::new("/definitely/not/here"), 8000);
        assert_eq!(assembler.search("il re"), "");
    }

    #[test]
    fn header_wraps_entries() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("items.json"),
            r#"{"item": [{"name": "Spada Fiammeggiante", "rarity": "rare"}]}"#,
        )
        .unwrap();

        let result = assembler(tmp.path(), 8000)
            .with_header("DATA:")
            .search("spada");
        assert!(result.starts_with("\n\nDATA:\n\n[ITEM - items.json]:\n"));
        assert!(result.contains("\"rarity\": \"rare\""));
    }

    #[test]
    fn stops_after_record_that_crosses_cap() {
        let tmp = TempDir::new().unwrap();
        let records: Vec<String> = (0..20)
            .map(|i| format!(r#"{{"name": "Goblin {}", "lore": "{}"}}"#, i, "x".repeat(50)))
            .collect();
        fs::write(
            tmp.path().join("monsters.json"),
            format!(r#"{{"monster": [{}]}}"#, records.join(",")),
        )
        .unwrap();

        let assembler = assembler(tmp.path(), 200);
        let assembly = assembler
            .assemble(&KeywordSet::from_query("goblin"))
            .unwrap();
        assert!(assembly.capped);
        assert!(assembly.matched < 20);

        let entry_len = assembly.entries.chars().count() / assembly.matched;
        let total = assembly.entries.chars().count();
        assert!(total >= 200);
        assert!(total < 200 + entry_len + 1);
    }

    #[test]
    fn zero_deadline_returns_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("items.json"),
            r#"{"item": [{"name": "Spada"}]}"#,
        )
        .unwrap();

        let assembler = assembler(tmp.path(), 8000).with_deadline(Some(Duration::ZERO));
        let assembly = assembler.assemble(&KeywordSet::from_query("spada")).unwrap();
        assert!(assembly.timed_out);
        assert_eq!(assembly.matched, 0);
        assert_eq!(assembler.search("spada"), "");
    }

    #[test]
    fn counts_unparseable_documents() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.json"), "{ broken").unwrap();
        fs::write(tmp.path().join("b.json"), r#"{"item": [{"name": "Spada"}]}"#).unwrap();

        let assembly = assembler(tmp.path(), 8000)
            .assemble(&KeywordSet::from_query("spada"))
            .unwrap();
        assert_eq!(assembly.documents, 2);
        assert_eq!(assembly.unparseable, 1);
        assert_eq!(assembly.matched, 1);
    }

    #[test]
    fn bad_config_yields_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.json"), r#"{"item": [{"name": "Spada"}]}"#).unwrap();
        let config = CorpusConfig {
            root: tmp.path().to_path_buf(),
            exclude_globs: vec!["[".to_string()],
            ..CorpusConfig::default()
        };
        assert_eq!(search(&config, "spada"), "");
    }
}
