//! Random level-1 character generation.
//!
//! A few race, class and background names are sampled from the corpus to
//! ground the model, which answers with a JSON character. The JSON is then
//! rendered as a text sheet.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::document::leading_names;
use crate::walker::CorpusWalker;

/// Substrings of document file names sampled for grounding.
pub const CATEGORIES: [&str; 3] = ["race", "class", "background"];
pub const SAMPLES_PER_CATEGORY: usize = 5;

/// Sent before generation starts.
pub const FORGING_NOTICE: &str = "📖 Codex20 consulta i Tomi per forgiare il tuo eroe...";
/// Sent when the model fails or its answer is not a usable character.
pub const CREATION_FAILED: &str = "Errore durante la creazione. 🎲";

/// Pick one random document per category and sample names from it.
///
/// Categories with no matching document, or whose chosen document does not
/// start with a list of records, are left out.
pub fn sample_names<R: Rng + ?Sized>(
    walker: &CorpusWalker,
    reserved: &[String],
    rng: &mut R,
) -> Map<String, Value> {
    let documents: Vec<PathBuf> = walker.documents().collect();
    let mut samples = Map::new();

    for category in CATEGORIES {
        let candidates: Vec<&PathBuf> = documents
            .iter()
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().contains(category))
            })
            .collect();
        let Some(path) = candidates.choose(rng) else {
            tracing::debug!(category, "no corpus document for category");
            continue;
        };
        let Some(names) = leading_names(path, reserved) else {
            tracing::debug!(category, path = %path.display(), "document has no leading record list");
            continue;
        };
        let picked = names
            .choose_multiple(rng, SAMPLES_PER_CATEGORY)
            .cloned()
            .map(Value::String)
            .collect();
        samples.insert(category.to_string(), Value::Array(picked));
    }

    samples
}

/// The generation request sent to the model.
pub fn generation_request(samples: &Map<String, Value>) -> String {
    format!(
        "Genera un personaggio di D&D 5e di livello 1. JSON: nome, razza, classe, background, \
         forza, destrezza, costituzione, intelligenza, saggezza, carisma, competenze, \
         equipaggiamento, descrizione_breve. Usa: {}.",
        Value::Object(samples.clone())
    )
}

/// Remove Markdown code fences the model wraps around its JSON.
pub fn strip_code_fence(answer: &str) -> String {
    answer
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn default_score() -> Value {
    Value::from(10)
}

/// A generated character. Values are kept as JSON because the model is free
/// to answer with strings, numbers or lists.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterSheet {
    pub nome: Value,
    pub razza: Value,
    pub classe: Value,
    pub background: Value,
    #[serde(default = "default_score")]
    pub forza: Value,
    #[serde(default = "default_score")]
    pub destrezza: Value,
    #[serde(default = "default_score")]
    pub costituzione: Value,
    #[serde(default = "default_score")]
    pub intelligenza: Value,
    #[serde(default = "default_score")]
    pub saggezza: Value,
    #[serde(default = "default_score")]
    pub carisma: Value,
    #[serde(default)]
    pub competenze: Value,
    #[serde(default)]
    pub equipaggiamento: Value,
    #[serde(default)]
    pub descrizione_breve: Value,
}

impl CharacterSheet {
    /// Decode a model answer, with or without code fences.
    pub fn from_answer(answer: &str) -> Result<Self> {
        serde_json::from_str(&strip_code_fence(answer))
            .context("model answer is not a character JSON object")
    }

    pub fn render(&self) -> String {
        let scores: Vec<String> = [
            ("FORZA", &self.forza),
            ("DESTREZZA", &self.destrezza),
            ("COSTITUZIONE", &self.costituzione),
            ("INTELLIGENZA", &self.intelligenza),
            ("SAGGEZZA", &self.saggezza),
            ("CARISMA", &self.carisma),
        ]
        .iter()
        .map(|(label, value)| format!("{}: {}", label, text(value)))
        .collect();

        format!(
            "Scheda Personaggio: {}\n\
             Razza: {} | Classe: {}\n\
             Background: {}\n\n\
             {}\n{}\n\n\
             Competenze: {}\n\
             Equipaggiamento: {}\n\n\
             Descrizione: {}\n\n\
             Eroe pronto: *{}*! 🎲",
            text(&self.nome),
            text(&self.razza),
            text(&self.classe),
            text(&self.background),
            scores[..3].join(" | "),
            scores[3..].join(" | "),
            text(&self.competenze),
            text(&self.equipaggiamento),
            text(&self.descrizione_breve),
            text(&self.nome),
        )
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
