//! Message handling shared by every chat transport and the CLI.
//!
//! For each incoming text the [`Bot`] runs the corpus search, composes the
//! prompt, calls the model, and formats the reply. The search is synchronous
//! file I/O, so it runs on a blocking worker thread.

use std::sync::Arc;

use crate::augment::Assembler;
use crate::character::{self, CharacterSheet};
use crate::llm::LlmClient;
use crate::prompt::Prompt;

/// Sent when the model call fails.
pub const APOLOGY: &str = "Spiacente, Codex20 ha avuto un glitch di comunicazione. 🎲";

const DICE_SUFFIX: &str = "\n\n🎲";

/// How the transport should render a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub parse_mode: ParseMode,
}

impl Reply {
    /// Format a model answer for delivery.
    ///
    /// Answers longer than `max_chars` are cut to `max_chars` characters,
    /// suffixed with `...`, and sent as plain text.
    pub fn from_answer(answer: &str, max_chars: usize) -> Self {
        if answer.chars().count() > max_chars {
            let head: String = answer.chars().take(max_chars).collect();
            Self {
                text: format!("{}...", head),
                parse_mode: ParseMode::Plain,
            }
        } else {
            Self {
                text: format!("{}{}", answer, DICE_SUFFIX),
                parse_mode: ParseMode::Markdown,
            }
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Plain,
        }
    }

    pub fn apology() -> Self {
        Self::plain(APOLOGY)
    }
}

/// Slash commands understood besides free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/randompg`: generate a random level-1 character.
    RandomCharacter,
}

impl Command {
    /// Recognize a command in the first word of `text`, with or without a
    /// `@botname` suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        match name {
            "/randompg" => Some(Command::RandomCharacter),
            _ => None,
        }
    }
}

pub struct Bot {
    assembler: Arc<Assembler>,
    llm: Arc<dyn LlmClient>,
    persona: String,
    authorized_user_id: Option<i64>,
    max_reply_chars: usize,
}

impl Bot {
    pub fn new(
        assembler: Assembler,
        llm: Arc<dyn LlmClient>,
        persona: String,
        authorized_user_id: Option<i64>,
        max_reply_chars: usize,
    ) -> Self {
        Self {
            assembler: Arc::new(assembler),
            llm,
            persona,
            authorized_user_id,
            max_reply_chars,
        }
    }

    /// True when no user restriction is configured or `user_id` is the allowed one.
    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_user_id.map_or(true, |allowed| allowed == user_id)
    }

    /// Search the corpus for `query` off the async runtime.
    pub async fn augmentation(&self, query: &str) -> String {
        let assembler = Arc::clone(&self.assembler);
        let query = query.to_string();
        match tokio::task::spawn_blocking(move || assembler.search(&query)).await {
            Ok(block) => block,
            Err(err) => {
                tracing::error!(error = %err, "corpus search task failed");
                String::new()
            }
        }
    }

    pub async fn compose(&self, query: &str) -> Prompt {
        let augmentation = self.augmentation(query).await;
        Prompt::compose(&self.persona, augmentation, query)
    }

    /// Produce the reply for one user message. Never fails.
    pub async fn handle(&self, text: &str) -> Reply {
        let prompt = self.compose(text).await;
        match self.llm.generate(&prompt).await {
            Ok(answer) => Reply::from_answer(&answer, self.max_reply_chars),
            Err(err) => {
                tracing::error!(backend = self.llm.name(), error = %err, "model call failed");
                Reply::apology()
            }
        }
    }

    /// Generate a random character sheet grounded in corpus names. Never fails.
    pub async fn random_character(&self) -> Reply {
        let assembler = Arc::clone(&self.assembler);
        let samples = tokio::task::spawn_blocking(move || {
            character::sample_names(
                assembler.walker(),
                assembler.reserved_keys(),
                &mut rand::thread_rng(),
            )
        })
        .await
        .unwrap_or_else(|err| {
            tracing::error!(error = %err, "character sampling task failed");
            Default::default()
        });
        tracing::debug!(categories = samples.len(), "sampled corpus names for character");

        let prompt = Prompt::instruction(character::generation_request(&samples));
        let sheet = match self.llm.generate(&prompt).await {
            Ok(answer) => CharacterSheet::from_answer(&answer),
            Err(err) => Err(err.into()),
        };
        match sheet {
            Ok(sheet) => Reply {
                text: sheet.render(),
                parse_mode: ParseMode::Markdown,
            },
            Err(err) => {
                tracing::error!(backend = self.llm.name(), error = %format!("{:#}", err), "character generation failed");
                Reply::plain(character::CREATION_FAILED)
            }
        }
    }
}
