//! Prompt composition.

/// A prompt ready for the model: system context plus the user's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Persona context followed by the augmentation block.
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Merge persona, augmentation block, and query.
    ///
    /// `augmentation` is taken by value; it is either `""` or a block that
    /// already starts with its own blank lines.
    pub fn compose(persona: &str, augmentation: String, query: &str) -> Self {
        let mut system = String::with_capacity(persona.len() + augmentation.len());
        system.push_str(persona);
        system.push_str(&augmentation);
        Self {
            system,
            user: query.to_string(),
        }
    }

    /// A standalone instruction with no persona or corpus context.
    pub fn instruction(text: impl Into<String>) -> Self {
        Self {
            system: String::new(),
            user: text.into(),
        }
    }

    /// Flattened form for backends that take a single text.
    pub fn to_single_text(&self) -> String {
        if self.system.is_empty() {
            return self.user.clone();
        }
        format!("{}\n\nUtente: {}", self.system, self.user)
    }
}
