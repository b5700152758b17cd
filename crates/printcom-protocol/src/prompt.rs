//! Prompt entity.

use serde::Serialize;

/// One in-flight interactive prompt.
///
/// The text is fixed at creation; choices are append-only until the prompt
/// is shown to the remote user, after which the whole entity is frozen.
#[derive(Debug, Clone)]
pub struct Prompt {
    text: String,
    choices: Vec<String>,
    active: bool,
}

/// Read model handed to remote presentation and `prompt.get` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptSnapshot {
    pub text: String,
    pub choices: Vec<String>,
}

impl Prompt {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
            active: false,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    /// Whether the prompt has been presented to the remote user.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn add_choice(&mut self, text: impl Into<String>) {
        debug_assert!(!self.active, "choices are frozen once the prompt is shown");
        self.choices.push(text.into());
    }

    pub(crate) fn activate(&mut self) {
        self.active = true;
    }

    /// A choice index is valid iff `0 <= index < len(choices)`.
    #[must_use]
    pub fn validate_choice(&self, choice: usize) -> bool {
        choice < self.choices.len()
    }

    #[must_use]
    pub fn snapshot(&self) -> PromptSnapshot {
        PromptSnapshot {
            text: self.text.clone(),
            choices: self.choices.clone(),
        }
    }
}
