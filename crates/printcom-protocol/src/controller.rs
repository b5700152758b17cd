//! Prompt lifecycle state machine.

use serde::Serialize;
use tracing::warn;

use crate::prompt::{Prompt, PromptSnapshot};

/// Message for the remote presentation channel.
///
/// Serializes to the wire shapes `{"action":"show","text":…,"choices":…}`
/// and `{"action":"close"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PromptNotification {
    Show {
        text: String,
        choices: Vec<String>,
    },
    Close,
}

/// Owns the single prompt slot and enforces the lifecycle ordering.
///
/// The firmware side is an untrusted, asynchronous and occasionally buggy
/// producer, so out-of-order events are never fatal: the offending event is
/// dropped with a warning and the slot stays in a well-defined state.
///
/// Transitions return the notification to deliver, if any. Callers hold
/// whatever lock guards this controller for the whole transition and
/// dispatch the notification only after releasing it, so a slow or
/// re-entrant presentation channel cannot stall the protocol.
#[derive(Debug, Default)]
pub struct PromptLifecycleController {
    slot: Option<Prompt>,
}

impl PromptLifecycleController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `prompt_begin`: open a new prompt. An inactive leftover prompt is
    /// silently replaced; an active one stays and the event is dropped.
    pub fn begin(&mut self, text: &str) {
        if self.slot.as_ref().is_some_and(Prompt::is_active) {
            warn!("prompt_begin while a prompt is already active, ignoring");
            return;
        }
        self.slot = Some(Prompt::new(text));
    }

    /// `prompt_choice`/`prompt_button`: append a choice to the pending
    /// prompt.
    pub fn choice(&mut self, text: &str) {
        match self.slot.as_mut() {
            None => {}
            Some(prompt) if prompt.is_active() => {
                warn!("prompt_choice after prompt_show, ignoring");
            }
            Some(prompt) => prompt.add_choice(text),
        }
    }

    /// `prompt_show`: freeze the prompt and hand it to presentation.
    pub fn show(&mut self) -> Option<PromptNotification> {
        let prompt = self.slot.as_mut()?;
        if prompt.is_active() {
            warn!("prompt_show while the prompt is already shown, ignoring");
            return None;
        }
        prompt.activate();
        Some(PromptNotification::Show {
            text: prompt.text().to_string(),
            choices: prompt.choices().to_vec(),
        })
    }

    /// `prompt_end`: discard the prompt, shown or not.
    pub fn end(&mut self) -> Option<PromptNotification> {
        self.slot.take().map(|_| PromptNotification::Close)
    }

    /// Closes the prompt after a validated selection. The selection gateway
    /// has already checked existence, activeness policy and index range.
    pub(crate) fn answer(&mut self) -> Option<PromptNotification> {
        self.end()
    }

    #[must_use]
    pub fn current(&self) -> Option<&Prompt> {
        self.slot.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<PromptSnapshot> {
        self.slot.as_ref().map(Prompt::snapshot)
    }
}
