//! Selection validation.

use thiserror::Error;

use crate::controller::{PromptLifecycleController, PromptNotification};
use crate::settings::{AnswerPolicy, PromptSettings};

/// Caller-visible selection failures.
///
/// Unlike firmware desync these are driven by an explicit user action, so
/// they surface instead of being dropped. [`SelectError::wire_class`] gives
/// the transport its response class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("choice must be an integer")]
    NotAnInteger,
    #[error("no active prompt")]
    NoActivePrompt,
    #[error("choice {choice} is out of range for a prompt with {available} choices")]
    ChoiceOutOfRange { choice: i64, available: usize },
}

impl SelectError {
    /// Response class for the transport: the out-of-range and type failures
    /// are bad requests, a missing prompt is a state conflict.
    #[must_use]
    pub fn wire_class(&self) -> &'static str {
        match self {
            Self::NotAnInteger | Self::ChoiceOutOfRange { .. } => "bad-request",
            Self::NoActivePrompt => "conflict",
        }
    }
}

/// A validated, applied selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Firmware command carrying the selection, e.g. `M876 S2`.
    pub command: String,
    /// Close notification for the presentation channel.
    pub notification: PromptNotification,
}

/// Validates a raw selection payload against the current prompt and, on
/// success, closes the prompt through the controller's answer transition.
///
/// The payload arrives from an untyped transport, so integer-ness is
/// checked here rather than assumed. Authorization is the transport's
/// responsibility; this function must only be reachable behind that check.
pub fn select(
    controller: &mut PromptLifecycleController,
    settings: &PromptSettings,
    raw: &serde_json::Value,
) -> Result<Answer, SelectError> {
    let choice = raw.as_i64().ok_or(SelectError::NotAnInteger)?;
    let prompt = controller.current().ok_or(SelectError::NoActivePrompt)?;
    if settings.answer_policy == AnswerPolicy::RequireActive && !prompt.is_active() {
        return Err(SelectError::NoActivePrompt);
    }
    let index = usize::try_from(choice).map_err(|_| SelectError::ChoiceOutOfRange {
        choice,
        available: prompt.choices().len(),
    })?;
    if !prompt.validate_choice(index) {
        return Err(SelectError::ChoiceOutOfRange {
            choice,
            available: prompt.choices().len(),
        });
    }
    // existence was checked above, but stay total
    let notification = controller.answer().ok_or(SelectError::NoActivePrompt)?;
    Ok(Answer {
        command: format!("{} S{index}", settings.command),
        notification,
    })
}
