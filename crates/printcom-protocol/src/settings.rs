//! Runtime-adjustable prompt settings.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use smol_str::SmolStr;

use crate::emergency::EmergencyPolicy;
use crate::error::ProtocolError;

/// Default answer/trigger command name.
pub const DEFAULT_COMMAND: &str = "M876";

/// Whether a selection may answer a prompt that exists but has not been
/// shown yet. Firmware is expected to send `prompt_show` before it cares
/// about the answer, but some firmwares accept the answer straight after
/// `prompt_begin`, so the permissive mode is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerPolicy {
    AllowPending,
    RequireActive,
}

impl AnswerPolicy {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "allow-pending" => Ok(Self::AllowPending),
            "require-active" => Ok(Self::RequireActive),
            _ => Err(ProtocolError::InvalidSetting(
                format!("invalid answer_policy '{text}'").into(),
            )),
        }
    }
}

/// Settings governing the prompt sub-protocol.
///
/// Shared between the protocol core and the control plane so `config.set`
/// can apply changes without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSettings {
    pub command: SmolStr,
    pub enable_emergency_sending: bool,
    pub answer_policy: AnswerPolicy,
}

pub type SharedPromptSettings = Arc<Mutex<PromptSettings>>;

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            command: SmolStr::new_static(DEFAULT_COMMAND),
            // TODO default to true once firmware capability reports are
            // parsed and EMERGENCY_PARSER presence can gate this
            enable_emergency_sending: false,
            answer_policy: AnswerPolicy::AllowPending,
        }
    }
}

impl PromptSettings {
    pub fn set_command(&mut self, command: &str) -> Result<(), ProtocolError> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::InvalidSetting(
                "command must not be empty".into(),
            ));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ProtocolError::InvalidSetting(
                format!("command '{trimmed}' must be a single opcode").into(),
            ));
        }
        self.command = SmolStr::new(trimmed);
        Ok(())
    }

    #[must_use]
    pub fn shared(self) -> SharedPromptSettings {
        Arc::new(Mutex::new(self))
    }

    /// The force-send predicate for the current settings.
    #[must_use]
    pub fn emergency_policy(&self) -> EmergencyPolicy {
        EmergencyPolicy {
            command: self.command.clone(),
            enabled: self.enable_emergency_sending,
        }
    }
}
