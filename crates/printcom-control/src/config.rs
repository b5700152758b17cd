//! Host configuration loading.

use std::path::Path;

use serde::Deserialize;
use smol_str::SmolStr;

use printcom_protocol::{AnswerPolicy, PromptSettings};

use crate::error::HostError;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub host_name: SmolStr,
    pub control_endpoint: SmolStr,
    pub control_auth_token: Option<SmolStr>,
    pub log_level: SmolStr,
    pub prompt: PromptSettings,
}

impl HostConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|err| HostError::InvalidConfig(format!("host.toml: {err}").into()))?;
        parse_host_toml_from_text(&text, "host.toml")
    }
}

fn parse_host_toml_from_text(text: &str, file_name: &str) -> Result<HostConfig, HostError> {
    let raw: HostToml = toml::from_str(text)
        .map_err(|err| HostError::InvalidConfig(format!("{file_name}: {err}").into()))?;
    raw.into_config().map_err(|err| match err {
        HostError::InvalidConfig(message) => {
            HostError::InvalidConfig(format!("{file_name}: {message}").into())
        }
        other => other,
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostToml {
    host: HostSection,
    control: ControlSection,
    log: LogSection,
    prompt: Option<PromptSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostSection {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ControlSection {
    endpoint: String,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptSection {
    command: Option<String>,
    enable_emergency_sending: Option<bool>,
    answer_policy: Option<String>,
}

impl HostToml {
    fn into_config(self) -> Result<HostConfig, HostError> {
        if self.host.name.trim().is_empty() {
            return Err(HostError::InvalidConfig(
                "host.name must not be empty".into(),
            ));
        }
        if self.control.endpoint.trim().is_empty() {
            return Err(HostError::InvalidConfig(
                "control.endpoint must not be empty".into(),
            ));
        }
        if self.log.level.trim().is_empty() {
            return Err(HostError::InvalidConfig(
                "log.level must not be empty".into(),
            ));
        }
        let control_auth_token = self.control.auth_token.and_then(|token| {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(SmolStr::new(trimmed))
            }
        });
        if self.control.endpoint.starts_with("tcp://") && control_auth_token.is_none() {
            return Err(HostError::InvalidConfig(
                "control.auth_token required for tcp endpoint".into(),
            ));
        }

        let mut prompt = PromptSettings::default();
        if let Some(section) = self.prompt {
            if let Some(command) = section.command {
                prompt.set_command(&command)?;
            }
            if let Some(enabled) = section.enable_emergency_sending {
                prompt.enable_emergency_sending = enabled;
            }
            if let Some(policy) = section.answer_policy {
                prompt.answer_policy = AnswerPolicy::parse(&policy)?;
            }
        }

        Ok(HostConfig {
            host_name: SmolStr::new(self.host.name.trim()),
            control_endpoint: SmolStr::new(self.control.endpoint.trim()),
            control_auth_token,
            log_level: SmolStr::new(self.log.level.trim()),
            prompt,
        })
    }
}
