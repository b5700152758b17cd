//! Action-command line decoding.

/// Verb prefix reserved for the prompt sub-protocol.
pub const PROMPT_VERB_PREFIX: &str = "prompt_";

/// One decoded prompt action command.
///
/// Decoding happens once at the transport boundary; everything past this
/// point works on the closed variant set instead of raw verb strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptAction {
    /// `prompt_begin <text>`: open a new prompt with the given text.
    Begin(String),
    /// `prompt_choice <text>` / `prompt_button <text>`: append a choice.
    Choice(String),
    /// `prompt_show`: present the prompt to the remote user.
    Show,
    /// `prompt_end`: dismiss the prompt.
    End,
    /// A `prompt_*` verb this build does not understand. The protocol is
    /// forward-compatible: these are ignored, not errors.
    Unrecognized,
}

impl PromptAction {
    /// Decodes one action-command line.
    ///
    /// Returns `None` when the verb does not carry the `prompt_` prefix so
    /// the caller can route other action verbs elsewhere without touching
    /// prompt state. The line splits on the first run of whitespace into a
    /// verb and a single trailing parameter; the parameter is trimmed.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        if !line.starts_with(PROMPT_VERB_PREFIX) {
            return None;
        }
        let (verb, parameter) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let action = match verb {
            "prompt_begin" => Self::Begin(parameter.to_string()),
            "prompt_choice" | "prompt_button" => Self::Choice(parameter.to_string()),
            "prompt_show" => Self::Show,
            "prompt_end" => Self::End,
            _ => Self::Unrecognized,
        };
        Some(action)
    }
}
