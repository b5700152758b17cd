//! Action-command prompt protocol core.
//!
//! Firmware can drive an interactive prompt on the host by emitting
//! out-of-band `prompt_*` action commands on the serial connection:
//! `prompt_begin` opens a prompt, `prompt_choice`/`prompt_button` append
//! selectable choices, `prompt_show` presents it to the remote user and
//! `prompt_end` dismisses it. The remote user's selection travels back as a
//! `<command> S<index>` line (default `M876 S<index>`).
//!
//! The crate holds the state machine for that sub-protocol and nothing
//! else: transports deliver already-identified action lines to
//! [`PromptService::handle_action_line`] and selections to
//! [`PromptService::select`]; presentation happens through the
//! [`PromptSink`] trait. The [`EmergencyPolicy`] predicate decides when an
//! answer command must bypass the normal outbound queue so it reaches the
//! firmware even while that queue is blocked on the prompt itself.

pub mod action;
pub mod controller;
pub mod emergency;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod service;
pub mod settings;

pub use action::PromptAction;
pub use controller::{PromptLifecycleController, PromptNotification};
pub use emergency::EmergencyPolicy;
pub use error::ProtocolError;
pub use gateway::SelectError;
pub use prompt::{Prompt, PromptSnapshot};
pub use service::{NullSink, PromptService, PromptSink, Selection};
pub use settings::{AnswerPolicy, PromptSettings, SharedPromptSettings, DEFAULT_COMMAND};
