//! Thread-safe protocol surface.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::action::PromptAction;
use crate::controller::{PromptLifecycleController, PromptNotification};
use crate::gateway::{self, SelectError};
use crate::prompt::PromptSnapshot;
use crate::settings::{PromptSettings, SharedPromptSettings};

/// Remote presentation channel. Implementations must not block: the
/// service calls this fire-and-forget after every lifecycle transition that
/// produces a notification.
pub trait PromptSink: Send + Sync {
    fn send(&self, notification: PromptNotification);
}

/// Sink for hosts without a presentation channel (and for tests that only
/// care about state).
pub struct NullSink;

impl PromptSink for NullSink {
    fn send(&self, _notification: PromptNotification) {}
}

/// Outcome of a successful selection.
///
/// Carries the settings snapshot the selection was validated against so
/// the caller can queue the command under the same emergency policy even
/// if the shared settings change concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Firmware answer command, e.g. `M876 S1`.
    pub command: String,
    pub settings: PromptSettings,
}

/// The one mutual-exclusion domain of the protocol.
///
/// Two independent producers act on the prompt slot: the firmware line
/// reader (`handle_action_line`, single producer) and the remote selection
/// path (`select`, potentially many racing callers). Every transition runs
/// whole under the controller lock, including the read-then-mutate sequence
/// of a selection; notifications go out only after the guard drops.
pub struct PromptService {
    controller: Mutex<PromptLifecycleController>,
    settings: SharedPromptSettings,
    sink: Arc<dyn PromptSink>,
}

impl PromptService {
    #[must_use]
    pub fn new(settings: SharedPromptSettings, sink: Arc<dyn PromptSink>) -> Self {
        Self {
            controller: Mutex::new(PromptLifecycleController::new()),
            settings,
            sink,
        }
    }

    /// Feeds one action-command line into the state machine.
    ///
    /// Returns `true` when the line belonged to the prompt sub-protocol
    /// (including unrecognized `prompt_*` verbs), `false` when the caller
    /// should route it elsewhere.
    pub fn handle_action_line(&self, line: &str) -> bool {
        let Some(action) = PromptAction::parse(line) else {
            return false;
        };
        let notification = {
            let mut controller = self.lock_controller();
            match action {
                PromptAction::Begin(text) => {
                    controller.begin(&text);
                    None
                }
                PromptAction::Choice(text) => {
                    controller.choice(&text);
                    None
                }
                PromptAction::Show => controller.show(),
                PromptAction::End => controller.end(),
                PromptAction::Unrecognized => {
                    debug!("ignoring unrecognized prompt action '{line}'");
                    None
                }
            }
        };
        if let Some(notification) = notification {
            self.sink.send(notification);
        }
        true
    }

    /// Applies a remote selection and returns the firmware answer command
    /// to transmit, together with the settings snapshot it was validated
    /// against. The caller owns queuing (and the emergency bypass).
    pub fn select(&self, raw: &serde_json::Value) -> Result<Selection, SelectError> {
        let settings = self.settings_snapshot();
        let answer = {
            let mut controller = self.lock_controller();
            gateway::select(&mut controller, &settings, raw)?
        };
        self.sink.send(answer.notification);
        Ok(Selection { command: answer.command, settings })
    }

    /// Current prompt read model, `None` when the slot is empty.
    #[must_use]
    pub fn snapshot(&self) -> Option<PromptSnapshot> {
        self.lock_controller().snapshot()
    }

    /// `(present, shown)` for status reporting.
    #[must_use]
    pub fn prompt_state(&self) -> (bool, bool) {
        let controller = self.lock_controller();
        match controller.current() {
            Some(prompt) => (true, prompt.is_active()),
            None => (false, false),
        }
    }

    #[must_use]
    pub fn settings_snapshot(&self) -> PromptSettings {
        self.settings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn lock_controller(&self) -> MutexGuard<'_, PromptLifecycleController> {
        // a poisoned slot is still convergent, keep going
        self.controller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
