//! Emergency force-send predicate.

use smol_str::SmolStr;

/// Decides whether an outbound command must bypass the normal send queue.
///
/// A prompt answer has to reach the firmware even while the queue is backed
/// up or paused on a firmware-side blocking prompt, so the configured
/// answer command gets an express lane. This is a side channel: it never
/// touches prompt state.
#[derive(Debug, Clone)]
pub struct EmergencyPolicy {
    pub command: SmolStr,
    pub enabled: bool,
}

impl EmergencyPolicy {
    /// True iff the opcode equals the configured command, emergency sending
    /// is enabled, and the raw text carries an `S` parameter token after
    /// the opcode. A bare `M876` is not an answer and never jumps the
    /// queue.
    #[must_use]
    pub fn should_force_send(&self, opcode: &str, raw: &str) -> bool {
        if !self.enabled || opcode != self.command {
            return false;
        }
        raw.split_whitespace()
            .skip(1)
            .any(|token| token.starts_with('S'))
    }
}
