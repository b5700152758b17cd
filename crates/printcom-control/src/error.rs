//! Host error type.

use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("invalid config: {0}")]
    InvalidConfig(SmolStr),
    #[error("control error: {0}")]
    ControlError(SmolStr),
}

impl From<printcom_protocol::ProtocolError> for HostError {
    fn from(err: printcom_protocol::ProtocolError) -> Self {
        match err {
            printcom_protocol::ProtocolError::InvalidSetting(message) => {
                Self::InvalidConfig(message)
            }
        }
    }
}
