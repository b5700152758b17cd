//! Protocol error type.

use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("invalid setting: {0}")]
    InvalidSetting(SmolStr),
}
