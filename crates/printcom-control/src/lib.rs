//! Control plane for the prompt protocol host.
//!
//! Wraps the [`printcom_protocol`] core with the pieces a running host
//! needs: TOML configuration, the outbound send queue with the emergency
//! bypass, and a line-oriented JSON IPC server carrying prompt reads,
//! selections and the presentation push channel.

pub mod config;
pub mod error;
pub mod queue;
pub mod server;
pub mod transport;

pub use config::HostConfig;
pub use error::HostError;
pub use queue::{DispatchOutcome, FirmwareLink, SendQueue};
pub use server::{ControlServer, ControlState};
pub use transport::{ControlEndpoint, ControlFanout};
