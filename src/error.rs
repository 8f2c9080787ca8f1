//! Error types shared by the manager components

use thiserror::Error;

use crate::link::HardwareStatus;
use crate::mqtt::message_manager::FormatError;

/// Failures reported by [`crate::mqtt::MqttManager`] operations.
///
/// None of these are fatal. The manager keeps running and retries on the next
/// `routine()` tick; the caller decides whether a value is worth logging.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Adapter or cable missing, reconnect attempts are suppressed
    #[error("transport unavailable: {0}")]
    TransportUnavailable(HardwareStatus),

    /// Broker rejected or was unreachable; retried on the fixed interval
    #[error("connect failed, return code {code}")]
    ConnectFailed { code: i32 },

    #[error("publish to {topic} failed")]
    PublishFailed { topic: String },

    #[error("subscribe to {topic} failed")]
    SubscribeFailed { topic: String },

    /// One state string per registered prop is required
    #[error("expected {expected} prop states, got {actual}")]
    StateCountMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Format(#[from] FormatError),
}
