// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Error taxonomy shared across the control path

use thiserror::Error;

use crate::link::LinkError;

/// Rejection of a valve or threshold operation.
///
/// None of these leave the valve state mutated.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A command was attempted while no link is attached
    #[error("sensor link is not open")]
    LinkClosed,

    /// Manual valve command issued while the controller is in automatic mode
    #[error("valve is under automatic control, switch to manual mode first")]
    AutoModeLocked,

    /// The command byte could not be written
    #[error("valve command failed: {0}")]
    Io(#[source] LinkError),

    /// Threshold edit rejected
    #[error("invalid threshold for {field}: {value}")]
    InvalidThreshold { field: &'static str, value: f64 },
}

impl From<LinkError> for ControlError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Closed => ControlError::LinkClosed,
            other => ControlError::Io(other),
        }
    }
}

/// Telemetry publish failure. Logged and skipped, never fatal.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish timed out after {0} ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint rejected properties with status {0}")]
    Rejected(u16),

    #[error("failed to encode properties: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Store failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The writer has shut down
    #[error("persistence log is closed")]
    Closed,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store did not answer within {0} ms")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-side failure for the status feed.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Shared state stayed locked past the read timeout
    #[error("state is busy, try again")]
    Busy,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_maps_to_control_error() {
        assert!(matches!(ControlError::from(LinkError::Closed), ControlError::LinkClosed));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(ControlError::from(LinkError::Io(io)), ControlError::Io(_)));
    }
}
