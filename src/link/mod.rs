//! Link module - the point-to-point connection to the sensor/actuator node

#[cfg(feature = "serial")]
mod serial;
mod simulated;

#[cfg(feature = "serial")]
pub use serial::SerialLink;
pub use simulated::SimulatedLink;

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LinkConfig;

/// Link-level failure
#[derive(Debug, Error)]
pub enum LinkError {
    /// The connection has been closed (or was never opened)
    #[error("link is closed")]
    Closed,

    /// The device could not be opened
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// Read or write fault on an open link
    #[error("link i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level access to the sensor node.
///
/// `read` must return within the configured poll timeout; `Ok(0)` means
/// nothing arrived in that window. After `close` every call reports
/// [`LinkError::Closed`].
pub trait LinePort: Send + Sync {
    /// Device name for logs
    fn name(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Read whatever bytes are available, waiting at most one poll timeout.
    fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Write all bytes and flush.
    fn write(&self, bytes: &[u8]) -> Result<(), LinkError>;

    fn close(&self);
}

/// Parity setting for the serial line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Port discovered on the host
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
}

/// Open the link described by `config`.
///
/// Demo mode always yields a [`SimulatedLink`].
pub fn open(config: &LinkConfig, demo: bool) -> Result<Arc<dyn LinePort>, LinkError> {
    if demo {
        return Ok(Arc::new(SimulatedLink::new(config.poll_timeout())));
    }

    let port = config.port.clone().ok_or_else(|| LinkError::Open {
        port: "<unset>".to_string(),
        reason: "no serial port configured".to_string(),
    })?;

    open_serial(&port, config)
}

#[cfg(feature = "serial")]
fn open_serial(port: &str, config: &LinkConfig) -> Result<Arc<dyn LinePort>, LinkError> {
    Ok(Arc::new(SerialLink::open(port, config)?))
}

#[cfg(not(feature = "serial"))]
fn open_serial(port: &str, _config: &LinkConfig) -> Result<Arc<dyn LinePort>, LinkError> {
    Err(LinkError::Open {
        port: port.to_string(),
        reason: "serial support not enabled - build with --features serial".to_string(),
    })
}

/// Enumerate serial ports on this host
#[cfg(feature = "serial")]
pub fn available_ports() -> Vec<PortInfo> {
    serial::list_ports()
}

/// Enumerate serial ports on this host
#[cfg(not(feature = "serial"))]
pub fn available_ports() -> Vec<PortInfo> {
    Vec::new()
}
