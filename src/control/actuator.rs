// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Valve actuator - writes command bytes to the attached link

use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::ValveCommand;
use crate::link::{LinePort, LinkError};

/// Confirmation that the command byte left the host.
///
/// The valve driver sends nothing back, so this is not proof that the
/// valve moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ack {
    pub command: ValveCommand,
    pub written_at: DateTime<Utc>,
}

/// Sends valve commands through whichever link is currently attached
#[derive(Default)]
pub struct ValveActuator {
    link: RwLock<Option<Arc<dyn LinePort>>>,
}

impl ValveActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, link: Arc<dyn LinePort>) {
        info!("Valve actuator attached to {}", link.name());
        *self.link.write() = Some(link);
    }

    /// Detach the link. Blocks until any in-flight `send` has finished.
    pub fn detach(&self) -> Option<Arc<dyn LinePort>> {
        self.link.write().take()
    }

    pub fn link_open(&self) -> bool {
        self.link.read().as_ref().map_or(false, |l| l.is_open())
    }

    pub fn send(&self, command: ValveCommand) -> Result<Ack, LinkError> {
        let guard = self.link.read();
        let link = guard.as_ref().filter(|l| l.is_open()).ok_or(LinkError::Closed)?;

        link.write(&[command.byte()])?;
        debug!("Sent valve command {:?} (0x{:02X})", command, command.byte());

        Ok(Ack {
            command,
            written_at: Utc::now(),
        })
    }
}
