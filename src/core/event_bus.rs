// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Event bus for operator notifications

use std::sync::atomic::{AtomicU64, Ordering};
use std::fmt;
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Warning => "warning",
            NotifyLevel::Error => "error",
        })
    }
}

/// One-shot message for whoever is watching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: NotifyLevel,
    pub message: String,
}

/// Fan-out of operator notifications.
///
/// Sending never blocks. With no subscribers, messages are logged and dropped.
pub struct EventBus {
    notify_tx: broadcast::Sender<Notification>,
    counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (notify_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            notify_tx,
            counter: AtomicU64::new(0),
        }
    }

    pub fn notify(&self, level: NotifyLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotifyLevel::Info => info!("{}", message),
            NotifyLevel::Warning => warn!("{}", message),
            NotifyLevel::Error => error!("{}", message),
        }

        let notification = Notification {
            id: self.counter.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            level,
            message,
        };
        let _ = self.notify_tx.send(notification);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NotifyLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(NotifyLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NotifyLevel::Error, message);
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notify_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
