// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Fireguard - indoor fire-suppression controller
//!
//! Reads environmental sensors from a microcontroller over a serial link,
//! opens a suppression valve when limits are exceeded, counts people from a
//! camera, and keeps an audit trail and status feed for operators.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Session                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────┐   ┌──────────┐   ┌─────────┐   ┌─────────────────┐  │
//! │  │ Link │ → │ Protocol │ → │ Sensors │ → │ Control Engine  │  │
//! │  └──────┘   └──────────┘   └─────────┘   └─────────────────┘  │
//! │      ↑                          │              │              │
//! │      └──── valve command ───────┼──────────────┘              │
//! │                                 ↓                             │
//! │  ┌───────────┐   ┌─────────────────────┐   ┌───────────────┐  │
//! │  │ Detection │ → │ Persistence (SQLite)│ ← │  Status API   │  │
//! │  └───────────┘   └─────────────────────┘   └───────────────┘  │
//! │        │                                                      │
//! │        └──────────→ Telemetry (HTTP / MQTT) ←── sensors       │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod console;
pub mod control;
pub mod core;
pub mod db;
pub mod detection;
pub mod error;
pub mod link;
pub mod protocol;
pub mod sensors;
pub mod streaming;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::Config;
pub use control::{ControlEngine, ThresholdConfig, ValveMode, ValveState};
pub use core::{EventBus, Session};
pub use db::PersistenceLog;
pub use error::{ControlError, PersistenceError, PublishError, QueryError};
pub use protocol::ProtocolDecoder;
pub use sensors::{Channel, SensorReading, SensorSnapshot, SensorState};

/// Fireguard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fireguard name
pub const NAME: &str = "Fireguard";

/// Compiled-in optional features
pub fn enabled_features() -> Vec<&'static str> {
    let mut features = vec![];

    #[cfg(feature = "serial")]
    features.push("serial");

    features
}
