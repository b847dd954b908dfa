//! Control module - valve state machine, thresholds and actuation

mod actuator;
mod engine;

pub use actuator::{Ack, ValveActuator};
pub use engine::{ControlEngine, ManualOutcome};

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::sensors::SensorSnapshot;

/// Who is allowed to move the valve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveMode {
    Auto,
    Manual,
}

impl ValveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValveMode::Auto => "auto",
            ValveMode::Manual => "manual",
        }
    }
}

impl fmt::Display for ValveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command understood by the valve driver. One byte on the wire, no framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveCommand {
    Open,
    Close,
}

impl ValveCommand {
    pub fn for_state(open: bool) -> Self {
        if open { ValveCommand::Open } else { ValveCommand::Close }
    }

    pub fn byte(self) -> u8 {
        match self {
            ValveCommand::Open => 0x01,
            ValveCommand::Close => 0x00,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValveCommand::Open => "open",
            ValveCommand::Close => "close",
        }
    }
}

/// Origin of a valve transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    System,
    User,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::System => "system",
            Operator::User => "user",
        }
    }
}

/// Valve state owned by [`ControlEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValveState {
    pub is_open: bool,
    pub mode: ValveMode,
    pub last_changed_at: DateTime<Utc>,
}

impl ValveState {
    pub fn new(mode: ValveMode) -> Self {
        Self {
            is_open: false,
            mode,
            last_changed_at: Utc::now(),
        }
    }
}

/// Per-channel limits that trigger an automatic open
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub temp_max: f64,
    pub humidity_max: f64,
    pub light_max: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temp_max: 30.0,
            humidity_max: 80.0,
            light_max: 1000.0,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        for (field, value) in [
            ("temp_max", self.temp_max),
            ("humidity_max", self.humidity_max),
            ("light_max", self.light_max),
        ] {
            if !value.is_finite() {
                return Err(ControlError::InvalidThreshold { field, value });
            }
        }
        Ok(())
    }

    /// True when any reported channel is strictly above its limit.
    ///
    /// Channels that have not reported yet never trip.
    pub fn breached_by(&self, snapshot: &SensorSnapshot) -> bool {
        let above = |value: Option<f64>, max: f64| value.map_or(false, |v| v > max);
        above(snapshot.temperature, self.temp_max)
            || above(snapshot.humidity, self.humidity_max)
            || above(snapshot.light, self.light_max)
    }
}

/// Audit entry for one valve transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveOperationRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: ValveCommand,
    pub mode: ValveMode,
    pub operator: Operator,
}

/// Audit entry for an operator action that is not a valve transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOperationRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub details: String,
}

impl UserOperationRecord {
    pub fn new(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(ValveCommand::Open.byte(), 0x01);
        assert_eq!(ValveCommand::Close.byte(), 0x00);
        assert_eq!(ValveCommand::for_state(true), ValveCommand::Open);
    }

    #[test]
    fn test_threshold_breach_is_strict() {
        let limits = ThresholdConfig::default();
        let at_limit = SensorSnapshot {
            temperature: Some(30.0),
            humidity: Some(80.0),
            light: Some(1000.0),
            ..Default::default()
        };
        assert!(!limits.breached_by(&at_limit));

        let hot = SensorSnapshot { temperature: Some(30.5), ..Default::default() };
        assert!(limits.breached_by(&hot));

        // Motion and gas do not participate
        let smoky = SensorSnapshot { gas: Some(1.0), pir: Some(1.0), ..Default::default() };
        assert!(!limits.breached_by(&smoky));
    }

    #[test]
    fn test_threshold_validation() {
        let bad = ThresholdConfig { light_max: f64::NAN, ..Default::default() };
        assert!(matches!(
            bad.validate(),
            Err(ControlError::InvalidThreshold { field: "light_max", .. })
        ));
        assert!(ThresholdConfig::default().validate().is_ok());
    }
}
