//! Sensor module - channels, readings and the latest-value store

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::streaming::PropertyMap;

/// Sensor quantity reported by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    Humidity,
    Light,
    MotionDetected,
    GasDetected,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Light,
        Channel::MotionDetected,
        Channel::GasDetected,
    ];

    /// Column / property name
    pub fn key(self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::Light => "light",
            Channel::MotionDetected => "pir",
            Channel::GasDetected => "gas",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single decoded value. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub channel: Channel,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(channel: Channel, value: f64) -> Self {
        Self {
            channel,
            value,
            observed_at: Utc::now(),
        }
    }
}

/// Consistent view of every channel taken under one lock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    pub pir: Option<f64>,
    pub gas: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SensorSnapshot {
    pub fn get(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
            Channel::Light => self.light,
            Channel::MotionDetected => self.pir,
            Channel::GasDetected => self.gas,
        }
    }

    /// Telemetry properties for every channel that has reported
    pub fn to_properties(&self) -> PropertyMap {
        Channel::ALL
            .iter()
            .filter_map(|&c| self.get(c).map(|v| (c.key().to_string(), serde_json::json!(v))))
            .collect()
    }
}

/// Latest reading per channel.
///
/// Channels never expire; a stale channel keeps its last value.
#[derive(Debug, Default)]
pub struct SensorState {
    latest: RwLock<HashMap<Channel, SensorReading>>,
}

impl SensorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply all readings decoded from one line atomically
    pub fn apply(&self, readings: &[SensorReading]) {
        let mut latest = self.latest.write();
        for reading in readings {
            latest.insert(reading.channel, *reading);
        }
    }

    pub fn latest(&self, channel: Channel) -> Option<SensorReading> {
        self.latest.read().get(&channel).copied()
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        Self::build_snapshot(&self.latest.read())
    }

    /// Snapshot, giving up if a writer holds the lock past `timeout`
    pub fn try_snapshot(&self, timeout: Duration) -> Option<SensorSnapshot> {
        self.latest.try_read_for(timeout).map(|latest| Self::build_snapshot(&latest))
    }

    fn build_snapshot(latest: &HashMap<Channel, SensorReading>) -> SensorSnapshot {
        let value = |c: Channel| latest.get(&c).map(|r| r.value);
        SensorSnapshot {
            temperature: value(Channel::Temperature),
            humidity: value(Channel::Humidity),
            light: value(Channel::Light),
            pir: value(Channel::MotionDetected),
            gas: value(Channel::GasDetected),
            updated_at: latest.values().map(|r| r.observed_at).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_value_wins() {
        let state = SensorState::new();
        state.apply(&[SensorReading::new(Channel::Light, 100.0)]);
        state.apply(&[SensorReading::new(Channel::Light, 250.0)]);

        assert_eq!(state.latest(Channel::Light).map(|r| r.value), Some(250.0));
        assert_eq!(state.snapshot().light, Some(250.0));
    }

    #[test]
    fn test_stale_channels_keep_value() {
        let state = SensorState::new();
        state.apply(&[
            SensorReading::new(Channel::Temperature, 25.0),
            SensorReading::new(Channel::Humidity, 60.0),
        ]);
        state.apply(&[SensorReading::new(Channel::GasDetected, 1.0)]);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.temperature, Some(25.0));
        assert_eq!(snapshot.humidity, Some(60.0));
        assert_eq!(snapshot.gas, Some(1.0));
        assert_eq!(snapshot.pir, None);
    }

    #[test]
    fn test_properties_skip_unreported_channels() {
        let snapshot = SensorSnapshot {
            temperature: Some(31.0),
            pir: Some(1.0),
            ..Default::default()
        };
        let props = snapshot.to_properties();
        assert_eq!(props.len(), 2);
        assert_eq!(props["temperature"], serde_json::json!(31.0));
        assert_eq!(props["pir"], serde_json::json!(1.0));
    }

    #[test]
    fn test_try_snapshot_times_out_under_writer() {
        let state = SensorState::new();
        let _guard = state.latest.write();
        assert!(state.try_snapshot(Duration::from_millis(5)).is_none());
    }
}
