// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Valve control engine - mode, thresholds and the valve state machine

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{
    Operator, ThresholdConfig, ValveActuator, ValveCommand, ValveMode, ValveOperationRecord,
    ValveState,
};
use crate::core::EventBus;
use crate::db::{self, PersistenceLog};
use crate::error::ControlError;
use crate::sensors::SensorSnapshot;

/// Result of an accepted manual command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualOutcome {
    /// Command byte written and state changed
    Applied,
    /// Valve was already in the requested state, nothing sent
    Unchanged,
}

const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_millis(1000);

/// Owns the valve state.
///
/// Every transition happens under the state lock together with its command
/// write, so two callers can never both act on the same stale state.
pub struct ControlEngine {
    valve: Mutex<ValveState>,
    thresholds: RwLock<ThresholdConfig>,
    actuator: Arc<ValveActuator>,
    log: PersistenceLog,
    persist_timeout: Duration,
    events: Arc<EventBus>,
}

impl ControlEngine {
    pub fn new(
        mode: ValveMode,
        thresholds: ThresholdConfig,
        actuator: Arc<ValveActuator>,
        log: PersistenceLog,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            valve: Mutex::new(ValveState::new(mode)),
            thresholds: RwLock::new(thresholds),
            actuator,
            log,
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
            events,
        }
    }

    /// Bound on each audit write. The valve state never waits on it.
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    /// Automatic path, run once per applied sensor line.
    ///
    /// Only ever opens. A closed valve stays closed until an operator acts.
    pub async fn evaluate(&self, snapshot: &SensorSnapshot) {
        let limits = *self.thresholds.read();

        let record = {
            let mut valve = self.valve.lock();
            if valve.mode != ValveMode::Auto || valve.is_open || !limits.breached_by(snapshot) {
                return;
            }

            match self.actuator.send(ValveCommand::Open) {
                Ok(ack) => {
                    valve.is_open = true;
                    valve.last_changed_at = ack.written_at;
                    ValveOperationRecord {
                        timestamp: ack.written_at,
                        operation: ValveCommand::Open,
                        mode: ValveMode::Auto,
                        operator: Operator::System,
                    }
                }
                Err(e) => {
                    // Not latched: the next reading tries again
                    self.events.error(format!("Automatic valve open failed: {}", e));
                    return;
                }
            }
        };

        self.events.warning(format!(
            "Threshold exceeded (temperature {:?}, humidity {:?}, light {:?}), valve opened",
            snapshot.temperature, snapshot.humidity, snapshot.light
        ));
        if let Err(e) = db::within(self.persist_timeout, self.log.record_valve_op(record)).await {
            warn!("Automatic valve open not acknowledged by the store: {}", e);
        }
    }

    /// Operator open/close request
    pub async fn set_manual(&self, open: bool) -> Result<ManualOutcome, ControlError> {
        let record = {
            let mut valve = self.valve.lock();
            if valve.mode == ValveMode::Auto {
                return Err(ControlError::AutoModeLocked);
            }
            if !self.actuator.link_open() {
                return Err(ControlError::LinkClosed);
            }
            if valve.is_open == open {
                debug!("Valve already {}", if open { "open" } else { "closed" });
                return Ok(ManualOutcome::Unchanged);
            }

            let command = ValveCommand::for_state(open);
            let ack = self.actuator.send(command)?;
            valve.is_open = open;
            valve.last_changed_at = ack.written_at;

            ValveOperationRecord {
                timestamp: ack.written_at,
                operation: command,
                mode: ValveMode::Manual,
                operator: Operator::User,
            }
        };

        info!("Valve {} by operator", if open { "opened" } else { "closed" });
        if let Err(e) = db::within(self.persist_timeout, self.log.record_valve_op(record)).await {
            warn!(
                "Manual valve {} not acknowledged by the store: {}",
                if open { "open" } else { "close" },
                e
            );
        }
        Ok(ManualOutcome::Applied)
    }

    /// Switch control mode. Never moves the valve.
    pub fn set_mode(&self, mode: ValveMode) -> ValveMode {
        let mut valve = self.valve.lock();
        let previous = valve.mode;
        if previous != mode {
            valve.mode = mode;
            info!("Valve control mode: {} -> {}", previous, mode);
        }
        previous
    }

    pub fn set_thresholds(&self, thresholds: ThresholdConfig) -> Result<(), ControlError> {
        thresholds.validate()?;
        *self.thresholds.write() = thresholds;
        info!(
            "Thresholds set: temperature {} / humidity {} / light {}",
            thresholds.temp_max, thresholds.humidity_max, thresholds.light_max
        );
        Ok(())
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        *self.thresholds.read()
    }

    pub fn valve_state(&self) -> ValveState {
        *self.valve.lock()
    }

    /// Valve state, or `None` if the lock is held past `timeout`
    pub fn try_valve_state(&self, timeout: Duration) -> Option<ValveState> {
        self.valve.try_lock_for(timeout).map(|valve| *valve)
    }

    pub fn link_open(&self) -> bool {
        self.actuator.link_open()
    }

    /// Time since the valve last changed state
    pub fn since_last_change(&self) -> chrono::Duration {
        Utc::now() - self.valve.lock().last_changed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLink;

    struct Rig {
        engine: Arc<ControlEngine>,
        link: Arc<MockLink>,
        log: PersistenceLog,
    }

    fn rig(mode: ValveMode) -> Rig {
        let link = Arc::new(MockLink::new());
        let actuator = Arc::new(ValveActuator::new());
        actuator.attach(link.clone());
        let log = PersistenceLog::open_in_memory(32).unwrap();
        let engine = Arc::new(ControlEngine::new(
            mode,
            ThresholdConfig::default(),
            actuator,
            log.clone(),
            Arc::new(EventBus::default()),
        ));
        Rig { engine, link, log }
    }

    fn hot() -> SensorSnapshot {
        SensorSnapshot {
            temperature: Some(35.0),
            humidity: Some(50.0),
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_auto_opens_once_on_breach() {
        let rig = rig(ValveMode::Auto);

        rig.engine.evaluate(&hot()).await;
        rig.engine.evaluate(&hot()).await;

        assert!(rig.engine.valve_state().is_open);
        assert_eq!(rig.link.written(), vec![0x01]);

        let ops = rig.log.recent_valve_ops(10).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation, "open");
        assert_eq!(ops[0].mode, "auto");
        assert_eq!(ops[0].operator, "system");
    }

    #[tokio::test]
    async fn test_auto_never_closes() {
        let rig = rig(ValveMode::Auto);
        rig.engine.evaluate(&hot()).await;

        let cool = SensorSnapshot { temperature: Some(20.0), ..Default::default() };
        rig.engine.evaluate(&cool).await;

        assert!(rig.engine.valve_state().is_open);
        assert_eq!(rig.link.written(), vec![0x01]);
    }

    #[tokio::test]
    async fn test_auto_ignores_readings_in_manual_mode() {
        let rig = rig(ValveMode::Manual);
        rig.engine.evaluate(&hot()).await;

        assert!(!rig.engine.valve_state().is_open);
        assert!(rig.link.written().is_empty());
    }

    #[tokio::test]
    async fn test_failed_auto_open_is_not_latched() {
        let rig = rig(ValveMode::Auto);
        rig.link.fail_writes(true);
        rig.engine.evaluate(&hot()).await;

        assert!(!rig.engine.valve_state().is_open);
        assert!(rig.log.recent_valve_ops(10).await.unwrap().is_empty());

        rig.link.fail_writes(false);
        rig.engine.evaluate(&hot()).await;
        assert!(rig.engine.valve_state().is_open);
        assert_eq!(rig.log.recent_valve_ops(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_manual_rejected_in_auto_mode() {
        let rig = rig(ValveMode::Auto);
        let result = rig.engine.set_manual(true).await;

        assert!(matches!(result, Err(ControlError::AutoModeLocked)));
        assert!(rig.link.written().is_empty());

        rig.engine.evaluate(&hot()).await;
        let result = rig.engine.set_manual(false).await;

        assert!(matches!(result, Err(ControlError::AutoModeLocked)));
        assert!(rig.engine.valve_state().is_open);
        assert_eq!(rig.link.written(), vec![0x01]);
    }

    #[tokio::test]
    async fn test_stalled_store_does_not_hold_auto_open() {
        let link = Arc::new(MockLink::new());
        let actuator = Arc::new(ValveActuator::new());
        actuator.attach(link.clone());
        let log = PersistenceLog::open_in_memory(1).unwrap();
        let engine = ControlEngine::new(
            ValveMode::Auto,
            ThresholdConfig::default(),
            actuator,
            log.clone(),
            Arc::new(EventBus::default()),
        )
        .with_persist_timeout(Duration::from_millis(100));

        log.stall_writer(Duration::from_secs(2)).await;

        let breach = SensorSnapshot { temperature: Some(31.0), ..Default::default() };
        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(1), engine.evaluate(&breach))
            .await
            .expect("evaluate waited on the store");

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(engine.valve_state().is_open);
        assert_eq!(link.written(), vec![0x01]);

        // The open is still written once the writer catches up
        log.close().await;
    }

    #[tokio::test]
    async fn test_manual_close_after_auto_open() {
        let rig = rig(ValveMode::Auto);
        rig.engine.evaluate(&hot()).await;
        rig.engine.set_mode(ValveMode::Manual);

        let outcome = rig.engine.set_manual(false).await.unwrap();
        assert_eq!(outcome, ManualOutcome::Applied);
        assert_eq!(rig.link.written(), vec![0x01, 0x00]);

        let ops = rig.log.recent_valve_ops(10).await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operation, "close");
        assert_eq!(ops[0].operator, "user");
        assert_eq!(ops[0].mode, "manual");
    }

    #[tokio::test]
    async fn test_manual_same_state_is_idempotent() {
        let rig = rig(ValveMode::Manual);

        assert_eq!(rig.engine.set_manual(false).await.unwrap(), ManualOutcome::Unchanged);
        assert!(rig.link.written().is_empty());
        assert!(rig.log.recent_valve_ops(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_with_closed_link() {
        let rig = rig(ValveMode::Manual);
        rig.link.set_open(false);

        let result = rig.engine.set_manual(true).await;
        assert!(matches!(result, Err(ControlError::LinkClosed)));
        assert!(!rig.engine.valve_state().is_open);
        assert!(rig.log.recent_valve_ops(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_write_fault_leaves_state() {
        let rig = rig(ValveMode::Manual);
        rig.link.fail_writes(true);

        let result = rig.engine.set_manual(true).await;
        assert!(matches!(result, Err(ControlError::Io(_))));
        assert!(!rig.engine.valve_state().is_open);
    }

    #[tokio::test]
    async fn test_mode_switch_does_not_move_valve() {
        let rig = rig(ValveMode::Manual);
        rig.engine.set_manual(true).await.unwrap();

        assert_eq!(rig.engine.set_mode(ValveMode::Auto), ValveMode::Manual);
        assert!(rig.engine.valve_state().is_open);
        assert_eq!(rig.link.written(), vec![0x01]);
    }

    #[tokio::test]
    async fn test_concurrent_auto_and_manual() {
        let rig = rig(ValveMode::Auto);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = rig.engine.clone();
            tasks.push(tokio::spawn(async move { engine.evaluate(&hot()).await }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Eight breaching readings race, one open reaches the wire
        assert_eq!(rig.link.written(), vec![0x01]);
        assert_eq!(rig.log.recent_valve_ops(10).await.unwrap().len(), 1);
    }

    #[test]
    fn test_threshold_edit_validated() {
        let rig = rig(ValveMode::Auto);
        let bad = ThresholdConfig { temp_max: f64::INFINITY, ..Default::default() };

        assert!(rig.engine.set_thresholds(bad).is_err());
        assert_eq!(rig.engine.thresholds(), ThresholdConfig::default());

        let tight = ThresholdConfig { temp_max: 25.0, ..Default::default() };
        rig.engine.set_thresholds(tight).unwrap();
        assert_eq!(rig.engine.thresholds().temp_max, 25.0);
    }
}
