//! Status API - read-only views over live state and the store

mod routes;

pub use routes::{router, serve};

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::config::ApiConfig;
use crate::control::{ControlEngine, ValveMode};
use crate::db::{self, PeopleRow, PeopleStats, PersistenceLog, SensorRow, UserOpRow, ValveOpRow};
use crate::error::QueryError;
use crate::sensors::{SensorSnapshot, SensorState};

/// Shape of `GET /valve/status`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValveStatus {
    pub status: bool,
    pub mode: ValveMode,
}

/// Read side of the session.
///
/// Nothing here waits on a writer longer than `read_timeout`.
pub struct StatusQueryService {
    log: PersistenceLog,
    state: Arc<SensorState>,
    engine: Arc<ControlEngine>,
    read_timeout: Duration,
    history_limit: usize,
    max_limit: usize,
}

impl StatusQueryService {
    pub fn new(
        log: PersistenceLog,
        state: Arc<SensorState>,
        engine: Arc<ControlEngine>,
        read_timeout: Duration,
        config: &ApiConfig,
    ) -> Self {
        Self {
            log,
            state,
            engine,
            read_timeout,
            history_limit: config.history_limit.max(1),
            max_limit: config.max_limit.max(1),
        }
    }

    /// Requested row count, defaulted and capped
    pub fn limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.history_limit).clamp(1, self.max_limit)
    }

    pub async fn people_stats(&self) -> Result<PeopleStats, QueryError> {
        Ok(db::within(self.read_timeout, self.log.people_stats(local_midnight())).await?)
    }

    pub async fn current_people(&self) -> Result<i64, QueryError> {
        Ok(self.people_stats().await?.current)
    }

    pub async fn today_max_people(&self) -> Result<i64, QueryError> {
        Ok(self.people_stats().await?.today_max)
    }

    pub async fn today_avg_people(&self) -> Result<f64, QueryError> {
        Ok(self.people_stats().await?.today_avg)
    }

    pub async fn recent_readings(&self, n: usize) -> Result<Vec<SensorRow>, QueryError> {
        Ok(db::within(self.read_timeout, self.log.recent_readings(n)).await?)
    }

    pub async fn recent_valve_ops(&self, n: usize) -> Result<Vec<ValveOpRow>, QueryError> {
        Ok(db::within(self.read_timeout, self.log.recent_valve_ops(n)).await?)
    }

    pub async fn recent_user_ops(&self, n: usize) -> Result<Vec<UserOpRow>, QueryError> {
        Ok(db::within(self.read_timeout, self.log.recent_user_ops(n)).await?)
    }

    pub async fn recent_people(&self, n: usize) -> Result<Vec<PeopleRow>, QueryError> {
        Ok(db::within(self.read_timeout, self.log.recent_people(n)).await?)
    }

    pub fn current_valve_status(&self) -> Result<ValveStatus, QueryError> {
        let valve = self.engine.try_valve_state(self.read_timeout).ok_or(QueryError::Busy)?;
        Ok(ValveStatus {
            status: valve.is_open,
            mode: valve.mode,
        })
    }

    /// Live values of every channel, taken under one lock
    pub fn latest_snapshot(&self) -> Result<SensorSnapshot, QueryError> {
        self.state.try_snapshot(self.read_timeout).ok_or(QueryError::Busy)
    }
}

/// Start of the current local day
fn local_midnight() -> DateTime<Utc> {
    Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| Utc::now() - chrono::Duration::hours(24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ThresholdConfig, ValveActuator};
    use crate::core::EventBus;
    use crate::detection::DetectionCount;

    pub(crate) fn service(log: PersistenceLog) -> StatusQueryService {
        let engine = Arc::new(ControlEngine::new(
            ValveMode::Auto,
            ThresholdConfig::default(),
            Arc::new(ValveActuator::new()),
            log.clone(),
            Arc::new(EventBus::default()),
        ));
        StatusQueryService::new(
            log,
            Arc::new(SensorState::new()),
            engine,
            Duration::from_millis(200),
            &ApiConfig::default(),
        )
    }

    #[test]
    fn test_limit_defaults_and_caps() {
        let svc = service(PersistenceLog::open_in_memory(4).unwrap());
        assert_eq!(svc.limit(None), 10);
        assert_eq!(svc.limit(Some(3)), 3);
        assert_eq!(svc.limit(Some(0)), 1);
        assert_eq!(svc.limit(Some(5000)), 100);
    }

    #[tokio::test]
    async fn test_people_figures() {
        let log = PersistenceLog::open_in_memory(8).unwrap();
        for count in [2, 6, 4] {
            log.record_people(DetectionCount { count, observed_at: Utc::now() }).await.unwrap();
        }

        let svc = service(log.clone());
        assert_eq!(svc.current_people().await.unwrap(), 4);
        assert_eq!(svc.today_max_people().await.unwrap(), 6);
        assert!((svc.today_avg_people().await.unwrap() - 4.0).abs() < 1e-9);
        log.close().await;
    }

    #[tokio::test]
    async fn test_empty_store_reads_zero() {
        let log = PersistenceLog::open_in_memory(4).unwrap();
        let svc = service(log.clone());

        let stats = svc.people_stats().await.unwrap();
        assert_eq!((stats.current, stats.today_max), (0, 0));
        assert!(svc.recent_readings(10).await.unwrap().is_empty());
        assert_eq!(
            svc.current_valve_status().unwrap(),
            ValveStatus { status: false, mode: ValveMode::Auto }
        );
        log.close().await;
    }

    #[tokio::test]
    async fn test_closed_store_surfaces_error() {
        let log = PersistenceLog::open_in_memory(4).unwrap();
        let svc = service(log.clone());
        log.close().await;

        assert!(matches!(
            svc.recent_valve_ops(5).await,
            Err(QueryError::Persistence(crate::error::PersistenceError::Closed))
        ));
    }
}
