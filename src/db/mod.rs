// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Database module for persistent storage.
//!
//! SQLite is not written from more than one place: a single writer thread
//! owns the [`Store`] and drains a bounded queue of jobs in arrival order.
//! [`PersistenceLog`] is the cloneable handle every loop writes through.

mod store;

pub use store::{
    format_ts, PeopleRow, PeopleStats, SensorRow, Store, StoreStats, UserOpRow, ValveOpRow,
};

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::control::{UserOperationRecord, ValveOperationRecord};
use crate::detection::DetectionCount;
use crate::error::PersistenceError;
use crate::sensors::SensorSnapshot;

type Job = Box<dyn FnOnce(&mut Store) + Send>;

enum Command {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the single-writer store
#[derive(Clone)]
pub struct PersistenceLog {
    tx: mpsc::Sender<Command>,
    writer: Arc<Mutex<Option<std::thread::JoinHandle<()>>>>,
}

impl PersistenceLog {
    /// Open the configured database and start the writer thread
    pub fn open(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let store = Store::open(&config.path)?;
        Self::start(store, config.queue_depth)
    }

    pub fn open_in_memory(queue_depth: usize) -> Result<Self, PersistenceError> {
        Self::start(Store::open_in_memory()?, queue_depth)
    }

    fn start(store: Store, queue_depth: usize) -> Result<Self, PersistenceError> {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let writer = std::thread::Builder::new()
            .name("fireguard-db".to_string())
            .spawn(move || run_writer(store, rx))?;

        Ok(Self {
            tx,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    async fn call<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Store) -> Result<T, PersistenceError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |store: &mut Store| {
            let _ = reply_tx.send(f(store));
        });

        self.tx
            .send(Command::Run(job))
            .await
            .map_err(|_| PersistenceError::Closed)?;
        reply_rx.await.map_err(|_| PersistenceError::Closed)?
    }

    /// Store the full channel snapshot. Durable once this returns `Ok`.
    pub async fn record_reading(&self, snapshot: SensorSnapshot) -> Result<(), PersistenceError> {
        self.call(move |store| store.insert_reading(&snapshot)).await
    }

    pub async fn record_valve_op(&self, record: ValveOperationRecord) -> Result<(), PersistenceError> {
        self.call(move |store| store.insert_valve_op(&record)).await
    }

    pub async fn record_user_op(&self, record: UserOperationRecord) -> Result<(), PersistenceError> {
        self.call(move |store| store.insert_user_op(&record)).await
    }

    pub async fn record_people(&self, count: DetectionCount) -> Result<(), PersistenceError> {
        self.call(move |store| store.insert_people(&count)).await
    }

    pub async fn recent_readings(&self, limit: usize) -> Result<Vec<SensorRow>, PersistenceError> {
        self.call(move |store| store.recent_readings(limit)).await
    }

    pub async fn recent_valve_ops(&self, limit: usize) -> Result<Vec<ValveOpRow>, PersistenceError> {
        self.call(move |store| store.recent_valve_ops(limit)).await
    }

    pub async fn recent_user_ops(&self, limit: usize) -> Result<Vec<UserOpRow>, PersistenceError> {
        self.call(move |store| store.recent_user_ops(limit)).await
    }

    pub async fn recent_people(&self, limit: usize) -> Result<Vec<PeopleRow>, PersistenceError> {
        self.call(move |store| store.recent_people(limit)).await
    }

    pub async fn people_stats(&self, since: DateTime<Utc>) -> Result<PeopleStats, PersistenceError> {
        self.call(move |store| store.people_stats(since)).await
    }

    pub async fn stats(&self) -> Result<StoreStats, PersistenceError> {
        self.call(|store| store.stats()).await
    }

    /// Occupy the writer thread for `pause`
    #[cfg(test)]
    pub(crate) async fn stall_writer(&self, pause: Duration) {
        let job: Job = Box::new(move |_: &mut Store| std::thread::sleep(pause));
        let _ = self.tx.send(Command::Run(job)).await;
    }

    /// Drain queued jobs, close the store and stop the writer.
    ///
    /// Later calls on any clone fail with [`PersistenceError::Closed`].
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }

        let writer = self.writer.lock().take();
        if let Some(handle) = writer {
            if !matches!(tokio::task::spawn_blocking(move || handle.join()).await, Ok(Ok(()))) {
                error!("Database writer thread panicked");
            }
        }
    }
}

/// Bound the wait on a persistence future
pub async fn within<T, F>(limit: Duration, fut: F) -> Result<T, PersistenceError>
where
    F: std::future::Future<Output = Result<T, PersistenceError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(PersistenceError::Timeout(limit.as_millis() as u64)))
}

fn run_writer(mut store: Store, mut rx: mpsc::Receiver<Command>) {
    debug!("Database writer started");

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Run(job) => job(&mut store),
            Command::Shutdown(ack) => {
                rx.close();
                let mut drained = 0;
                while let Ok(command) = rx.try_recv() {
                    match command {
                        Command::Run(job) => {
                            job(&mut store);
                            drained += 1;
                        }
                        Command::Shutdown(other) => {
                            let _ = other.send(());
                        }
                    }
                }
                drop(store);
                info!("Database closed ({} pending job(s) drained)", drained);
                let _ = ack.send(());
                return;
            }
        }
    }

    debug!("Database writer stopped, all handles dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Operator, ValveCommand, ValveMode};

    fn full_snapshot(i: usize) -> SensorSnapshot {
        SensorSnapshot {
            temperature: Some(20.0 + i as f64),
            humidity: Some(40.0),
            light: Some(300.0),
            pir: Some(0.0),
            gas: Some(0.0),
            updated_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_concurrent_writers_produce_complete_rows() {
        let log = PersistenceLog::open_in_memory(4).unwrap();

        let mut tasks = Vec::new();
        for writer in 0..2 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    log.record_reading(full_snapshot(writer * 100 + i)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let rows = log.recent_readings(1000).await.unwrap();
        assert_eq!(rows.len(), 50);
        assert!(rows.iter().all(|r| {
            r.temperature.is_some() && r.humidity.is_some() && r.light.is_some()
                && r.pir.is_some() && r.gas.is_some()
        }));
        log.close().await;
    }

    #[tokio::test]
    async fn test_recent_ten_of_fifteen() {
        let log = PersistenceLog::open_in_memory(16).unwrap();
        for i in 0..15 {
            log.record_reading(full_snapshot(i)).await.unwrap();
        }

        let rows = log.recent_readings(10).await.unwrap();
        let temps: Vec<f64> = rows.iter().filter_map(|r| r.temperature).collect();
        let expected: Vec<f64> = (5..15).rev().map(|i| 20.0 + i as f64).collect();
        assert_eq!(temps, expected);
        log.close().await;
    }

    #[tokio::test]
    async fn test_close_drains_then_rejects() {
        let log = PersistenceLog::open_in_memory(64).unwrap();
        let writer = log.clone();

        let pending: Vec<_> = (0..10)
            .map(|_| {
                let writer = writer.clone();
                tokio::spawn(async move {
                    writer
                        .record_valve_op(ValveOperationRecord {
                            timestamp: Utc::now(),
                            operation: ValveCommand::Open,
                            mode: ValveMode::Manual,
                            operator: Operator::User,
                        })
                        .await
                })
            })
            .collect();
        for task in pending {
            assert!(task.await.unwrap().is_ok());
        }

        log.close().await;

        let late = writer.record_user_op(UserOperationRecord::new("late", "")).await;
        assert!(matches!(late, Err(PersistenceError::Closed)));
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let result: Result<(), _> = within(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(PersistenceError::Timeout(5))));
    }
}
