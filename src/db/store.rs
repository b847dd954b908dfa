// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! SQLite store. Owned by exactly one writer thread.

use std::path::Path;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::control::{UserOperationRecord, ValveOperationRecord};
use crate::detection::DetectionCount;
use crate::error::PersistenceError;
use crate::sensors::SensorSnapshot;

/// Timestamps are fixed-width so text order is time order
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Row from `sensor_data`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRow {
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    pub pir: Option<f64>,
    pub gas: Option<f64>,
}

/// Row from `valve_operations`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValveOpRow {
    pub timestamp: String,
    pub operation: String,
    pub mode: String,
    pub operator: String,
}

/// Row from `user_operations`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserOpRow {
    pub timestamp: String,
    pub operation: String,
    pub details: String,
}

/// Row from `people_flow`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeopleRow {
    pub timestamp: String,
    pub count: i64,
}

/// People-flow summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeopleStats {
    pub current: i64,
    pub today_max: i64,
    pub today_avg: f64,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub sensor_rows: usize,
    pub valve_rows: usize,
    pub user_rows: usize,
    pub people_rows: usize,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        let store = Self { conn };
        store.create_tables()?;

        info!("Database opened at {:?}", path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            r#"
            -- Full channel snapshot after each decoded line
            CREATE TABLE IF NOT EXISTS sensor_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                temperature REAL,
                humidity REAL,
                light REAL,
                pir REAL,
                gas REAL
            );

            CREATE INDEX IF NOT EXISTS idx_sensor_data_timestamp ON sensor_data(timestamp);

            CREATE TABLE IF NOT EXISTS valve_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                operation TEXT NOT NULL,
                mode TEXT NOT NULL,
                operator TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_valve_operations_timestamp ON valve_operations(timestamp);

            CREATE TABLE IF NOT EXISTS user_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                operation TEXT NOT NULL,
                details TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_user_operations_timestamp ON user_operations(timestamp);

            -- One row per processed frame
            CREATE TABLE IF NOT EXISTS people_flow (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                count INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_people_flow_timestamp ON people_flow(timestamp);
            "#,
        )?;
        Ok(())
    }

    pub fn insert_reading(&self, snapshot: &SensorSnapshot) -> Result<(), PersistenceError> {
        let timestamp = snapshot.updated_at.unwrap_or_else(Utc::now);
        self.conn.execute(
            "INSERT INTO sensor_data (timestamp, temperature, humidity, light, pir, gas) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format_ts(&timestamp),
                snapshot.temperature,
                snapshot.humidity,
                snapshot.light,
                snapshot.pir,
                snapshot.gas,
            ],
        )?;
        Ok(())
    }

    pub fn insert_valve_op(&self, record: &ValveOperationRecord) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO valve_operations (timestamp, operation, mode, operator) VALUES (?1, ?2, ?3, ?4)",
            params![
                format_ts(&record.timestamp),
                record.operation.as_str(),
                record.mode.as_str(),
                record.operator.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_user_op(&self, record: &UserOperationRecord) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO user_operations (timestamp, operation, details) VALUES (?1, ?2, ?3)",
            params![format_ts(&record.timestamp), record.operation, record.details],
        )?;
        Ok(())
    }

    pub fn insert_people(&self, count: &DetectionCount) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO people_flow (timestamp, count) VALUES (?1, ?2)",
            params![format_ts(&count.observed_at), count.count as i64],
        )?;
        Ok(())
    }

    pub fn recent_readings(&self, limit: usize) -> Result<Vec<SensorRow>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, temperature, humidity, light, pir, gas FROM sensor_data
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SensorRow {
                timestamp: row.get(0)?,
                temperature: row.get(1)?,
                humidity: row.get(2)?,
                light: row.get(3)?,
                pir: row.get(4)?,
                gas: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn recent_valve_ops(&self, limit: usize) -> Result<Vec<ValveOpRow>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, operation, mode, operator FROM valve_operations
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ValveOpRow {
                timestamp: row.get(0)?,
                operation: row.get(1)?,
                mode: row.get(2)?,
                operator: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn recent_user_ops(&self, limit: usize) -> Result<Vec<UserOpRow>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, operation, details FROM user_operations
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(UserOpRow {
                timestamp: row.get(0)?,
                operation: row.get(1)?,
                details: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn recent_people(&self, limit: usize) -> Result<Vec<PeopleRow>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, count FROM people_flow ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(PeopleRow {
                timestamp: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Latest count plus max/avg of counts observed since `since`
    pub fn people_stats(&self, since: DateTime<Utc>) -> Result<PeopleStats, PersistenceError> {
        let current: Option<i64> = self
            .conn
            .query_row(
                "SELECT count FROM people_flow ORDER BY timestamp DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let (today_max, today_avg): (Option<i64>, Option<f64>) = self.conn.query_row(
            "SELECT MAX(count), AVG(count) FROM people_flow WHERE timestamp >= ?1",
            params![format_ts(&since)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(PeopleStats {
            current: current.unwrap_or(0),
            today_max: today_max.unwrap_or(0),
            today_avg: today_avg.unwrap_or(0.0),
        })
    }

    pub fn stats(&self) -> Result<StoreStats, PersistenceError> {
        let count = |table: &str| -> Result<usize, PersistenceError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            sensor_rows: count("sensor_data")?,
            valve_rows: count("valve_operations")?,
            user_rows: count("user_operations")?,
            people_rows: count("people_flow")?,
        })
    }
}
