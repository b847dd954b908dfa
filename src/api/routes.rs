// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! HTTP routes for the status API

use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, warn};

use super::StatusQueryService;
use crate::core::LoopHandle;
use crate::error::QueryError;

type Service = State<Arc<StatusQueryService>>;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// JSON error body with a status matching the failure
pub struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            QueryError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("API request failed: {}", self.0);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(service: Arc<StatusQueryService>) -> Router {
    Router::new()
        .route("/people", get(people))
        .route("/people/history", get(people_history))
        .route("/sensors", get(sensors))
        .route("/sensors/latest", get(sensors_latest))
        .route("/valve/history", get(valve_history))
        .route("/valve/status", get(valve_status))
        .route("/operations", get(operations))
        .with_state(service)
}

/// Bind `addr` and serve until the returned handle is stopped.
///
/// Also returns the bound address, which differs from `addr` when port 0 is used.
pub async fn serve(addr: SocketAddr, service: Arc<StatusQueryService>) -> Result<(LoopHandle, SocketAddr)> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status API on {}", addr))?;
    let local = listener.local_addr()?;

    let mut handle = LoopHandle::new("status-api");
    let mut stop = handle.stop_signal();
    let app = router(service);

    handle.push(tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop.recv().await;
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            warn!("Status API server error: {}", e);
        }
    }));

    info!("Status API listening on http://{}", local);
    Ok((handle, local))
}

async fn people(State(svc): Service) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(svc.people_stats().await?))
}

async fn people_history(State(svc): Service, Query(q): Query<HistoryParams>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(svc.recent_people(svc.limit(q.limit)).await?))
}

async fn sensors(State(svc): Service, Query(q): Query<HistoryParams>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(svc.recent_readings(svc.limit(q.limit)).await?))
}

async fn sensors_latest(State(svc): Service) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(svc.latest_snapshot()?))
}

async fn valve_history(State(svc): Service, Query(q): Query<HistoryParams>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(svc.recent_valve_ops(svc.limit(q.limit)).await?))
}

async fn valve_status(State(svc): Service) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(svc.current_valve_status()?))
}

async fn operations(State(svc): Service, Query(q): Query<HistoryParams>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(svc.recent_user_ops(svc.limit(q.limit)).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::control::{Operator, ValveCommand, ValveMode, ValveOperationRecord};
    use crate::db::PersistenceLog;
    use crate::sensors::SensorSnapshot;

    async fn start() -> (LoopHandle, String, PersistenceLog) {
        let log = PersistenceLog::open_in_memory(32).unwrap();
        let svc = Arc::new(super::super::tests::service(log.clone()));
        let (handle, addr) = serve(SocketAddr::from(([127, 0, 0, 1], 0)), svc).await.unwrap();
        (handle, format!("http://{}", addr), log)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sensors_newest_first_with_limit() {
        let (handle, base, log) = start().await;
        for i in 0..15 {
            log.record_reading(SensorSnapshot {
                temperature: Some(i as f64),
                updated_at: Some(Utc::now()),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let rows: Vec<serde_json::Value> = reqwest::get(format!("{}/sensors", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0]["temperature"], serde_json::json!(14.0));
        assert!(rows[0]["humidity"].is_null());

        let rows: Vec<serde_json::Value> = reqwest::get(format!("{}/sensors?limit=3", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);

        handle.stop().await;
        log.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_valve_endpoints() {
        let (handle, base, log) = start().await;
        log.record_valve_op(ValveOperationRecord {
            timestamp: Utc::now(),
            operation: ValveCommand::Open,
            mode: ValveMode::Auto,
            operator: Operator::System,
        })
        .await
        .unwrap();

        let status: serde_json::Value = reqwest::get(format!("{}/valve/status", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status, serde_json::json!({ "status": false, "mode": "auto" }));

        let history: serde_json::Value = reqwest::get(format!("{}/valve/history", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history[0]["operation"], "open");
        assert_eq!(history[0]["operator"], "system");

        handle.stop().await;
        log.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_people_and_store_failure() {
        let (handle, base, log) = start().await;

        let people: serde_json::Value = reqwest::get(format!("{}/people", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(people["current"], 0);
        assert_eq!(people["today_max"], 0);

        log.close().await;
        let response = reqwest::get(format!("{}/operations", base)).await.unwrap();
        assert_eq!(response.status().as_u16(), 500);

        handle.stop().await;
    }
}
