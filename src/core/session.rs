// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Session - owns every loop and the shared state they work on

use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{EventBus, LoopHandle, SensorPipeline};
use crate::api::{self, StatusQueryService};
use crate::config::{Config, LinkConfig};
use crate::control::{
    ControlEngine, ManualOutcome, ThresholdConfig, UserOperationRecord, ValveActuator, ValveMode,
    ValveState,
};
use crate::db::{self, PersistenceLog, StoreStats};
use crate::detection::{self, DetectionPipeline, Detector, DisplayState, FrameSource};
use crate::error::{ControlError, PublishError};
use crate::link::{self, LinePort};
use crate::sensors::{SensorSnapshot, SensorState};
use crate::streaming::{self, TelemetryPublisher};

/// Point-in-time summary for the control surface
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub link: Option<String>,
    pub detection_running: bool,
    pub valve: ValveState,
    pub thresholds: ThresholdConfig,
    pub sensors: SensorSnapshot,
    /// Row counts, `None` if the store did not answer in time
    pub store: Option<StoreStats>,
}

struct ActiveLink {
    port: Arc<dyn LinePort>,
    acquisition: LoopHandle,
}

/// A running controller.
///
/// Loops are started and stopped through the session. Shutdown stops every
/// loop before the store is closed, so nothing writes to a closed store.
pub struct Session {
    demo: bool,
    link_config: RwLock<LinkConfig>,
    detection_config: crate::config::DetectionConfig,
    publish_timeout: Duration,
    persist_timeout: Duration,

    state: Arc<SensorState>,
    actuator: Arc<ValveActuator>,
    engine: Arc<ControlEngine>,
    log: PersistenceLog,
    publisher: Arc<dyn TelemetryPublisher>,
    events: Arc<EventBus>,
    display: Arc<DisplayState>,
    query: Arc<StatusQueryService>,
    pipeline: Arc<SensorPipeline>,

    link: Mutex<Option<ActiveLink>>,
    detection: Mutex<Option<LoopHandle>>,
    api: Mutex<Option<LoopHandle>>,
}

impl Session {
    /// Open the store and telemetry backend, then start the configured loops.
    ///
    /// Failing to open the store or bind the API is fatal. A link or camera
    /// that cannot be opened is reported and left closed.
    pub async fn start(config: Config) -> Result<Arc<Self>> {
        let log = PersistenceLog::open(&config.database)
            .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
        let publisher = streaming::connect(&config.telemetry)
            .await
            .context("Failed to set up telemetry")?;

        let session = Arc::new(Self::assemble(&config, log, publisher));

        if config.api.enabled {
            let (handle, _) = api::serve(config.api.bind, session.query.clone()).await?;
            *session.api.lock().await = Some(handle);
        }

        if config.demo_mode || config.link.port.is_some() {
            if let Err(e) = session.open_link(None).await {
                session.events.error(format!("Link not opened: {:#}", e));
            }
        }

        if config.detection.enabled {
            if let Err(e) = session.start_detection().await {
                session.events.error(format!("Detection not started: {:#}", e));
            }
        }

        info!("Session started");
        Ok(session)
    }

    /// Wire the shared state together without starting any loop
    pub fn assemble(config: &Config, log: PersistenceLog, publisher: Arc<dyn TelemetryPublisher>) -> Self {
        let events = Arc::new(EventBus::default());
        let state = Arc::new(SensorState::new());
        let actuator = Arc::new(ValveActuator::new());
        let publish_timeout = Duration::from_millis(config.control.publish_timeout_ms);
        let persist_timeout = Duration::from_millis(config.control.persist_timeout_ms);

        let engine = Arc::new(
            ControlEngine::new(
                config.control.initial_mode,
                config.control.thresholds,
                actuator.clone(),
                log.clone(),
                events.clone(),
            )
            .with_persist_timeout(persist_timeout),
        );

        let query = Arc::new(StatusQueryService::new(
            log.clone(),
            state.clone(),
            engine.clone(),
            config.database.read_timeout(),
            &config.api,
        ));

        let pipeline = Arc::new(SensorPipeline {
            state: state.clone(),
            engine: engine.clone(),
            log: log.clone(),
            publisher: publisher.clone(),
            events: events.clone(),
            publish_timeout,
            persist_timeout,
            max_line: config.link.max_line_len,
        });

        Self {
            demo: config.demo_mode,
            link_config: RwLock::new(config.link.clone()),
            detection_config: config.detection.clone(),
            publish_timeout,
            persist_timeout,
            state,
            actuator,
            engine,
            log,
            publisher,
            events,
            display: DisplayState::new(),
            query,
            pipeline,
            link: Mutex::new(None),
            detection: Mutex::new(None),
            api: Mutex::new(None),
        }
    }

    /// Open the serial link, optionally on a different port than configured
    pub async fn open_link(&self, port: Option<String>) -> Result<()> {
        if let Some(name) = self.link_name().await {
            bail!("link {} is already open", name);
        }

        let config = {
            let mut guard = self.link_config.write();
            if port.is_some() {
                guard.port = port;
            }
            guard.clone()
        };

        let demo = self.demo;
        let port = tokio::task::spawn_blocking(move || link::open(&config, demo))
            .await
            .context("Link open task failed")??;
        self.attach_link(port).await
    }

    /// Start acquisition on an already opened link
    pub async fn attach_link(&self, port: Arc<dyn LinePort>) -> Result<()> {
        let mut active = self.link.lock().await;
        if let Some(existing) = active.as_ref() {
            bail!("link {} is already open", existing.port.name());
        }

        self.actuator.attach(port.clone());
        let acquisition = self.pipeline.clone().start(port.clone());
        let name = port.name().to_string();
        *active = Some(ActiveLink { port, acquisition });
        drop(active);

        self.events.info(format!("Link {} opened", name));
        self.audit("link_open", name).await;
        Ok(())
    }

    /// Close the link and wait for acquisition to stop. Returns false if none was open.
    pub async fn close_link(&self) -> bool {
        let active = self.link.lock().await.take();
        let Some(active) = active else {
            return false;
        };

        // No valve write may start once the port is closing
        self.actuator.detach();
        active.port.close();
        active.acquisition.stop().await;

        let name = active.port.name().to_string();
        self.events.info(format!("Link {} closed", name));
        self.audit("link_close", name).await;
        true
    }

    pub async fn link_name(&self) -> Option<String> {
        self.link.lock().await.as_ref().map(|a| a.port.name().to_string())
    }

    pub async fn start_detection(&self) -> Result<()> {
        let (source, detector) = detection::open_camera(self.detection_config.camera_index, self.demo)?;
        self.start_detection_with(source, detector).await
    }

    pub async fn start_detection_with(&self, source: Box<dyn FrameSource>, detector: Arc<dyn Detector>) -> Result<()> {
        let mut running = self.detection.lock().await;
        if running.is_some() {
            bail!("detection is already running");
        }

        let pipeline = DetectionPipeline::new(&self.detection_config, self.publish_timeout, self.persist_timeout);
        *running = Some(pipeline.start(
            source,
            detector,
            self.display.clone(),
            self.publisher.clone(),
            self.log.clone(),
        ));
        drop(running);

        self.events.info("People detection started");
        self.audit("detection_start", format!("camera {}", self.detection_config.camera_index)).await;
        Ok(())
    }

    /// Stop detection and release the camera. Returns false if it was not running.
    pub async fn stop_detection(&self) -> bool {
        let handle = self.detection.lock().await.take();
        let Some(handle) = handle else {
            return false;
        };
        handle.stop().await;

        self.events.info("People detection stopped");
        self.audit("detection_stop", "").await;
        true
    }

    pub async fn detection_running(&self) -> bool {
        self.detection.lock().await.is_some()
    }

    pub async fn set_mode(&self, mode: ValveMode) {
        let previous = self.engine.set_mode(mode);
        if previous != mode {
            self.events.info(format!("Valve control switched to {} mode", mode));
            self.audit("mode_change", format!("{} -> {}", previous, mode)).await;
        }
    }

    pub async fn set_manual(&self, open: bool) -> Result<ManualOutcome, ControlError> {
        let result = self.engine.set_manual(open).await;
        if let Err(e) = &result {
            self.events.warning(format!("Valve command rejected: {}", e));
        }
        result
    }

    pub async fn set_thresholds(&self, thresholds: ThresholdConfig) -> Result<(), ControlError> {
        self.engine.set_thresholds(thresholds)?;
        self.audit(
            "threshold_change",
            format!(
                "temperature {} humidity {} light {}",
                thresholds.temp_max, thresholds.humidity_max, thresholds.light_max
            ),
        )
        .await;
        Ok(())
    }

    /// Record, evaluate and publish the current snapshot on demand
    pub async fn report_now(&self) -> Result<(), PublishError> {
        let snapshot = self.state.snapshot();
        if let Err(e) = db::within(self.persist_timeout, self.log.record_reading(snapshot.clone())).await {
            warn!("Manual report not acknowledged in time: {}", e);
        }
        self.engine.evaluate(&snapshot).await;

        let result = self.pipeline.publish(&snapshot).await;
        let outcome = match &result {
            Ok(()) => "published".to_string(),
            Err(e) => format!("failed: {}", e),
        };
        self.audit("manual_report", outcome).await;
        result
    }

    pub async fn status(&self) -> SessionStatus {
        SessionStatus {
            link: self.link_name().await,
            detection_running: self.detection_running().await,
            valve: self.engine.valve_state(),
            thresholds: self.engine.thresholds(),
            sensors: self.state.snapshot(),
            store: match db::within(self.persist_timeout, self.log.stats()).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Store row counts unavailable: {}", e);
                    None
                }
            },
        }
    }

    pub fn query(&self) -> Arc<StatusQueryService> {
        self.query.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn display(&self) -> Arc<DisplayState> {
        self.display.clone()
    }

    pub fn engine(&self) -> Arc<ControlEngine> {
        self.engine.clone()
    }

    pub fn sensors(&self) -> Arc<SensorState> {
        self.state.clone()
    }

    /// Stop every loop, then drain and close the store
    pub async fn shutdown(&self) {
        info!("Shutting down session...");

        if let Some(api) = self.api.lock().await.take() {
            api.stop().await;
        }
        self.stop_detection().await;
        self.close_link().await;

        self.log.close().await;
        info!("Session stopped");
    }

    async fn audit(&self, operation: &str, details: impl Into<String>) {
        let record = UserOperationRecord::new(operation, details);
        if let Err(e) = db::within(self.persist_timeout, self.log.record_user_op(record)).await {
            warn!("Failed to record {} operation: {}", operation, e);
        }
    }
}
