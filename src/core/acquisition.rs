// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Acquisition loop - link bytes to decoded lines to control decisions

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EventBus, LoopHandle};
use crate::control::ControlEngine;
use crate::db::{self, PersistenceLog};
use crate::link::{LinePort, LinkError};
use crate::protocol::ProtocolDecoder;
use crate::sensors::{SensorReading, SensorSnapshot, SensorState};
use crate::streaming::{publish_within, TelemetryPublisher};
use crate::error::PublishError;

const READ_CHUNK: usize = 64;
const FAULT_BACKOFF: Duration = Duration::from_millis(250);

/// Everything that happens to one decoded line
pub struct SensorPipeline {
    pub state: Arc<SensorState>,
    pub engine: Arc<ControlEngine>,
    pub log: PersistenceLog,
    pub publisher: Arc<dyn TelemetryPublisher>,
    pub events: Arc<EventBus>,
    pub publish_timeout: Duration,
    pub persist_timeout: Duration,
    pub max_line: usize,
}

impl SensorPipeline {
    /// Apply, evaluate, persist and publish one line's readings.
    ///
    /// The control decision is made before any network call. Persistence and
    /// publishing are each bounded, so a slow backend delays the next read by
    /// at most the two timeouts.
    pub async fn handle_line(&self, readings: &[SensorReading]) {
        self.state.apply(readings);
        let snapshot = self.state.snapshot();

        self.engine.evaluate(&snapshot).await;

        if let Err(e) = db::within(self.persist_timeout, self.log.record_reading(snapshot.clone())).await {
            warn!("Sensor snapshot not acknowledged in time: {}", e);
        }
        if let Err(e) = self.publish(&snapshot).await {
            warn!("Sensor publish failed: {}", e);
        }
    }

    pub async fn publish(&self, snapshot: &SensorSnapshot) -> Result<(), PublishError> {
        publish_within(self.publisher.as_ref(), &snapshot.to_properties(), self.publish_timeout).await
    }

    /// Start polling `link`. The loop ends when stopped or when the link closes.
    pub fn start(self: Arc<Self>, link: Arc<dyn LinePort>) -> LoopHandle {
        let mut handle = LoopHandle::new("acquisition");
        let mut stop = handle.stop_signal();

        handle.push(tokio::spawn(async move {
            info!("Acquisition started on {}", link.name());
            let mut decoder = ProtocolDecoder::new(self.max_line);
            let mut buf = vec![0u8; READ_CHUNK];

            loop {
                let port = link.clone();
                let read = tokio::task::spawn_blocking(move || {
                    let result = port.read(&mut buf);
                    (buf, result)
                });

                let (returned, result) = tokio::select! {
                    biased;
                    _ = stop.recv() => break,
                    joined = read => match joined {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("Link read task failed: {}", e);
                            break;
                        }
                    },
                };
                buf = returned;

                let n = match result {
                    Ok(n) => n,
                    Err(LinkError::Closed) => {
                        self.events.warning(format!("Link {} closed", link.name()));
                        break;
                    }
                    Err(e) => {
                        warn!("Link read fault: {}", e);
                        tokio::time::sleep(FAULT_BACKOFF).await;
                        continue;
                    }
                };

                for &byte in &buf[..n] {
                    match decoder.feed(byte) {
                        Some(Ok(readings)) => self.handle_line(&readings).await,
                        Some(Err(e)) => warn!("Discarding line: {}", e),
                        None => {}
                    }
                }
            }

            debug!("Acquisition stopped, {} byte(s) of partial line dropped", decoder.pending());
        }));

        handle
    }
}
