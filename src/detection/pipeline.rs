// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Capture and reporting loops for people counting

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::{DetectionCount, Detector, DisplayState, FrameSource};
use crate::config::DetectionConfig;
use crate::core::LoopHandle;
use crate::db::{self, PersistenceLog};
use crate::streaming::{publish_within, TelemetryPublisher};

/// Builder for the two detection loops.
///
/// Capture runs on a blocking thread and never waits on the network. Counts
/// cross to the reporter through a bounded queue; when it is full the newest
/// count is dropped.
pub struct DetectionPipeline {
    pub frame_interval: Duration,
    pub report_queue: usize,
    pub publish_timeout: Duration,
    pub persist_timeout: Duration,
}

impl DetectionPipeline {
    pub fn new(config: &DetectionConfig, publish_timeout: Duration, persist_timeout: Duration) -> Self {
        Self {
            frame_interval: Duration::from_millis(config.frame_interval_ms),
            report_queue: config.report_queue.max(1),
            publish_timeout,
            persist_timeout,
        }
    }

    pub fn start(
        &self,
        mut source: Box<dyn FrameSource>,
        detector: Arc<dyn Detector>,
        display: Arc<DisplayState>,
        publisher: Arc<dyn TelemetryPublisher>,
        log: PersistenceLog,
    ) -> LoopHandle {
        let mut handle = LoopHandle::new("detection");
        let (tx, mut rx) = mpsc::channel::<DetectionCount>(self.report_queue);

        let mut stop = handle.stop_signal();
        let interval = self.frame_interval;
        handle.push(tokio::task::spawn_blocking(move || {
            info!("Detection capture started");
            loop {
                if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                    break;
                }

                match source.grab() {
                    Ok(Some(frame)) => match detector.detect(&frame) {
                        Ok(detection) => {
                            let count = DetectionCount {
                                count: detection.count,
                                observed_at: frame.captured_at,
                            };
                            display.update(detection.annotated, count);
                            match tx.try_send(count) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => debug!("Report queue full, count dropped"),
                                Err(TrySendError::Closed(_)) => break,
                            }
                        }
                        Err(e) => warn!("Detector failed: {}", e),
                    },
                    Ok(None) => {}
                    Err(e) => warn!("Frame capture failed: {}", e),
                }

                std::thread::sleep(interval);
            }
            source.release();
            info!("Detection capture stopped, camera released");
        }));

        let mut stop = handle.stop_signal();
        let publish_timeout = self.publish_timeout;
        let persist_timeout = self.persist_timeout;
        handle.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.recv() => {
                        // Counts already captured are still reported
                        rx.close();
                        while let Ok(count) = rx.try_recv() {
                            report(count, publisher.as_ref(), &log, publish_timeout, persist_timeout).await;
                        }
                        break;
                    }
                    count = rx.recv() => match count {
                        Some(count) => {
                            report(count, publisher.as_ref(), &log, publish_timeout, persist_timeout).await
                        }
                        None => break,
                    },
                }
            }
            debug!("Detection reporter stopped");
        }));

        handle
    }
}

/// Publish one count and record it. Failures are logged and skipped.
pub(crate) async fn report(
    count: DetectionCount,
    publisher: &dyn TelemetryPublisher,
    log: &PersistenceLog,
    publish_timeout: Duration,
    persist_timeout: Duration,
) {
    if let Err(e) = publish_within(publisher, &count.to_properties(), publish_timeout).await {
        warn!("People count publish failed: {}", e);
    }
    if let Err(e) = db::within(persist_timeout, log.record_people(count)).await {
        warn!("People count not acknowledged in time: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Frame, SimulatedCamera, SimulatedDetector};
    use crate::testing::RecordingPublisher;

    fn pipeline() -> DetectionPipeline {
        let config = DetectionConfig {
            frame_interval_ms: 5,
            report_queue: 2,
            ..Default::default()
        };
        DetectionPipeline::new(&config, Duration::from_millis(200), Duration::from_millis(500))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_counts_reach_publisher_and_store() {
        let publisher = Arc::new(RecordingPublisher::new());
        let log = PersistenceLog::open_in_memory(16).unwrap();
        let display = DisplayState::new();

        let handle = pipeline().start(
            Box::new(SimulatedCamera::new(32, 24)),
            Arc::new(SimulatedDetector::new()),
            display.clone(),
            publisher.clone(),
            log.clone(),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop().await;

        let published = publisher.published();
        assert!(!published.is_empty());
        assert!(published.iter().all(|p| p.contains_key("current_people")));
        assert!(!log.recent_people(5).await.unwrap().is_empty());
        assert!(display.latest_count().is_some());
        log.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_publisher_does_not_stall_capture() {
        let publisher = Arc::new(RecordingPublisher::with_delay(Duration::from_millis(100)));
        let log = PersistenceLog::open_in_memory(16).unwrap();
        let display = DisplayState::new();

        let handle = pipeline().start(
            Box::new(SimulatedCamera::new(16, 16)),
            Arc::new(SimulatedDetector::new()),
            display.clone(),
            publisher.clone(),
            log.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let first = display.latest_frame().map(|f| f.captured_at);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = display.latest_frame().map(|f| f.captured_at);
        handle.stop().await;

        // Frames kept coming while the reporter was stuck in its first publish
        assert!(first.is_some());
        assert_ne!(first, second);
        log.close().await;
    }

    /// Yields `remaining` blank frames, then nothing
    struct FixedSource {
        remaining: usize,
    }

    impl FrameSource for FixedSource {
        fn grab(&mut self) -> anyhow::Result<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(Frame {
                width: 4,
                height: 4,
                data: vec![0; 4 * 4 * 3],
                captured_at: chrono::Utc::now(),
            }))
        }

        fn release(&mut self) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_reports_queued_counts() {
        let publisher = Arc::new(RecordingPublisher::with_delay(Duration::from_millis(40)));
        let log = PersistenceLog::open_in_memory(16).unwrap();
        let config = DetectionConfig {
            frame_interval_ms: 2,
            report_queue: 6,
            ..Default::default()
        };

        let handle = DetectionPipeline::new(&config, Duration::from_millis(500), Duration::from_millis(500)).start(
            Box::new(FixedSource { remaining: 6 }),
            Arc::new(SimulatedDetector::new()),
            DisplayState::new(),
            publisher.clone(),
            log.clone(),
        );

        // All six frames are queued long before the reporter works through them
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;

        assert_eq!(publisher.published().len(), 6);
        assert_eq!(log.recent_people(10).await.unwrap().len(), 6);
        log.close().await;
    }

    #[tokio::test]
    async fn test_report_survives_failures() {
        let publisher = RecordingPublisher::new();
        publisher.set_failing(true);
        let log = PersistenceLog::open_in_memory(4).unwrap();

        let count = DetectionCount { count: 4, observed_at: chrono::Utc::now() };
        report(count, &publisher, &log, Duration::from_millis(50), Duration::from_millis(500)).await;

        assert_eq!(publisher.attempts(), 1);
        let rows = log.recent_people(1).await.unwrap();
        assert_eq!(rows[0].count, 4);
        log.close().await;
    }
}
