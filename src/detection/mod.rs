//! Detection module - people counting from camera frames

mod pipeline;
mod simulated;

pub use pipeline::DetectionPipeline;
pub use simulated::{SimulatedCamera, SimulatedDetector};

use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use anyhow::{bail, Result};

use crate::streaming::PropertyMap;

/// Raw image as delivered by the capture device
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Detector output for one frame
#[derive(Debug, Clone)]
pub struct Detection {
    pub count: usize,
    /// Frame with detections drawn in, for display
    pub annotated: Frame,
}

/// Number of people seen in one processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionCount {
    pub count: usize,
    pub observed_at: DateTime<Utc>,
}

impl DetectionCount {
    /// Properties published per processed frame. Outbound flow is not measured.
    pub fn to_properties(&self) -> PropertyMap {
        PropertyMap::from([
            ("people_count_in".to_string(), serde_json::json!(self.count)),
            ("people_count_out".to_string(), serde_json::json!(0)),
            ("current_people".to_string(), serde_json::json!(self.count)),
        ])
    }
}

/// Produces frames on demand
pub trait FrameSource: Send {
    /// `Ok(None)` when no frame is ready yet
    fn grab(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Called once when detection stops.
    fn release(&mut self);
}

/// Opaque people detector
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Detection>;
}

/// Open the capture device and detector for `camera_index`.
///
/// Only the synthetic pair ships with this crate; hardware backends plug in
/// through [`FrameSource`] and [`Detector`].
pub fn open_camera(camera_index: u32, demo: bool) -> Result<(Box<dyn FrameSource>, Arc<dyn Detector>)> {
    if !demo {
        bail!("no capture driver for camera {}, run with --demo for the simulated camera", camera_index);
    }
    Ok((Box::new(SimulatedCamera::new(320, 240)), Arc::new(SimulatedDetector::new())))
}

/// Latest annotated frame and count, for whatever renders them
#[derive(Default)]
pub struct DisplayState {
    latest: RwLock<Option<(Frame, DetectionCount)>>,
}

impl DisplayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update(&self, frame: Frame, count: DetectionCount) {
        *self.latest.write() = Some((frame, count));
    }

    pub fn latest_count(&self) -> Option<DetectionCount> {
        self.latest.read().as_ref().map(|(_, c)| *c)
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.latest.read().as_ref().map(|(f, _)| f.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_properties() {
        let props = DetectionCount { count: 3, observed_at: Utc::now() }.to_properties();
        assert_eq!(props["people_count_in"], serde_json::json!(3));
        assert_eq!(props["people_count_out"], serde_json::json!(0));
        assert_eq!(props["current_people"], serde_json::json!(3));
    }

    #[test]
    fn test_camera_requires_demo() {
        assert!(open_camera(0, false).is_err());
        assert!(open_camera(0, true).is_ok());
    }
}
