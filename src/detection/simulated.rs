// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Synthetic camera and detector for demo mode

use anyhow::{bail, Result};
use chrono::Utc;
use rand::prelude::*;
use tracing::debug;

use super::{Detection, Detector, Frame, FrameSource};

const BRIGHT: u8 = 200;
const MAX_PEOPLE: usize = 6;

struct Walker {
    x: f64,
    speed: f64,
}

/// Renders people as bright vertical bars walking across a dark scene
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    rng: StdRng,
    walkers: Vec<Walker>,
    enter_probability: f64,
    released: bool,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(8),
            height: height.max(4),
            rng: StdRng::from_entropy(),
            walkers: Vec::new(),
            enter_probability: 0.05,
            released: false,
        }
    }

    fn bar_width(&self) -> u32 {
        (self.width / 16).max(1)
    }

    fn step(&mut self) {
        let width = self.width as f64;
        for walker in &mut self.walkers {
            walker.x += walker.speed;
        }
        self.walkers.retain(|w| w.x >= 0.0 && w.x < width);

        if self.walkers.len() < MAX_PEOPLE && self.rng.gen::<f64>() < self.enter_probability {
            let from_left = self.rng.gen_bool(0.5);
            let speed = self.rng.gen_range(0.2..1.5);
            self.walkers.push(Walker {
                x: if from_left { 0.0 } else { width - 1.0 },
                speed: if from_left { speed } else { -speed },
            });
        }
    }

    fn render(&mut self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = vec![0u8; w * h * 3];

        for px in data.chunks_exact_mut(3) {
            let noise = self.rng.gen_range(0..40);
            px.copy_from_slice(&[noise, noise, noise]);
        }

        let bar = self.bar_width() as usize;
        for walker in &self.walkers {
            let start = walker.x as usize;
            for x in start..(start + bar).min(w) {
                for y in 0..h {
                    let i = (y * w + x) * 3;
                    data[i] = BRIGHT;
                    data[i + 1] = BRIGHT;
                    data[i + 2] = BRIGHT;
                }
            }
        }
        data
    }
}

impl FrameSource for SimulatedCamera {
    fn grab(&mut self) -> Result<Option<Frame>> {
        if self.released {
            bail!("camera released");
        }
        self.step();
        Ok(Some(Frame {
            width: self.width,
            height: self.height,
            data: self.render(),
            captured_at: Utc::now(),
        }))
    }

    fn release(&mut self) {
        self.released = true;
        debug!("Simulated camera released");
    }
}

/// Counts bright vertical runs along the middle scan line
pub struct SimulatedDetector {
    threshold: u8,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self { threshold: BRIGHT / 2 }
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for SimulatedDetector {
    fn detect(&self, frame: &Frame) -> Result<Detection> {
        let (w, h) = (frame.width as usize, frame.height as usize);
        if frame.data.len() < w * h * 3 {
            bail!("frame buffer too short: {} bytes for {}x{}", frame.data.len(), w, h);
        }

        let row = h / 2;
        let mut annotated = frame.clone();
        let mut count = 0;
        let mut inside = false;

        for x in 0..w {
            let bright = frame.data[(row * w + x) * 3] > self.threshold;
            if bright && !inside {
                count += 1;
                // Mark the detection in the top row
                let i = x * 3;
                annotated.data[i..i + 3].copy_from_slice(&[0, 255, 0]);
            }
            inside = bright;
        }

        Ok(Detection { count, annotated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_bars(width: u32, height: u32, bars: &[u32]) -> Frame {
        let mut data = vec![0u8; (width * height * 3) as usize];
        for &bx in bars {
            for y in 0..height {
                let i = ((y * width + bx) * 3) as usize;
                data[i..i + 3].copy_from_slice(&[BRIGHT; 3]);
            }
        }
        Frame { width, height, data, captured_at: Utc::now() }
    }

    #[test]
    fn test_detector_counts_separate_bars() {
        let frame = frame_with_bars(20, 6, &[2, 3, 8, 15]);
        let detection = SimulatedDetector::new().detect(&frame).unwrap();

        assert_eq!(detection.count, 3);
        assert_eq!(&detection.annotated.data[2 * 3..2 * 3 + 3], &[0, 255, 0]);
        assert_eq!(detection.annotated.captured_at, frame.captured_at);
    }

    #[test]
    fn test_detector_rejects_short_buffer() {
        let frame = Frame { width: 10, height: 10, data: vec![0; 3], captured_at: Utc::now() };
        assert!(SimulatedDetector::new().detect(&frame).is_err());
    }

    #[test]
    fn test_camera_stops_after_release() {
        let mut camera = SimulatedCamera::new(32, 8);
        let frame = camera.grab().unwrap().unwrap();
        assert_eq!(frame.data.len(), 32 * 8 * 3);

        camera.release();
        assert!(camera.grab().is_err());
    }
}
