// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Simulated sensor node for demo mode

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::StandardNormal;
use tracing::info;

use super::{LinePort, LinkError};

/// Emits protocol lines the way the wired node does and swallows valve bytes
pub struct SimulatedLink {
    poll_timeout: Duration,
    open: AtomicBool,
    state: Mutex<SimState>,
    written: Mutex<Vec<u8>>,
}

struct SimState {
    rng: StdRng,
    pending: VecDeque<u8>,
    next_line: Instant,
    line_interval: Duration,
    tick: u64,

    // Drifting environment
    temperature: f64,
    humidity: f64,
    light: f64,
    spike_probability: f64,
}

impl SimulatedLink {
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            open: AtomicBool::new(true),
            state: Mutex::new(SimState {
                rng: StdRng::from_entropy(),
                pending: VecDeque::new(),
                next_line: Instant::now(),
                line_interval: Duration::from_millis(250),
                tick: 0,
                temperature: 24.0,
                humidity: 55.0,
                light: 400.0,
                spike_probability: 0.01,
            }),
            written: Mutex::new(Vec::new()),
        }
    }

    /// Bytes the controller has written so far
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }
}

impl SimState {
    fn generate_line(&mut self) -> String {
        self.tick += 1;
        let mut noise = |scale: f64| self.rng.sample::<f64, _>(StandardNormal) * scale;
        let (dt, dh, dl) = (noise(0.2), noise(0.4), noise(4.0));

        self.temperature = (self.temperature + dt).clamp(15.0, 45.0);
        self.humidity = (self.humidity + dh).clamp(20.0, 95.0);
        self.light = (self.light + dl).clamp(0.0, 1500.0);

        if self.rng.gen::<f64>() < self.spike_probability {
            self.temperature += self.rng.gen_range(8.0..15.0);
        }

        match self.tick % 4 {
            0 => format!("w{:.0}&s{:.0}!\r\n", self.temperature, self.humidity),
            1 => format!("g{:.0}\r\n", self.light),
            2 => format!("h{}\n", u8::from(self.rng.gen_bool(0.2))),
            _ => format!("y{}\n", u8::from(self.rng.gen_bool(0.05))),
        }
    }
}

impl LinePort for SimulatedLink {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }

        let wait = {
            let mut state = self.state.lock();
            let now = Instant::now();
            if state.pending.is_empty() && now >= state.next_line {
                let line = state.generate_line();
                state.pending.extend(line.bytes());
                state.next_line = now + state.line_interval;
            }

            if !state.pending.is_empty() {
                let n = buf.len().min(state.pending.len());
                for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }

            state.next_line.saturating_duration_since(now).min(self.poll_timeout)
        };

        std::thread::sleep(wait);
        Ok(0)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        for byte in bytes {
            info!("Simulated valve received command 0x{:02X}", byte);
        }
        self.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}
