//! Test doubles shared by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PublishError;
use crate::link::{LinePort, LinkError};
use crate::streaming::{PropertyMap, TelemetryPublisher};

/// In-memory link with scripted inbound bytes
pub struct MockLink {
    inbound: Mutex<VecDeque<u8>>,
    written: Mutex<Vec<u8>>,
    open: AtomicBool,
    fail_writes: AtomicBool,
    poll: Duration,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            poll: Duration::from_millis(2),
        }
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.lock().extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }
}

impl LinePort for MockLink {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        let mut inbound = self.inbound.lock();
        if inbound.is_empty() {
            drop(inbound);
            std::thread::sleep(self.poll);
            return Ok(0);
        }
        // Dribble a few bytes at a time like a real UART
        let n = buf.len().min(inbound.len()).min(3);
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write fault",
            )));
        }
        self.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn close(&self) {
        self.set_open(false);
    }
}

/// Publisher that keeps everything it is given
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PropertyMap>>,
    fail: AtomicBool,
    delay: Option<Duration>,
    attempts: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }

    pub fn published(&self) -> Vec<PropertyMap> {
        self.published.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TelemetryPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, properties: &PropertyMap) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::Acquire) {
            return Err(PublishError::Transport("recording publisher set to fail".to_string()));
        }
        self.published.lock().push(properties.clone());
        Ok(())
    }
}
