// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Ownership of background loops

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Stop signal plus the tasks listening for it.
///
/// Dropping a handle without calling [`LoopHandle::stop`] also signals the
/// tasks, but does not wait for them.
pub struct LoopHandle {
    name: &'static str,
    stop: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl LoopHandle {
    pub fn new(name: &'static str) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            name,
            stop,
            tasks: Vec::new(),
        }
    }

    /// Receiver that fires when the loop is asked to stop
    pub fn stop_signal(&self) -> broadcast::Receiver<()> {
        self.stop.subscribe()
    }

    pub fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.is_finished())
    }

    /// Signal every task and wait until all of them have returned
    pub async fn stop(mut self) {
        let _ = self.stop.send(());
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("{} task ended abnormally: {}", self.name, e);
            }
        }
        debug!("{} stopped", self.name);
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_waits_for_tasks() {
        let mut handle = LoopHandle::new("test");
        let finished = Arc::new(AtomicBool::new(false));

        let mut stop = handle.stop_signal();
        let flag = finished.clone();
        handle.push(tokio::spawn(async move {
            let _ = stop.recv().await;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
        }));

        handle.stop().await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
