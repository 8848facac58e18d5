//! Cooperative workers.
//!
//! A worker repeatedly runs one bounded unit of work. After a step that did
//! something it yields to the scheduler; after an idle step it sleeps for a
//! fixed interval. Stopping is cooperative and takes effect between steps.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::core::{Error, Result};

/// Outcome of one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Something was consumed or produced; run again soon
    Worked,
    /// Nothing to do; sleep before the next step
    Idle,
}

/// Handle to a running worker loop
#[derive(Debug)]
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawns `step` in a loop on the current tokio runtime.
    ///
    /// `priority` only tags the worker's tracing span.
    pub fn spawn<F>(name: impl Into<String>, priority: u8, idle_interval: Duration, mut step: F) -> Self
    where
        F: FnMut() -> Step + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let span = info_span!("worker", name = %name, priority);

        let handle = tokio::spawn(
            async move {
                info!("Worker started");
                while !token.is_cancelled() {
                    match step() {
                        Step::Worked => tokio::task::yield_now().await,
                        Step::Idle => {
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = tokio::time::sleep(idle_interval) => {}
                            }
                        }
                    }
                }
                info!("Worker stopped");
            }
            .instrument(span),
        );

        Worker {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks the loop to exit after its current step
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the loop to exit
    pub async fn join(self) -> Result<()> {
        let name = self.name;
        self.handle
            .await
            .map_err(|e| Error::worker(format!("Worker {} failed: {}", name, e)))
    }

    /// Stops the loop and waits for it
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_worker_runs_until_stopped() {
        let steps = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&steps);

        let worker = Worker::spawn("counter", 5, Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Step::Worked
        });

        while steps.load(Ordering::SeqCst) < 10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(worker.name(), "counter");
        worker.shutdown().await.unwrap();

        let after = steps.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(steps.load(Ordering::SeqCst), after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_step_sleeps() {
        let steps = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&steps);

        let worker = Worker::spawn("idle", 5, Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Step::Idle
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        // Steps at 0, 100 and 200 ms
        assert_eq!(steps.load(Ordering::SeqCst), 3);

        worker.stop();
        worker.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_interrupts_idle_sleep() {
        let worker = Worker::spawn("sleeper", 5, Duration::from_secs(3600), || Step::Idle);
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(1), worker.shutdown())
            .await
            .unwrap()
            .unwrap();
    }
}
