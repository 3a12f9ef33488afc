//! Run suites inside a tokio `LocalSet`.
//!
//! Delayed dispatch becomes `spawn_local` + `tokio::time::sleep`, so benchmark
//! bodies may await tokio timers or I/O before signalling their continuation.

use crate::clock::Clock;
use crate::config::SuiteConfig;
use crate::error::ConfigError;
use crate::suite::Suite;
use crate::timer::{Scheduler, Task};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// [`Scheduler`] that spawns onto the current `LocalSet`.
///
/// Panics if used outside `LocalSet::run_until` or `LocalSet::block_on`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScheduler;

impl Scheduler for LocalScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task();
        });
    }
}

/// Clock reading tokio's time source, so paused test time is honoured.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    // Blocks the thread; never drive an EventLoop on this clock from inside the runtime.
    fn wait_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// A suite dispatching through [`LocalScheduler`] and measuring with [`TokioClock`].
pub fn local_suite(config: SuiteConfig) -> Result<Suite, ConfigError> {
    Suite::new(config, Rc::new(LocalScheduler), Rc::new(TokioClock::new()))
}

/// Run `suite` and wait for its `done` event, returning the total elapsed time.
///
/// Installs its own `done` handler, replacing any set before. If a run is already
/// in progress, waits for that run instead of starting another. Returns `None`
/// when that handler is replaced before the run finishes, since the completion
/// can no longer be observed.
pub async fn run_local(suite: &Suite) -> Option<Duration> {
    let (tx, rx) = oneshot::channel();
    let mut tx = Some(tx);
    suite.on_done(move |total| {
        if let Some(tx) = tx.take() {
            let _ = tx.send(total);
        }
    });
    suite.run();
    rx.await.ok()
}
