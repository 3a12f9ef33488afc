//! # minibench
//!
//! A cooperative micro-benchmark harness.
//!
//! Benchmarks are plain closures that signal completion through a continuation,
//! so a body can finish synchronously or defer its continuation to a timer or
//! I/O callback. Each entry runs either a fixed iteration count or grows its
//! count adaptively until a run lasts at least a minimum duration; the suite
//! sequences entries concurrently or one at a time with a delay between them.
//!
//! Everything runs on one logical timeline: an [`EventLoop`] (or, with the
//! `async` feature, a tokio `LocalSet`) fires the delayed dispatches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use minibench::{ConsoleReporter, EventLoop, Suite, SuiteConfig, SystemClock};
//!
//! let ev = EventLoop::new(SystemClock::new());
//! let suite = Suite::with_event_loop(SuiteConfig::from_env(), &ev).unwrap();
//!
//! suite
//!     .reporter(ConsoleReporter::new())
//!     .section_fn("warm caches", |next| {
//!         let _ = std::fs::read_dir(".");
//!         next.done();
//!     })
//!     .bench_fn("vec push", |next| {
//!         let mut v = Vec::with_capacity(64);
//!         for i in 0..64 {
//!             v.push(i);
//!         }
//!         std::hint::black_box(&v);
//!         next.done();
//!     })
//!     .bench_loop("sum", |next, n| {
//!         let total: u64 = (0..n).sum();
//!         std::hint::black_box(total);
//!         next.done();
//!     });
//!
//! suite.run();
//! ev.run();
//! ```
//!
//! ## Features
//!
//! - **`async`**: tokio-backed scheduler and clock for use inside a `LocalSet`

mod clock;
mod config;
mod entry;
mod error;
mod report;
mod result;
mod suite;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Concurrency, SuiteConfig};
pub use entry::{
    next_iterations, Body, Entry, Next, Policy, RetryTiming, Stats, DAMPING, GROWTH_FACTOR,
};
pub use error::ConfigError;
pub use report::{ConsoleReporter, MultiReporter, Recorder, Reporter};
pub use result::{EntryKind, EntryResult, SuiteResult};
pub use suite::{DoneHandler, Handlers, ResultHandler, SectionHandler, StartHandler, Suite};
pub use timer::{EventLoop, Scheduler, Task};

#[cfg(feature = "async")]
pub mod async_runner;
