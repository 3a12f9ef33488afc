//! A single benchmark or section step and its measurement state machine.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Multiplier applied when an adaptive attempt cannot produce a usable estimate.
pub const GROWTH_FACTOR: u64 = 10;

/// Damping applied to the ratio estimate so retries undershoot rather than overshoot.
pub const DAMPING: f64 = 0.9;

/// Stopping condition for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Run the target count once and report.
    Fixed,
    /// Grow the target count until an attempt lasts at least the minimum duration.
    #[default]
    Adaptive,
    /// Run exactly once; the result is a checkpoint, not a throughput figure.
    Section,
}

/// Which start time adaptive retries measure from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryTiming {
    /// Keep the start of the first attempt; accepted elapsed spans every retry.
    #[default]
    Cumulative,
    /// Re-read the clock for each attempt.
    PerAttempt,
}

/// Outcome of one logical measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Iteration count of the accepted attempt.
    pub iterations: u64,
    #[serde(with = "crate::result::duration_serde")]
    pub elapsed: Duration,
}

impl Stats {
    /// Mean time per iteration.
    pub fn per_iteration(&self) -> Duration {
        if self.iterations == 0 {
            return self.elapsed;
        }
        let nanos = self.elapsed.as_nanos() / u128::from(self.iterations);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Iterations per second, `None` when nothing measurable elapsed.
    pub fn ops_per_sec(&self) -> Option<f64> {
        if self.elapsed.is_zero() {
            return None;
        }
        Some(self.iterations as f64 / self.elapsed.as_secs_f64())
    }
}

/// Iteration count for the next adaptive attempt after `target` ran for `elapsed`.
///
/// A zero reading escalates by [`GROWTH_FACTOR`]. Otherwise the count is scaled by
/// the shortfall ratio and damped; an estimate that would not grow also escalates.
pub fn next_iterations(target: u64, elapsed: Duration, min_duration: Duration) -> u64 {
    let escalated = target.saturating_mul(GROWTH_FACTOR);
    if elapsed.is_zero() {
        return escalated;
    }

    let ratio = min_duration.as_secs_f64() / elapsed.as_secs_f64();
    let estimate = (target as f64 * ratio * DAMPING).floor() as u64;
    if estimate <= target {
        escalated
    } else {
        estimate
    }
}

/// The user function under measurement, tagged with its execution shape.
#[derive(Clone)]
pub enum Body {
    /// Called once per attempt with the target count; loops internally and calls
    /// [`Next::done`] once after the last pass.
    SelfLooping(Rc<dyn Fn(Next, u64)>),
    /// Called once per iteration by the entry; each call signals [`Next::done`].
    PerIteration(Rc<dyn Fn(Next)>),
}

impl Body {
    pub fn self_looping(f: impl Fn(Next, u64) + 'static) -> Self {
        Body::SelfLooping(Rc::new(f))
    }

    pub fn per_iteration(f: impl Fn(Next) + 'static) -> Self {
        Body::PerIteration(Rc::new(f))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::SelfLooping(_) => f.write_str("SelfLooping"),
            Body::PerIteration(_) => f.write_str("PerIteration"),
        }
    }
}

type Completion = Box<dyn FnOnce(Stats)>;

/// One benchmark or section step.
///
/// # Example
///
/// ```rust
/// use minibench::{Body, Entry, ManualClock, Policy};
/// use std::rc::Rc;
///
/// let clock = Rc::new(ManualClock::new());
/// let entry = Rc::new(Entry::new("noop", Policy::Fixed, Body::per_iteration(|next| next.done()), clock));
///
/// entry.run(100, |stats| assert_eq!(stats.iterations, 100));
/// ```
pub struct Entry {
    id: String,
    policy: Policy,
    body: Body,
    min_duration: Duration,
    retry_timing: RetryTiming,
    clock: Rc<dyn Clock>,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("body", &self.body)
            .field("min_duration", &self.min_duration)
            .field("retry_timing", &self.retry_timing)
            .finish()
    }
}

impl Entry {
    pub fn new(id: impl Into<String>, policy: Policy, body: Body, clock: Rc<dyn Clock>) -> Self {
        Self {
            id: id.into(),
            policy,
            body,
            min_duration: Duration::ZERO,
            retry_timing: RetryTiming::default(),
            clock,
        }
    }

    /// Minimum accepted elapsed time. Only consulted by [`Policy::Adaptive`].
    pub fn min_duration(mut self, d: Duration) -> Self {
        self.min_duration = d;
        self
    }

    pub fn retry_timing(mut self, timing: RetryTiming) -> Self {
        self.retry_timing = timing;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Start a measurement at `target` iterations.
    ///
    /// `on_complete` fires exactly once, after the policy accepts an attempt. Adaptive
    /// retries happen inside this one call chain and are not reported. A `target` of
    /// zero is treated as one.
    pub fn run(self: &Rc<Self>, target: u64, on_complete: impl FnOnce(Stats) + 'static) {
        Self::attempt(self, target.max(1), None, Box::new(on_complete));
    }

    fn attempt(self: &Rc<Self>, target: u64, origin: Option<Duration>, on_complete: Completion) {
        let iterations = match self.policy {
            Policy::Section => 1,
            _ => target,
        };
        let pending = match self.body {
            Body::SelfLooping(_) => 1,
            Body::PerIteration(_) => iterations,
        };
        let origin = origin.unwrap_or_else(|| self.clock.now());

        trace!(entry = %self.id, iterations, "attempt");

        let measurement = Rc::new(Measurement {
            entry: Rc::clone(self),
            iterations,
            origin,
            pending: Cell::new(pending),
            on_complete: RefCell::new(Some(on_complete)),
        });

        match &self.body {
            Body::SelfLooping(f) => f(Next::new(&measurement), iterations),
            Body::PerIteration(f) => {
                for _ in 0..iterations {
                    f(Next::new(&measurement));
                }
            }
        }
    }
}

/// State of one attempt: its iteration count, the start it measures from and how
/// many continuation calls are still outstanding.
struct Measurement {
    entry: Rc<Entry>,
    iterations: u64,
    origin: Duration,
    pending: Cell<u64>,
    on_complete: RefCell<Option<Completion>>,
}

impl Measurement {
    fn finish(&self) {
        let entry = &self.entry;
        let elapsed = entry.clock.now().saturating_sub(self.origin);
        let on_complete = self.on_complete.borrow_mut().take();
        let Some(on_complete) = on_complete else {
            return;
        };

        if entry.policy == Policy::Adaptive && elapsed < entry.min_duration {
            let next = next_iterations(self.iterations, elapsed, entry.min_duration);
            debug!(
                entry = %entry.id,
                iterations = self.iterations,
                elapsed_us = elapsed.as_micros() as u64,
                next,
                "below minimum duration, retrying"
            );
            let origin = match entry.retry_timing {
                RetryTiming::Cumulative => Some(self.origin),
                RetryTiming::PerAttempt => None,
            };
            Entry::attempt(entry, next, origin, on_complete);
            return;
        }

        on_complete(Stats {
            iterations: self.iterations,
            elapsed,
        });
    }
}

/// Continuation handed to a benchmark body.
///
/// Cloneable so a body can move it into a deferred callback.
#[derive(Clone)]
pub struct Next {
    measurement: Rc<Measurement>,
}

impl Next {
    fn new(measurement: &Rc<Measurement>) -> Self {
        Self {
            measurement: Rc::clone(measurement),
        }
    }

    /// Signal that one unit of work finished.
    ///
    /// The attempt completes when every expected signal has arrived; surplus
    /// signals are ignored.
    pub fn done(&self) {
        let m = &self.measurement;
        match m.pending.get() {
            0 => warn!(entry = %m.entry.id, "continuation called after the attempt completed"),
            1 => {
                m.pending.set(0);
                m.finish();
            }
            n => m.pending.set(n - 1),
        }
    }

    /// Name of the entry this continuation belongs to.
    pub fn entry(&self) -> &str {
        &self.measurement.entry.id
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("entry", &self.measurement.entry.id)
            .field("pending", &self.measurement.pending.get())
            .finish()
    }
}
