//! Configuration for a benchmark suite.

use crate::entry::{Policy, RetryTiming};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a suite dispatches its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Concurrency {
    /// Arm every entry's delayed dispatch at once.
    #[default]
    Concurrent,
    /// Arm the next entry only after the previous one completed.
    Serial,
}

/// Suite-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Policy for `bench` entries. Sections always use [`Policy::Section`].
    pub policy: Policy,
    /// Starting iteration count.
    pub iterations: u64,
    /// Minimum accepted elapsed time (adaptive only).
    #[serde(with = "crate::result::duration_serde")]
    pub min_duration: Duration,
    /// Delay before each entry is dispatched.
    #[serde(with = "crate::result::duration_serde")]
    pub delay: Duration,
    pub concurrency: Concurrency,
    /// Start time adaptive retries measure from.
    pub retry_timing: RetryTiming,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Adaptive,
            iterations: 10,
            min_duration: Duration::from_millis(100),
            delay: Duration::from_millis(100),
            concurrency: Concurrency::Concurrent,
            retry_timing: RetryTiming::Cumulative,
        }
    }
}

impl SuiteConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables, keeping defaults for malformed values.
    ///
    /// Supported variables:
    /// - `BENCH_POLICY`: `fixed` or `adaptive` (default: adaptive)
    /// - `BENCH_ITERATIONS`: starting iterations (default: 10)
    /// - `BENCH_MIN_TIME_MS`: adaptive minimum duration (default: 100)
    /// - `BENCH_DELAY_MS`: delay between entries (default: 100)
    /// - `BENCH_SERIAL`: run entries one at a time (default: false)
    /// - `BENCH_RETRY_TIMING`: `cumulative` or `per-attempt`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        for var in ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                if let Err(e) = cfg.apply(var, &value) {
                    tracing::warn!("{e}; keeping default");
                }
            }
        }
        cfg
    }

    /// Like [`SuiteConfig::from_env`], but a malformed variable is an error.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for var in ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                cfg.apply(var, &value)?;
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply one `BENCH_*` setting given as text.
    pub fn apply(&mut self, var: &'static str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let value = value.trim();

        match var {
            "BENCH_POLICY" => {
                self.policy = match value.to_ascii_lowercase().as_str() {
                    "fixed" => Policy::Fixed,
                    "adaptive" => Policy::Adaptive,
                    _ => return Err(invalid("expected `fixed` or `adaptive`")),
                }
            }
            "BENCH_ITERATIONS" => {
                self.iterations = value
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid(&e.to_string()))?;
            }
            "BENCH_MIN_TIME_MS" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid(&e.to_string()))?;
                self.min_duration = Duration::from_millis(ms);
            }
            "BENCH_DELAY_MS" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid(&e.to_string()))?;
                self.delay = Duration::from_millis(ms);
            }
            "BENCH_SERIAL" => {
                let serial = value != "0" && !value.eq_ignore_ascii_case("false");
                self.concurrency = if serial {
                    Concurrency::Serial
                } else {
                    Concurrency::Concurrent
                };
            }
            "BENCH_RETRY_TIMING" => {
                self.retry_timing = match value.to_ascii_lowercase().as_str() {
                    "cumulative" => RetryTiming::Cumulative,
                    "per-attempt" => RetryTiming::PerAttempt,
                    _ => return Err(invalid("expected `cumulative` or `per-attempt`")),
                }
            }
            _ => return Err(invalid("unknown setting")),
        }
        Ok(())
    }

    /// Reject settings no suite can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy == Policy::Section {
            return Err(ConfigError::SectionPolicy);
        }
        Ok(())
    }

    /// Set the policy for bench entries.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the starting iteration count.
    pub fn iterations(mut self, n: u64) -> Self {
        self.iterations = n;
        self
    }

    /// Set the adaptive minimum duration.
    pub fn min_duration(mut self, d: Duration) -> Self {
        self.min_duration = d;
        self
    }

    /// Set the delay before each entry.
    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn concurrency(mut self, mode: Concurrency) -> Self {
        self.concurrency = mode;
        self
    }

    /// Shorthand for [`Concurrency::Serial`].
    pub fn serial(self) -> Self {
        self.concurrency(Concurrency::Serial)
    }

    pub fn retry_timing(mut self, timing: RetryTiming) -> Self {
        self.retry_timing = timing;
        self
    }
}

const ENV_VARS: [&str; 6] = [
    "BENCH_POLICY",
    "BENCH_ITERATIONS",
    "BENCH_MIN_TIME_MS",
    "BENCH_DELAY_MS",
    "BENCH_SERIAL",
    "BENCH_RETRY_TIMING",
];
