//! Serializable records of a suite run.

use crate::entry::Stats;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a result came from a bench or a section step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Bench,
    Section,
}

/// Result of a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryResult {
    pub name: String,
    pub kind: EntryKind,
    pub stats: Stats,
}

impl EntryResult {
    /// Iterations per second, `None` for sections and unmeasurable runs.
    pub fn ops_per_sec(&self) -> Option<f64> {
        match self.kind {
            EntryKind::Bench => self.stats.ops_per_sec(),
            EntryKind::Section => None,
        }
    }
}

/// Results of one suite run, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub results: Vec<EntryResult>,
    /// Wall time from `run()` to the last completion. `None` until the run is done.
    #[serde(default, with = "option_duration_serde")]
    pub total_elapsed: Option<Duration>,
}

impl SuiteResult {
    /// Look up a result by entry name.
    pub fn get(&self, name: &str) -> Option<&EntryResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Bench results only, sections skipped.
    pub fn benches(&self) -> impl Iterator<Item = &EntryResult> {
        self.results.iter().filter(|r| r.kind == EntryKind::Bench)
    }

    pub fn is_done(&self) -> bool {
        self.total_elapsed.is_some()
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_nanos().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u128::deserialize(d)?;
        from_nanos(nanos).map_err(serde::de::Error::custom)
    }

    /// Durations are decoded as `u64` nanoseconds; anything wider is rejected.
    pub fn from_nanos(nanos: u128) -> Result<Duration, String> {
        u64::try_from(nanos)
            .map(Duration::from_nanos)
            .map_err(|_| format!("duration of {nanos}ns does not fit in u64 nanoseconds"))
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        d.map(|d| d.as_nanos()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u128>::deserialize(d)?
            .map(super::duration_serde::from_nanos)
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
