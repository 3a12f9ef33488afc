//! Pluggable reporters for suite events.

use crate::entry::{Entry, Stats};
use crate::result::{EntryKind, EntryResult, SuiteResult};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Receives suite events. Install with [`Suite::reporter`](crate::Suite::reporter).
pub trait Reporter {
    /// Called when a run starts, with the entries it will execute.
    fn suite_start(&self, _entries: &[Rc<Entry>]) {}

    /// Called when a bench completes.
    fn bench_end(&self, _name: &str, _stats: &Stats) {}

    /// Called when a section completes.
    fn section_end(&self, _name: &str, _stats: &Stats) {}

    /// Called once when every entry of the run has completed.
    fn suite_end(&self, _total: Duration) {}
}

/// Console reporter that prints results to stderr.
pub struct ConsoleReporter {
    show_per_iteration: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            show_per_iteration: true,
        }
    }

    /// Show mean time per iteration next to the throughput.
    pub fn show_per_iteration(mut self, show: bool) -> Self {
        self.show_per_iteration = show;
        self
    }

    fn format_duration(d: Duration) -> String {
        if d.as_secs() > 0 {
            format!("{:.2}s", d.as_secs_f64())
        } else if d.as_millis() > 0 {
            format!("{:.2}ms", d.as_secs_f64() * 1000.0)
        } else if d.as_micros() > 0 {
            format!("{:.2}µs", d.as_secs_f64() * 1_000_000.0)
        } else {
            format!("{}ns", d.as_nanos())
        }
    }

    fn format_throughput(stats: &Stats) -> String {
        match stats.ops_per_sec() {
            Some(ops) if ops > 1_000_000.0 => format!("{:.2}M ops/s", ops / 1_000_000.0),
            Some(ops) if ops > 1000.0 => format!("{:.2}K ops/s", ops / 1000.0),
            Some(ops) => format!("{:.0} ops/s", ops),
            None => "-- ops/s".to_string(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn suite_start(&self, entries: &[Rc<Entry>]) {
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("  Running {} entries", entries.len());
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    fn bench_end(&self, name: &str, stats: &Stats) {
        let mut line = format!(
            "  {:<32} {:>12}  {:>10} iters in {}",
            name,
            Self::format_throughput(stats),
            stats.iterations,
            Self::format_duration(stats.elapsed)
        );
        if self.show_per_iteration {
            line.push_str(&format!(
                " ({}/iter)",
                Self::format_duration(stats.per_iteration())
            ));
        }
        eprintln!("{}", line);
    }

    fn section_end(&self, name: &str, stats: &Stats) {
        eprintln!("  ── {} ({})", name, Self::format_duration(stats.elapsed));
    }

    fn suite_end(&self, total: Duration) {
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("  Completed in {}", Self::format_duration(total));
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

/// Collects every event into a [`SuiteResult`].
///
/// Clones share the same record, so keep one and hand another to the suite.
#[derive(Clone, Default)]
pub struct Recorder {
    record: Rc<RefCell<SuiteResult>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn result(&self) -> SuiteResult {
        self.record.borrow().clone()
    }

    fn push(&self, name: &str, kind: EntryKind, stats: &Stats) {
        self.record.borrow_mut().results.push(EntryResult {
            name: name.to_string(),
            kind,
            stats: *stats,
        });
    }
}

impl Reporter for Recorder {
    fn suite_start(&self, _entries: &[Rc<Entry>]) {
        *self.record.borrow_mut() = SuiteResult::default();
    }

    fn bench_end(&self, name: &str, stats: &Stats) {
        self.push(name, EntryKind::Bench, stats);
    }

    fn section_end(&self, name: &str, stats: &Stats) {
        self.push(name, EntryKind::Section, stats);
    }

    fn suite_end(&self, total: Duration) {
        self.record.borrow_mut().total_elapsed = Some(total);
    }
}

/// Combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn suite_start(&self, entries: &[Rc<Entry>]) {
        for r in &self.reporters {
            r.suite_start(entries);
        }
    }

    fn bench_end(&self, name: &str, stats: &Stats) {
        for r in &self.reporters {
            r.bench_end(name, stats);
        }
    }

    fn section_end(&self, name: &str, stats: &Stats) {
        for r in &self.reporters {
            r.section_end(name, stats);
        }
    }

    fn suite_end(&self, total: Duration) {
        for r in &self.reporters {
            r.suite_end(total);
        }
    }
}
