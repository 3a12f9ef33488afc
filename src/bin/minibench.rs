//! minibench: run the built-in demonstration suite.
//!
//! Settings start from the `BENCH_*` environment variables (see
//! `SuiteConfig::from_env`) and are then overridden by command-line flags.
//!
//! ```text
//! minibench                           # adaptive, 100ms minimum, 100ms delay
//! minibench --policy fixed -n 1000    # exactly 1000 iterations per bench
//! minibench --serial --delay-ms 0     # one entry at a time, no gaps
//! minibench --json > results.json     # machine-readable results on stdout
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use minibench::{
    Concurrency, ConsoleReporter, EventLoop, MultiReporter, Next, Policy, Recorder, Reporter,
    Scheduler, Suite, SuiteConfig, SystemClock,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Fixed,
    Adaptive,
}

impl From<PolicyArg> for Policy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Fixed => Policy::Fixed,
            PolicyArg::Adaptive => Policy::Adaptive,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "minibench", about = "Run the minibench demonstration suite")]
struct Args {
    /// Iteration policy for benches
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Starting iteration count
    #[arg(long, short = 'n')]
    iterations: Option<u64>,

    /// Minimum run time per bench in milliseconds (adaptive only)
    #[arg(long)]
    min_time_ms: Option<u64>,

    /// Delay before each entry in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Run entries one at a time in declaration order
    #[arg(long)]
    serial: bool,

    /// Print results as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output (debug logging)
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Quiet mode (no console report, warnings only)
    #[arg(long, short = 'q')]
    quiet: bool,
}

impl Args {
    fn config(&self) -> Result<SuiteConfig> {
        let mut cfg = SuiteConfig::from_env();
        if let Some(p) = self.policy {
            cfg.policy = p.into();
        }
        if let Some(n) = self.iterations {
            if n == 0 {
                bail!("--iterations must be at least 1");
            }
            cfg.iterations = n;
        }
        if let Some(ms) = self.min_time_ms {
            cfg.min_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = self.delay_ms {
            cfg.delay = Duration::from_millis(ms);
        }
        if self.serial {
            cfg.concurrency = Concurrency::Serial;
        }
        cfg.validate().context("invalid suite configuration")?;
        Ok(cfg)
    }

    fn log_filter(&self) -> EnvFilter {
        let default = if self.quiet {
            "warn"
        } else if self.verbose {
            "minibench=debug"
        } else {
            "info"
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    }
}

// ============================================================================
// Demo Suite
// ============================================================================

fn populate(suite: &Suite, ev: &EventLoop<SystemClock>) {
    let data: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));

    let fill = Rc::clone(&data);
    suite.section_fn("prepare data", move |next| {
        *fill.borrow_mut() = (0..4096).collect();
        next.done();
    });

    suite.bench_fn("vec push 64", |next| {
        let mut v = Vec::with_capacity(64);
        for i in 0..64u64 {
            v.push(i);
        }
        std::hint::black_box(&v);
        next.done();
    });

    let input = Rc::clone(&data);
    suite.bench_loop("sum 4096", move |next, n| {
        let data = input.borrow();
        for _ in 0..n {
            let total: u64 = data.iter().sum();
            std::hint::black_box(total);
        }
        next.done();
    });

    let timers = ev.clone();
    suite.bench_loop("timer roundtrip", move |next, n| {
        // Hop through the event loop n times before signalling.
        fn hop(ev: EventLoop<SystemClock>, left: u64, next: Next) {
            if left == 0 {
                next.done();
                return;
            }
            let again = ev.clone();
            ev.schedule(Duration::ZERO, Box::new(move || hop(again, left - 1, next)));
        }
        hop(timers.clone(), n, next);
    });
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .with_writer(std::io::stderr)
        .init();

    let config = args.config()?;
    let ev = EventLoop::new(SystemClock::new());
    let suite = Suite::with_event_loop(config, &ev).context("failed to create suite")?;

    let recorder = Recorder::new();
    let mut reporters: Vec<Box<dyn Reporter>> = vec![Box::new(recorder.clone())];
    if !args.quiet {
        reporters.push(Box::new(ConsoleReporter::new()));
    }
    suite.reporter(MultiReporter::new(reporters));

    populate(&suite, &ev);
    suite.run();
    ev.run();

    let result = recorder.result();
    if !result.is_done() {
        bail!("suite stopped before every entry completed");
    }
    if args.json {
        println!("{}", result.to_json().context("failed to encode results")?);
    }
    Ok(())
}
