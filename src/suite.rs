//! Suite scheduler: sequences entries and funnels their completions.

use crate::clock::Clock;
use crate::config::{Concurrency, SuiteConfig};
use crate::entry::{Body, Entry, Next, Policy, Stats};
use crate::error::ConfigError;
use crate::report::Reporter;
use crate::timer::{EventLoop, Scheduler};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type StartHandler = Box<dyn FnMut(&[Rc<Entry>])>;
pub type ResultHandler = Box<dyn FnMut(&str, &Stats)>;
pub type SectionHandler = Box<dyn FnMut(&str, &Stats)>;
pub type DoneHandler = Box<dyn FnMut(Duration)>;

/// Optional event handlers. An empty slot means the event is dropped.
#[derive(Default)]
pub struct Handlers {
    pub start: Option<StartHandler>,
    pub result: Option<ResultHandler>,
    pub section: Option<SectionHandler>,
    pub done: Option<DoneHandler>,
}

impl Handlers {
    fn start_slot(&mut self) -> &mut Option<StartHandler> {
        &mut self.start
    }

    fn result_slot(&mut self) -> &mut Option<ResultHandler> {
        &mut self.result
    }

    fn section_slot(&mut self) -> &mut Option<SectionHandler> {
        &mut self.section
    }

    fn done_slot(&mut self) -> &mut Option<DoneHandler> {
        &mut self.done
    }
}

/// An event waiting for delivery to its handler slot.
enum Event {
    Start(Vec<Rc<Entry>>),
    Result(String, Stats),
    Section(String, Stats),
    Done(Duration),
}

#[derive(Default)]
struct RunState {
    /// Entries of the current run in declaration order.
    entries: Vec<Rc<Entry>>,
    /// Index of the next entry to dispatch.
    cursor: usize,
    /// Entries dispatched or waiting that have not completed.
    pending: usize,
    started_at: Duration,
}

struct Inner {
    config: SuiteConfig,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    handlers: RefCell<Handlers>,
    /// Events raised while a handler is running, delivered in order after it returns.
    events: RefCell<VecDeque<Event>>,
    delivering: Cell<bool>,
    queued: RefCell<Vec<Rc<Entry>>>,
    state: RefCell<RunState>,
}

/// An ordered set of benchmarks and sections run on a shared scheduler.
///
/// `Suite` is a cheap handle; clones drive the same suite.
///
/// # Example
///
/// ```rust
/// use minibench::{EventLoop, ManualClock, Policy, Suite, SuiteConfig};
///
/// let ev = EventLoop::new(ManualClock::new());
/// let config = SuiteConfig::new().policy(Policy::Fixed).iterations(100);
/// let suite = Suite::with_event_loop(config, &ev).unwrap();
///
/// suite
///     .on_result(|name, stats| println!("{name}: {} iterations", stats.iterations))
///     .on_done(|total| println!("done in {total:?}"))
///     .bench_fn("noop", |next| next.done());
///
/// suite.run();
/// ev.run();
/// ```
#[derive(Clone)]
pub struct Suite {
    inner: Rc<Inner>,
}

impl Suite {
    pub fn new(
        config: SuiteConfig,
        scheduler: Rc<dyn Scheduler>,
        clock: Rc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Rc::new(Inner {
                config,
                scheduler,
                clock,
                handlers: RefCell::new(Handlers::default()),
                events: RefCell::new(VecDeque::new()),
                delivering: Cell::new(false),
                queued: RefCell::new(Vec::new()),
                state: RefCell::new(RunState::default()),
            }),
        })
    }

    /// Create a suite dispatching on `ev` and measuring with its clock.
    pub fn with_event_loop<C: Clock + 'static>(
        config: SuiteConfig,
        ev: &EventLoop<C>,
    ) -> Result<Self, ConfigError> {
        let clock: Rc<dyn Clock> = Rc::clone(ev.clock()) as Rc<dyn Clock>;
        Self::new(config, Rc::new(ev.clone()), clock)
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.inner.config
    }

    /// Append a measured entry using the suite policy.
    pub fn bench(&self, name: impl Into<String>, body: Body) -> &Self {
        let config = &self.inner.config;
        let entry = Entry::new(name, config.policy, body, Rc::clone(&self.inner.clock))
            .min_duration(config.min_duration)
            .retry_timing(config.retry_timing);
        self.inner.queued.borrow_mut().push(Rc::new(entry));
        self
    }

    /// Append a bench whose function is called once per iteration.
    pub fn bench_fn(&self, name: impl Into<String>, f: impl Fn(Next) + 'static) -> &Self {
        self.bench(name, Body::per_iteration(f))
    }

    /// Append a bench whose function loops over the given count itself.
    pub fn bench_loop(&self, name: impl Into<String>, f: impl Fn(Next, u64) + 'static) -> &Self {
        self.bench(name, Body::self_looping(f))
    }

    /// Append a checkpoint step that runs exactly once.
    pub fn section(&self, name: impl Into<String>, body: Body) -> &Self {
        let entry = Entry::new(name, Policy::Section, body, Rc::clone(&self.inner.clock));
        self.inner.queued.borrow_mut().push(Rc::new(entry));
        self
    }

    pub fn section_fn(&self, name: impl Into<String>, f: impl Fn(Next) + 'static) -> &Self {
        self.section(name, Body::per_iteration(f))
    }

    pub fn on_start(&self, f: impl FnMut(&[Rc<Entry>]) + 'static) -> &Self {
        self.inner.handlers.borrow_mut().start = Some(Box::new(f));
        self
    }

    pub fn on_result(&self, f: impl FnMut(&str, &Stats) + 'static) -> &Self {
        self.inner.handlers.borrow_mut().result = Some(Box::new(f));
        self
    }

    pub fn on_section(&self, f: impl FnMut(&str, &Stats) + 'static) -> &Self {
        self.inner.handlers.borrow_mut().section = Some(Box::new(f));
        self
    }

    pub fn on_done(&self, f: impl FnMut(Duration) + 'static) -> &Self {
        self.inner.handlers.borrow_mut().done = Some(Box::new(f));
        self
    }

    /// Replace every handler slot at once.
    pub fn handlers(&self, handlers: Handlers) -> &Self {
        *self.inner.handlers.borrow_mut() = handlers;
        self
    }

    /// Route every event to `reporter`, replacing the current handlers.
    pub fn reporter<R: Reporter + 'static>(&self, reporter: R) -> &Self {
        let reporter = Rc::new(reporter);
        let r = Rc::clone(&reporter);
        self.on_start(move |entries| r.suite_start(entries));
        let r = Rc::clone(&reporter);
        self.on_result(move |name, stats| r.bench_end(name, stats));
        let r = Rc::clone(&reporter);
        self.on_section(move |name, stats| r.section_end(name, stats));
        self.on_done(move |total| reporter.suite_end(total));
        self
    }

    /// Entries appended since the last `run()`.
    pub fn queued(&self) -> usize {
        self.inner.queued.borrow().len()
    }

    /// Entries of the current run that have not completed.
    pub fn pending(&self) -> usize {
        self.inner.state.borrow().pending
    }

    pub fn is_running(&self) -> bool {
        self.pending() > 0
    }

    /// Start every queued entry.
    ///
    /// Ignored while a previous run still has pending entries. The queue is
    /// drained: entries appended later belong to the next run.
    pub fn run(&self) {
        if self.is_running() {
            debug!(pending = self.pending(), "run already in progress, ignoring");
            return;
        }

        let entries = std::mem::take(&mut *self.inner.queued.borrow_mut());
        let count = entries.len();
        {
            let mut state = self.inner.state.borrow_mut();
            state.entries = entries.clone();
            state.cursor = 0;
            state.pending = count;
        }

        info!(entries = count, concurrency = ?self.inner.config.concurrency, "suite started");
        self.emit(Event::Start(entries));
        self.inner.state.borrow_mut().started_at = self.inner.clock.now();

        if count == 0 {
            self.finish();
            return;
        }

        match self.inner.config.concurrency {
            Concurrency::Serial => self.dispatch_next(),
            Concurrency::Concurrent => {
                for _ in 0..count {
                    self.dispatch_next();
                }
            }
        }
    }

    fn dispatch_next(&self) {
        let suite = self.clone();
        self.inner
            .scheduler
            .schedule(self.inner.config.delay, Box::new(move || suite.start_next()));
    }

    fn start_next(&self) {
        let entry = {
            let mut state = self.inner.state.borrow_mut();
            let entry = state.entries.get(state.cursor).cloned();
            if entry.is_some() {
                state.cursor += 1;
            }
            entry
        };
        let Some(entry) = entry else {
            warn!("dispatch fired with no entry left to run");
            return;
        };

        debug!(entry = entry.id(), policy = ?entry.policy(), "dispatching");
        let suite = self.clone();
        let finished = Rc::clone(&entry);
        entry.run(self.inner.config.iterations, move |stats| {
            suite.complete(&finished, &stats)
        });
    }

    fn complete(&self, entry: &Entry, stats: &Stats) {
        debug!(
            entry = entry.id(),
            iterations = stats.iterations,
            elapsed_us = stats.elapsed.as_micros() as u64,
            "entry complete"
        );
        let name = entry.id().to_string();
        if entry.policy() == Policy::Section {
            self.emit(Event::Section(name, *stats));
        } else {
            self.emit(Event::Result(name, *stats));
        }
        self.check();
    }

    /// Count one completion; arm the next serial entry or finish the run.
    fn check(&self) {
        let remaining = {
            let mut state = self.inner.state.borrow_mut();
            if state.pending == 0 {
                warn!("completion reported with no entry pending");
                return;
            }
            state.pending -= 1;
            state.pending
        };

        if remaining > 0 {
            if self.inner.config.concurrency == Concurrency::Serial {
                self.dispatch_next();
            }
            return;
        }
        self.finish();
    }

    fn finish(&self) {
        let total = {
            let mut state = self.inner.state.borrow_mut();
            state.entries.clear();
            state.cursor = 0;
            self.inner.clock.now().saturating_sub(state.started_at)
        };
        info!(total_ms = total.as_millis() as u64, "suite done");
        self.emit(Event::Done(total));
    }

    /// Queue `event` and deliver every queued event unless a handler is already
    /// running, in which case that outer delivery picks it up once it returns.
    fn emit(&self, event: Event) {
        self.inner.events.borrow_mut().push_back(event);
        if self.inner.delivering.replace(true) {
            return;
        }
        let _delivering = Delivering(&self.inner.delivering);
        loop {
            let next = self.inner.events.borrow_mut().pop_front();
            let Some(event) = next else { break };
            match event {
                Event::Start(entries) => {
                    self.deliver(Handlers::start_slot, |h| h(entries.as_slice()))
                }
                Event::Result(name, stats) => {
                    self.deliver(Handlers::result_slot, |h| h(name.as_str(), &stats))
                }
                Event::Section(name, stats) => {
                    self.deliver(Handlers::section_slot, |h| h(name.as_str(), &stats))
                }
                Event::Done(total) => self.deliver(Handlers::done_slot, |h| h(total)),
            }
        }
    }

    /// Invoke the handler in `slot`, if any.
    ///
    /// The handler is taken out for the call so it may use the suite, and is put
    /// back unless it installed a replacement.
    fn deliver<H: ?Sized>(
        &self,
        slot: fn(&mut Handlers) -> &mut Option<Box<H>>,
        call: impl FnOnce(&mut H),
    ) {
        let handler = slot(&mut self.inner.handlers.borrow_mut()).take();
        if let Some(mut handler) = handler {
            call(&mut *handler);
            let mut handlers = self.inner.handlers.borrow_mut();
            let slot = slot(&mut handlers);
            if slot.is_none() {
                *slot = Some(handler);
            }
        }
    }
}

/// Clears the delivery flag on drop, including when a handler unwinds.
struct Delivering<'a>(&'a Cell<bool>);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
