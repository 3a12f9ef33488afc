//! End-to-end suite behaviour on a virtual clock.

use minibench::{
    Body, Clock, EntryKind, EventLoop, ManualClock, Next, Policy, Recorder, RetryTiming, Scheduler, Suite,
    SuiteConfig,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn event_loop() -> EventLoop<ManualClock> {
    EventLoop::new(ManualClock::new())
}

/// Records every event as a string, in arrival order.
fn event_log(suite: &Suite) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&log);
    suite.on_start(move |entries| sink.borrow_mut().push(format!("start:{}", entries.len())));
    let sink = Rc::clone(&log);
    suite.on_result(move |name, _| sink.borrow_mut().push(format!("result:{name}")));
    let sink = Rc::clone(&log);
    suite.on_section(move |name, _| sink.borrow_mut().push(format!("section:{name}")));
    let sink = Rc::clone(&log);
    suite.on_done(move |_| sink.borrow_mut().push("done".to_string()));

    log
}

/// A per-iteration body that defers its continuation by `delay` on `ev`.
fn deferred(ev: &EventLoop<ManualClock>, delay: Duration) -> Body {
    let ev = ev.clone();
    Body::per_iteration(move |next| {
        ev.schedule(delay, Box::new(move || next.done()));
    })
}

#[test]
fn fixed_policy_reports_configured_iterations() {
    let ev = event_loop();
    let config = SuiteConfig::new().policy(Policy::Fixed).iterations(100);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let recorder = Recorder::new();
    suite.reporter(recorder.clone());

    suite.bench_fn("sync", |next| next.done());
    suite.run();
    ev.run();

    let result = recorder.result();
    assert_eq!(result.get("sync").unwrap().stats.iterations, 100);
    assert!(result.is_done());
}

#[test]
fn serial_section_and_benches_complete_in_declaration_order() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(10)
        .serial();
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    suite
        .section_fn("section 1", |next| next.done())
        .bench("step 1", deferred(&ev, ms(50)))
        .bench_fn("step 2", |next| next.done());
    suite.run();
    ev.run();

    assert_eq!(
        *log.borrow(),
        vec![
            "start:3",
            "section:section 1",
            "result:step 1",
            "result:step 2",
            "done"
        ]
    );
}

#[test]
fn serial_order_holds_when_earlier_entries_are_slower() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(1)
        .delay(ms(5))
        .serial();
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    suite
        .bench("A", deferred(&ev, ms(300)))
        .bench("B", deferred(&ev, ms(100)))
        .bench("C", deferred(&ev, ms(1)));
    suite.run();
    ev.run();

    assert_eq!(
        *log.borrow(),
        vec!["start:3", "result:A", "result:B", "result:C", "done"]
    );
    // Three delays plus three bodies, one after another.
    assert_eq!(ev.clock().now(), ms(5 + 300 + 5 + 100 + 5 + 1));
}

#[test]
fn concurrent_zero_delay_dispatches_in_declaration_order() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(3)
        .delay(Duration::ZERO);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    suite
        .bench_fn("A", |next| next.done())
        .bench_fn("B", |next| next.done())
        .bench_fn("C", |next| next.done());
    suite.run();
    ev.run();

    assert_eq!(
        *log.borrow(),
        vec!["start:3", "result:A", "result:B", "result:C", "done"]
    );
}

#[test]
fn concurrent_mode_overlaps_deferred_entries() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(1)
        .delay(ms(10));
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    suite
        .bench("slow", deferred(&ev, ms(100)))
        .bench("fast", deferred(&ev, ms(20)));
    suite.run();
    ev.run();

    // Both dispatch at 10ms; completion order follows the bodies, not declaration.
    assert_eq!(
        *log.borrow(),
        vec!["start:2", "result:fast", "result:slow", "done"]
    );
    assert_eq!(ev.clock().now(), ms(110));
}

#[test]
fn done_fires_once_with_nothing_pending() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(4)
        .delay(ms(1));
    let suite = Suite::with_event_loop(config, &ev).unwrap();

    let done = Rc::new(Cell::new(0));
    let pending_at_done = Rc::new(Cell::new(usize::MAX));
    let (count, pending, handle) = (Rc::clone(&done), Rc::clone(&pending_at_done), suite.clone());
    suite.on_done(move |_| {
        count.set(count.get() + 1);
        pending.set(handle.pending());
    });

    for i in 0..6 {
        suite.bench(format!("bench {i}"), deferred(&ev, ms(i)));
    }
    suite.section_fn("mark", |next| next.done());
    suite.run();
    ev.run();

    assert_eq!(done.get(), 1);
    assert_eq!(pending_at_done.get(), 0);
}

#[test]
fn second_run_while_pending_is_ignored() {
    let ev = event_loop();
    let config = SuiteConfig::new().policy(Policy::Fixed).iterations(1);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    suite
        .bench("A", deferred(&ev, ms(20)))
        .bench("B", deferred(&ev, ms(20)));
    suite.run();
    assert_eq!(suite.pending(), 2);

    suite.run();
    assert_eq!(suite.pending(), 2);

    ev.run();
    let starts = log.borrow().iter().filter(|e| e.starts_with("start")).count();
    let dones = log.borrow().iter().filter(|e| *e == "done").count();
    assert_eq!((starts, dones), (1, 1));
}

#[test]
fn section_runs_once_regardless_of_iterations() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(1000)
        .delay(Duration::ZERO);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let recorder = Recorder::new();
    suite.reporter(recorder.clone());

    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    suite.section_fn("checkpoint", move |next| {
        counter.set(counter.get() + 1);
        next.done();
    });
    suite.run();
    ev.run();

    let result = recorder.result();
    assert_eq!(calls.get(), 1);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].kind, EntryKind::Section);
    assert_eq!(result.results[0].stats.iterations, 1);
}

#[test]
fn adaptive_bench_reaches_minimum_duration() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Adaptive)
        .iterations(1)
        .min_duration(ms(250))
        .delay(Duration::ZERO);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let recorder = Recorder::new();
    suite.reporter(recorder.clone());

    let clock = Rc::clone(ev.clock());
    suite.bench_fn("linear", move |next| {
        clock.advance(Duration::from_micros(300));
        next.done();
    });
    suite.run();
    ev.run();

    let stats = recorder.result().get("linear").unwrap().stats;
    assert!(stats.elapsed >= ms(250));
    assert!(stats.iterations > 1);
}

#[test]
fn per_attempt_retry_timing_reaches_suite_benches() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Adaptive)
        .iterations(10)
        .min_duration(ms(100))
        .delay(ms(10))
        .retry_timing(RetryTiming::PerAttempt);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let recorder = Recorder::new();
    suite.reporter(recorder.clone());

    let clock = Rc::clone(ev.clock());
    suite.bench_loop("one ms each", move |next, n| {
        clock.advance(ms(n));
        next.done();
    });
    suite.run();
    ev.run();

    // Attempts of 10, 90 and 900 iterations; only the last one is timed.
    let stats = recorder.result().get("one ms each").unwrap().stats;
    assert_eq!(stats.iterations, 900);
    assert_eq!(stats.elapsed, ms(900));
}

#[test]
fn adaptive_escalates_tenfold_while_elapsed_is_zero() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Adaptive)
        .iterations(3)
        .min_duration(ms(100))
        .delay(Duration::ZERO);
    let suite = Suite::with_event_loop(config, &ev).unwrap();

    let attempts = Rc::new(RefCell::new(Vec::new()));
    let (log, clock) = (Rc::clone(&attempts), Rc::clone(ev.clock()));
    suite.bench_loop("sub-resolution", move |next, n| {
        log.borrow_mut().push(n);
        if n >= 3000 {
            clock.advance(ms(150));
        }
        next.done();
    });
    suite.run();
    ev.run();

    assert_eq!(*attempts.borrow(), vec![3, 30, 300, 3000]);
}

#[test]
fn adaptive_retries_report_once() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Adaptive)
        .iterations(1)
        .min_duration(ms(50))
        .delay(Duration::ZERO);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    let clock = Rc::clone(ev.clock());
    suite.bench_loop("grow", move |next, n| {
        clock.advance(Duration::from_micros(100) * n as u32);
        next.done();
    });
    suite.run();
    ev.run();

    assert_eq!(*log.borrow(), vec!["start:1", "result:grow", "done"]);
}

#[test]
fn suite_reports_total_elapsed_since_run() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(1)
        .delay(ms(10))
        .serial();
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let recorder = Recorder::new();
    suite.reporter(recorder.clone());

    suite
        .bench("a", deferred(&ev, ms(40)))
        .bench("b", deferred(&ev, ms(40)));
    suite.run();
    ev.run();

    assert_eq!(recorder.result().total_elapsed, Some(ms(100)));
}

#[test]
fn suite_can_be_reused_after_repopulating() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(2)
        .delay(Duration::ZERO);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    suite.bench_fn("first", |next| next.done());
    suite.run();
    ev.run();

    suite.bench_fn("second", |next| next.done());
    suite.run();
    ev.run();

    assert_eq!(
        *log.borrow(),
        vec![
            "start:1",
            "result:first",
            "done",
            "start:1",
            "result:second",
            "done"
        ]
    );
}

#[test]
fn stalled_bench_blocks_serial_suite() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(1)
        .delay(Duration::ZERO)
        .serial();
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    suite
        .bench_fn("never", |_next| {})
        .bench_fn("after", |next| next.done());
    suite.run();
    ev.run();

    assert_eq!(*log.borrow(), vec!["start:2"]);
    assert_eq!(suite.pending(), 2);
}

#[test]
fn done_handler_may_start_another_run() {
    let ev = event_loop();
    let config = SuiteConfig::new().policy(Policy::Fixed).iterations(1);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    // Rerun once from inside `done`; the second run has nothing queued.
    let (sink, handle) = (Rc::clone(&log), suite.clone());
    let rerun = Cell::new(true);
    suite.on_done(move |_| {
        sink.borrow_mut().push("done".to_string());
        if rerun.replace(false) {
            handle.run();
        }
    });

    suite.bench_fn("only", |next| next.done());
    suite.run();
    ev.run();

    assert_eq!(
        *log.borrow(),
        vec!["start:1", "result:only", "done", "start:0", "done"]
    );
}

#[test]
fn result_raised_inside_result_handler_is_delivered() {
    let ev = event_loop();
    let config = SuiteConfig::new()
        .policy(Policy::Fixed)
        .iterations(1)
        .delay(Duration::ZERO);
    let suite = Suite::with_event_loop(config, &ev).unwrap();
    let log = event_log(&suite);

    let parked: Rc<RefCell<Option<Next>>> = Rc::new(RefCell::new(None));
    let (sink, release) = (Rc::clone(&log), Rc::clone(&parked));
    suite.on_result(move |name, _| {
        sink.borrow_mut().push(format!("result:{name}"));
        let next = release.borrow_mut().take();
        if let Some(next) = next {
            next.done();
        }
    });

    let park = Rc::clone(&parked);
    suite
        .bench_loop("parked", move |next, _| *park.borrow_mut() = Some(next))
        .bench_fn("fast", |next| next.done());
    suite.run();
    ev.run();

    assert_eq!(
        *log.borrow(),
        vec!["start:2", "result:fast", "result:parked", "done"]
    );
    assert!(!suite.is_running());
}
