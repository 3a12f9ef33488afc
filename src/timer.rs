//! Delayed dispatch on a single cooperative timeline.

use crate::clock::Clock;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;

/// A callback armed on a [`Scheduler`].
pub type Task = Box<dyn FnOnce()>;

/// Delayed-dispatch primitive.
///
/// `schedule` fires `task` exactly once, no earlier than `delay` after the call.
/// Callbacks armed for the same instant fire in the order they were armed.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task);
}

struct Timer {
    due: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed: BinaryHeap is a max-heap and the earliest timer must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner<C> {
    clock: Rc<C>,
    queue: RefCell<BinaryHeap<Timer>>,
    next_seq: Cell<u64>,
}

/// Single-threaded timer queue driving every scheduled callback.
///
/// Cloning yields another handle to the same queue, so benchmark bodies can
/// capture a handle and defer their own continuations.
///
/// # Example
///
/// ```rust
/// use minibench::{EventLoop, ManualClock, Scheduler};
/// use std::time::Duration;
///
/// let ev = EventLoop::new(ManualClock::new());
/// ev.schedule(Duration::from_millis(20), Box::new(|| println!("second")));
/// ev.schedule(Duration::from_millis(10), Box::new(|| println!("first")));
/// assert_eq!(ev.run(), 2);
/// ```
pub struct EventLoop<C: Clock> {
    inner: Rc<Inner<C>>,
}

impl<C: Clock> Clone for EventLoop<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Clock> EventLoop<C> {
    pub fn new(clock: C) -> Self {
        Self {
            inner: Rc::new(Inner {
                clock: Rc::new(clock),
                queue: RefCell::new(BinaryHeap::new()),
                next_seq: Cell::new(0),
            }),
        }
    }

    /// The clock this loop waits on.
    pub fn clock(&self) -> &Rc<C> {
        &self.inner.clock
    }

    /// Number of armed, not yet fired callbacks.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Fire the earliest armed callback, waiting for its due time first.
    ///
    /// Returns `false` when nothing was armed.
    pub fn turn(&self) -> bool {
        // The borrow must end before the task runs: tasks arm new timers.
        let timer = self.inner.queue.borrow_mut().pop();
        match timer {
            Some(timer) => {
                self.inner.clock.wait_until(timer.due);
                (timer.task)();
                true
            }
            None => false,
        }
    }

    /// Fire callbacks until none are armed, including those armed along the way.
    ///
    /// Returns how many callbacks ran.
    pub fn run(&self) -> usize {
        let mut fired = 0;
        while self.turn() {
            fired += 1;
        }
        tracing::trace!(fired, "event loop idle");
        fired
    }
}

impl<C: Clock> Scheduler for EventLoop<C> {
    fn schedule(&self, delay: Duration, task: Task) {
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);
        let due = self.inner.clock.now() + delay;
        self.inner.queue.borrow_mut().push(Timer { due, seq, task });
    }
}
