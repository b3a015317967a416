//! Cooperative work pumps.
//!
//! Indexing work is split into small slices. A component that has work pending calls
//! [`Scheduler::schedule`]; whoever owns the scheduler later drives the component (a [`Job`])
//! one slice at a time until it reports that nothing is left. There are no threads here: a
//! scheduler only remembers that work was requested.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Work that can be done in slices.
pub trait Job {
    /// Does one slice of work. Returns `true` iff there is more work to do.
    ///
    /// Slices should be short (a few milliseconds) and leave every index consistent, since any
    /// slice may be the last one to run.
    fn do_work(&mut self) -> bool;

    /// Called after a batch of slices, when no more work will run synchronously.
    fn done_work(&mut self) {}
}

/// Requests and cancels deferred work.
pub trait Scheduler {
    /// There is more work to do; arrange for the job to be driven later. Idempotent.
    fn schedule(&self);

    /// The pending work is no longer needed. Idempotent and safe without pending work.
    fn cancel(&self);

    /// Whether work is currently scheduled.
    fn is_scheduled(&self) -> bool;
}

/// Scheduler driven explicitly by its owner, mostly for tests and headless use.
#[derive(Debug, Default)]
pub struct SyncScheduler {
    scheduled: Cell<bool>,
}

impl SyncScheduler {
    /// Create a scheduler with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs slices of `job` while work stays scheduled. Returns the number of slices run.
    pub fn run_until_idle(&self, job: &mut dyn Job) -> usize {
        let mut slices = 0;
        while self.scheduled.get() {
            slices += 1;
            if !job.do_work() {
                self.scheduled.set(false);
            }
        }
        if slices > 0 {
            job.done_work();
        }
        slices
    }
}

impl Scheduler for SyncScheduler {
    fn schedule(&self) {
        self.scheduled.set(true);
    }

    fn cancel(&self) {
        self.scheduled.set(false);
    }

    fn is_scheduled(&self) -> bool {
        self.scheduled.get()
    }
}

/// Default time budget of one idle period.
pub const DEFAULT_IDLE_BUDGET: Duration = Duration::from_millis(5);

/// Scheduler driven from an event loop's idle hook, running slices for a bounded time.
#[derive(Debug)]
pub struct IdleScheduler {
    scheduled: Cell<bool>,
    budget: Duration,
}

impl Default for IdleScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleScheduler {
    /// Create a scheduler with the default idle budget.
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_IDLE_BUDGET)
    }

    /// Create a scheduler with a custom idle budget.
    pub fn with_budget(budget: Duration) -> Self {
        Self {
            scheduled: Cell::new(false),
            budget,
        }
    }

    /// Idle budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Called by the event loop when idle. Runs at least one slice, then keeps going until the
    /// budget is spent or the job runs out of work, and reschedules itself if work remains.
    ///
    /// Returns the number of slices run.
    pub fn run_idle(&self, job: &mut dyn Job) -> usize {
        self.run_until(job, Some(Instant::now() + self.budget))
    }

    /// Like [`run_idle`](Self::run_idle) when the idle callback timed out: runs exactly one
    /// slice.
    pub fn run_overdue(&self, job: &mut dyn Job) -> usize {
        self.run_until(job, None)
    }

    fn run_until(&self, job: &mut dyn Job, deadline: Option<Instant>) -> usize {
        if !self.scheduled.replace(false) {
            return 0;
        }
        let mut slices = 0;
        let mut has_more_work;
        loop {
            slices += 1;
            has_more_work = job.do_work();
            if !has_more_work || deadline.is_none_or(|deadline| Instant::now() >= deadline) {
                break;
            }
        }
        job.done_work();
        tracing::trace!(slices, has_more_work, "idle work slice batch");
        if has_more_work {
            self.schedule();
        }
        slices
    }
}

impl Scheduler for IdleScheduler {
    fn schedule(&self) {
        self.scheduled.set(true);
    }

    fn cancel(&self) {
        self.scheduled.set(false);
    }

    fn is_scheduled(&self) -> bool {
        self.scheduled.get()
    }
}
