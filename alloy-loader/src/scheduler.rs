//! Tick-synchronized scheduler backing the `Initializer`'s
//! `runLater`/`runPeriodic`/`runAsync` surface. Driven once per host tick by
//! [`alloy_bridge::Bridge::on_tick`]; without this, that bridge method would
//! have nothing to call.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_bridge::TickDriver;
use parking_lot::Mutex;

pub type Task = Box<dyn FnOnce() + Send>;
pub type PeriodicTask = Box<dyn FnMut() + Send>;

struct DelayedTask {
    run_at_tick: u64,
    task: Task,
}

struct PeriodicEntry {
    next_run_tick: u64,
    period_ticks: u64,
    task: PeriodicTask,
}

/// Runs entirely on the game thread except for `run_async`, which hands the
/// task to its own thread so it never blocks tick processing.
pub struct Scheduler {
    current_tick: AtomicU64,
    delayed: Mutex<Vec<DelayedTask>>,
    periodic: Mutex<Vec<PeriodicEntry>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            current_tick: AtomicU64::new(0),
            delayed: Mutex::new(Vec::new()),
            periodic: Mutex::new(Vec::new()),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Acquire)
    }

    pub fn run_later(&self, task: Task, delay_ticks: u64) {
        let run_at_tick = self.current_tick() + delay_ticks;
        self.delayed.lock().push(DelayedTask { run_at_tick, task });
    }

    pub fn run_periodic(&self, task: PeriodicTask, delay_ticks: u64, period_ticks: u64) {
        let next_run_tick = self.current_tick() + delay_ticks;
        self.periodic.lock().push(PeriodicEntry {
            next_run_tick,
            period_ticks: period_ticks.max(1),
            task,
        });
    }

    pub fn run_async(&self, task: Task) {
        std::thread::spawn(move || task());
    }
}

impl TickDriver for Scheduler {
    fn drive_tick(&self) {
        let tick = self.current_tick.fetch_add(1, Ordering::AcqRel) + 1;

        let due = {
            let mut delayed = self.delayed.lock();
            let (due, remaining) = delayed
                .drain(..)
                .partition::<Vec<_>, _>(|entry| entry.run_at_tick <= tick);
            *delayed = remaining;
            due
        };
        for entry in due {
            (entry.task)();
        }

        let mut periodic = self.periodic.lock();
        for entry in periodic.iter_mut() {
            if tick >= entry.next_run_tick {
                (entry.task)();
                entry.next_run_tick = tick + entry.period_ticks;
            }
        }
    }
}
