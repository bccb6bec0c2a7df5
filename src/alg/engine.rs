use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

use log::{debug, info};
use parking_lot::{Condvar, Mutex};

use crate::mrf::pairwise_mrf::PairwiseMarkovRandomField;

use super::{
    bp_update::{bp_update, SharedParams},
    residual_queue::ResidualQueue,
};

pub struct EngineOptions {
    num_workers: usize,
    initial_priority: f64,
    max_updates: Option<usize>,
    time_max: Duration,
}

impl EngineOptions {
    pub fn default() -> Self {
        EngineOptions {
            num_workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            initial_priority: 100.,
            max_updates: None,
            time_max: Duration::new(20 * 60, 0), // 20 minutes
        }
    }

    pub fn set_num_workers(&mut self, value: usize) -> &mut Self {
        assert!(value > 0, "Engine must have at least one worker.");
        self.num_workers = value;
        self
    }

    pub fn set_initial_priority(&mut self, value: f64) -> &mut Self {
        self.initial_priority = value;
        self
    }

    pub fn set_max_updates(&mut self, value: Option<usize>) -> &mut Self {
        self.max_updates = value;
        self
    }

    pub fn set_time_max(&mut self, value: Duration) -> &mut Self {
        self.time_max = value;
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn initial_priority(&self) -> f64 {
        self.initial_priority
    }

    pub fn max_updates(&self) -> Option<usize> {
        self.max_updates
    }

    pub fn time_max(&self) -> Duration {
        self.time_max
    }
}

// The outcome of a run. A non-converged run is a best-effort result, not an
// error: the current beliefs are still usable.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    pub num_updates: usize,
    pub elapsed: Duration,
    pub converged: bool,
}

impl RunStats {
    // Updates per second: the natural progress measure for an asynchronous,
    // per-vertex algorithm
    pub fn updates_per_second(&self) -> f64 {
        self.num_updates as f64 / self.elapsed.as_secs_f64()
    }
}

// The host engine for asynchronous residual belief propagation. Workers
// repeatedly dequeue the highest-priority pending vertex, run the update to
// completion, and feed its re-scheduling requests back into the queue.
// Vertices are serialized individually, non-adjacent vertices run fully
// concurrently, and adjacent vertices are kept consistent by the per-edge
// message double buffering.
pub struct ResidualEngine<'a> {
    mrf: &'a PairwiseMarkovRandomField,
    shared: &'a SharedParams,
    queue: Mutex<ResidualQueue>,
    task_available: Condvar,
    num_updates: AtomicUsize,
    aborted: AtomicBool,
}

impl<'a> ResidualEngine<'a> {
    pub fn new(mrf: &'a PairwiseMarkovRandomField, shared: &'a SharedParams) -> Self {
        assert!(
            mrf.is_finalized(),
            "Engine requires a finalized pairwise MRF."
        );
        ResidualEngine {
            mrf,
            shared,
            queue: Mutex::new(ResidualQueue::new(mrf.num_vertices())),
            task_available: Condvar::new(),
            num_updates: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
        }
    }

    // Requests execution of a single vertex with the given priority
    pub fn schedule(&self, vertex: usize, priority: f64) {
        self.queue.lock().schedule(vertex, priority);
        self.task_available.notify_one();
    }

    // Seeds every vertex with the same priority
    pub fn schedule_all(&self, priority: f64) {
        let mut queue = self.queue.lock();
        for vertex in 0..self.mrf.num_vertices() {
            queue.schedule(vertex, priority);
        }
        drop(queue);
        self.task_available.notify_all();
    }

    // Runs updates until no pending request exceeds the bound, or until an
    // externally imposed update/time cap interrupts the run
    pub fn run_until_converged(&self, options: &EngineOptions) -> RunStats {
        self.num_updates.store(0, Ordering::Relaxed);
        self.aborted.store(false, Ordering::Relaxed);
        self.schedule_all(options.initial_priority());

        let time_start = Instant::now();
        info!(
            "Running residual engine with {} workers over {} vertices",
            options.num_workers(),
            self.mrf.num_vertices()
        );

        thread::scope(|scope| {
            for _ in 0..options.num_workers() {
                scope.spawn(|| self.worker_loop(options, time_start));
            }
        });

        let stats = RunStats {
            num_updates: self.num_updates.load(Ordering::Relaxed),
            elapsed: time_start.elapsed(),
            converged: !self.aborted.load(Ordering::Relaxed),
        };
        if stats.converged {
            info!(
                "Engine converged in {:?}. Total updates: {}. Efficiency: {:.0} updates per second.",
                stats.elapsed,
                stats.num_updates,
                stats.updates_per_second()
            );
        } else {
            info!(
                "Engine interrupted after {:?} and {} updates; beliefs are best-effort.",
                stats.elapsed, stats.num_updates
            );
        }
        stats
    }

    fn worker_loop(&self, options: &EngineOptions, time_start: Instant) {
        let mut requests = Vec::with_capacity(4);
        while let Some((vertex, priority)) = self.next_task() {
            debug!("Updating vertex {} at priority {}", vertex, priority);
            requests.clear();
            bp_update(self.mrf, vertex, self.shared, &mut requests);

            let num_updates = self.num_updates.fetch_add(1, Ordering::Relaxed) + 1;
            let over_update_cap = options
                .max_updates()
                .is_some_and(|cap| num_updates >= cap);
            if over_update_cap || time_start.elapsed() >= options.time_max() {
                self.aborted.store(true, Ordering::Relaxed);
            }

            let mut queue = self.queue.lock();
            queue.complete(vertex);
            if !self.aborted.load(Ordering::Relaxed) {
                for &(neighbor, residual) in requests.iter() {
                    queue.schedule(neighbor, residual);
                }
            }
            drop(queue);
            self.task_available.notify_all();
        }
        // Wake any worker still waiting so it can observe termination
        self.task_available.notify_all();
    }

    // Blocks until a task is available, the computation converges, or the
    // run is aborted
    fn next_task(&self) -> Option<(usize, f64)> {
        let mut queue = self.queue.lock();
        loop {
            if self.aborted.load(Ordering::Relaxed) {
                return None;
            }
            if let Some(task) = queue.pop() {
                return Some(task);
            }
            if queue.num_running() == 0 {
                return None;
            }
            self.task_available.wait(&mut queue);
        }
    }
}
