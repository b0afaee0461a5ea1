//! The worker pool that executes a single trial.
//!
//! [`run_workers`] spawns one OS thread per unit of concurrency. Workers claim work items from a
//! shared countdown counter until it is exhausted, each one timing its own span. The trial
//! duration is the sum of all spans divided by the concurrency, i.e. the average time a worker
//! spent, not the makespan of the trial.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::TransferError;

/// Aggregated outcome of one worker pool run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Sum of all per-worker spans divided by the number of workers.
    pub duration: Duration,
    /// Whether any worker observed a failure.
    pub failure_observed: bool,
}

/// Shared countdown counter distributing work items among workers.
///
/// Every value from the initial count down to `1` is handed out exactly once.
#[derive(Debug)]
struct Countdown(AtomicI64);

impl Countdown {
    fn new(count: usize) -> Self {
        Self(AtomicI64::new(count as i64))
    }

    /// Claims the next work item, returning its index or `None` when the work is exhausted.
    fn claim(&self) -> Option<usize> {
        let previous = self.0.fetch_sub(1, Ordering::AcqRel);
        (previous > 0).then_some(previous as usize)
    }
}

/// Runs `num_items` work items on `concurrency` worker threads.
///
/// `init` is called once per worker, on the worker thread and before its clock starts, to create
/// private per-worker state. `attempt` performs the work item with the given index, which ranges
/// from `num_items` down to `1`.
///
/// A worker stops at its first error; the remaining workers carry on until the counter is
/// exhausted or they fail themselves. A worker whose `init` fails claims nothing and contributes
/// no time. Panicking workers are treated like failing ones.
pub fn run_workers<S, I, F>(
    concurrency: usize,
    num_items: usize,
    init: I,
    attempt: F,
) -> PoolOutcome
where
    I: Fn(usize) -> Result<S, TransferError> + Sync,
    F: Fn(&mut S, usize) -> Result<(), TransferError> + Sync,
{
    let concurrency = concurrency.max(1);
    let counter = Countdown::new(num_items);
    let failure_observed = AtomicBool::new(false);
    let total_nanos = AtomicU64::new(0);

    let worker = |worker_id: usize| {
        let mut state = match init(worker_id) {
            Ok(state) => state,
            Err(error) => {
                failure_observed.store(true, Ordering::Relaxed);
                tracing::debug!(
                    error = &error as &dyn std::error::Error,
                    worker_id,
                    "failed to prepare worker"
                );
                return;
            }
        };

        let start = Instant::now();
        while let Some(index) = counter.claim() {
            if let Err(error) = attempt(&mut state, index) {
                failure_observed.store(true, Ordering::Relaxed);
                tracing::debug!(
                    error = &error as &dyn std::error::Error,
                    worker_id,
                    index,
                    "transfer failed"
                );
                break;
            }
        }

        let elapsed = start.elapsed().as_nanos() as u64;
        total_nanos.fetch_add(elapsed, Ordering::Relaxed);
    };

    thread::scope(|scope| {
        let handles: Vec<_> = (0..concurrency)
            .filter_map(|worker_id| {
                let worker = &worker;
                let spawned = thread::Builder::new()
                    .name(format!("worker-{worker_id}"))
                    .spawn_scoped(scope, move || worker(worker_id));

                match spawned {
                    Ok(handle) => Some(handle),
                    Err(error) => {
                        tracing::error!(
                            error = &error as &dyn std::error::Error,
                            worker_id,
                            "failed to spawn worker thread"
                        );
                        failure_observed.store(true, Ordering::Relaxed);
                        None
                    }
                }
            })
            .collect();

        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
                failure_observed.store(true, Ordering::Relaxed);
            }
        }
    });

    let total = Duration::from_nanos(total_nanos.into_inner());
    PoolOutcome {
        duration: total / concurrency as u32,
        failure_observed: failure_observed.into_inner(),
    }
}
