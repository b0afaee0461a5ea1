//! Builds the benchmark matrix and runs every trial until it succeeds.
//!
//! Trials run strictly one after another; all concurrency lives inside a trial. The order of
//! trials is shuffled once up front so that slow drifts of the backend do not systematically
//! favor one transport. A failed attempt is retried after a cooldown, forever, so a broken
//! combination shows up as a stream of warnings instead of a silent gap in the results.

use std::fmt;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::case::{SharedCase, TransferConfig};
use crate::report::{RecordSink, TrialRecord};
use crate::transport::SharedTransport;

/// One entry of the benchmark matrix.
#[derive(Clone, Debug)]
pub struct BenchmarkCase {
    pub config: TransferConfig,
    pub transport: SharedTransport,
    pub case: SharedCase,
}

impl fmt::Display for BenchmarkCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.transport.name(),
            self.case.name(),
            self.config
        )
    }
}

/// Builds the Cartesian product of configurations, transports and cases.
///
/// Configurations vary slowest, cases fastest.
pub fn matrix(
    configs: &[TransferConfig],
    transports: &[SharedTransport],
    cases: &[SharedCase],
) -> Vec<BenchmarkCase> {
    let mut entries = Vec::with_capacity(configs.len() * transports.len() * cases.len());
    for config in configs {
        for transport in transports {
            for case in cases {
                entries.push(BenchmarkCase {
                    config: *config,
                    transport: SharedTransport::clone(transport),
                    case: SharedCase::clone(case),
                });
            }
        }
    }
    entries
}

/// One scheduled repetition of a matrix entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScheduledTrial {
    /// Index into the benchmark matrix.
    pub entry: usize,
    /// Repetition number, starting at `0`.
    pub repetition: usize,
}

/// Schedules every entry `repeat` times, in matrix order.
pub fn schedule(num_entries: usize, repeat: usize) -> Vec<ScheduledTrial> {
    (0..repeat)
        .flat_map(|repetition| {
            (0..num_entries).map(move |entry| ScheduledTrial { entry, repetition })
        })
        .collect()
}

/// Blocking sleep, replaceable in tests.
pub trait Sleep {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Delays between trials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    /// Cooldown after a failed attempt, before the same trial is retried.
    pub exception_sleep: Duration,
    /// Delay after every successful trial.
    pub delay_between_tasks: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            exception_sleep: Duration::from_secs(30),
            delay_between_tasks: Duration::from_secs(5),
        }
    }
}

/// Counters describing a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Number of successful trials.
    pub trials: usize,
    /// Number of attempts that failed and were retried.
    pub failed_attempts: usize,
}

/// Runs the benchmark matrix.
#[derive(Debug)]
pub struct Orchestrator<S = ThreadSleep> {
    entries: Vec<BenchmarkCase>,
    repeat: usize,
    shuffle: bool,
    seed: Option<u64>,
    pacing: Pacing,
    sleep: S,
}

impl Orchestrator {
    /// Creates an orchestrator running every entry `repeat` times in shuffled order.
    pub fn new(entries: Vec<BenchmarkCase>, repeat: usize) -> Self {
        Self {
            entries,
            repeat,
            shuffle: true,
            seed: None,
            pacing: Pacing::default(),
            sleep: ThreadSleep,
        }
    }
}

impl<S: Sleep> Orchestrator<S> {
    /// Enables or disables shuffling of the schedule.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Seeds the shuffle for a reproducible trial order.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Replaces the sleep implementation used for pacing.
    pub fn with_sleep<T: Sleep>(self, sleep: T) -> Orchestrator<T> {
        Orchestrator {
            entries: self.entries,
            repeat: self.repeat,
            shuffle: self.shuffle,
            seed: self.seed,
            pacing: self.pacing,
            sleep,
        }
    }

    /// The benchmark matrix.
    pub fn entries(&self) -> &[BenchmarkCase] {
        &self.entries
    }

    /// Returns the order in which trials will run.
    pub fn schedule(&self) -> Vec<ScheduledTrial> {
        let mut trials = schedule(self.entries.len(), self.repeat);
        if self.shuffle {
            let seed = self.seed.unwrap_or_else(rand::random);
            let mut rng = SmallRng::seed_from_u64(seed);
            trials.shuffle(&mut rng);
        }
        trials
    }

    /// Runs all scheduled trials, handing each successful measurement to `sink`.
    ///
    /// This only returns once every trial has succeeded.
    pub fn run(&self, sink: &mut dyn RecordSink) -> RunStats {
        self.log_setup();

        let mut stats = RunStats::default();
        let trials = self.schedule();
        let total = trials.len();

        for (position, trial) in trials.into_iter().enumerate() {
            let entry = &self.entries[trial.entry];
            let _span = tracing::info_span!(
                "trial",
                position = position + 1,
                total,
                repetition = trial.repetition
            )
            .entered();

            let record = self.run_until_success(entry, &mut stats);
            sink.record(&record);
            stats.trials += 1;

            self.sleep.sleep(self.pacing.delay_between_tasks);
        }

        stats
    }

    /// Runs one trial, retrying failed attempts after the cooldown.
    fn run_until_success(&self, entry: &BenchmarkCase, stats: &mut RunStats) -> TrialRecord {
        let transport = entry.transport.name();
        let case = entry.case.name();
        let config = &entry.config;

        loop {
            tracing::debug!("running {entry}");
            let result = entry.case.run(entry.transport.as_ref(), config);

            if !result.failure_observed {
                let record = TrialRecord {
                    transport: transport.to_owned(),
                    case: case.to_owned(),
                    num_blobs: config.num_blobs,
                    blob_size: config.blob_bytes(),
                    concurrency: config.concurrency,
                    duration_ms: result.duration.as_millis() as u64,
                };
                tracing::info!(
                    transport,
                    case,
                    num_blobs = record.num_blobs,
                    blob_size = record.blob_size,
                    concurrency = record.concurrency,
                    duration_ms = record.duration_ms,
                    "{transport} used {}ms to {case} {} {}-byte blobs with {} threads",
                    record.duration_ms,
                    record.num_blobs,
                    record.blob_size,
                    record.concurrency,
                );
                return record;
            }

            stats.failed_attempts += 1;
            let sleep_seconds = self.pacing.exception_sleep.as_secs_f64();
            tracing::warn!(
                transport,
                sleep_seconds,
                "exception observed in {transport}, sleeping for {sleep_seconds} seconds"
            );
            self.sleep.sleep(self.pacing.exception_sleep);
        }
    }

    /// Logs the benchmark setup in a stable, line-oriented format.
    fn log_setup(&self) {
        let mut transports: Vec<&str> = Vec::new();
        let mut cases: Vec<&str> = Vec::new();
        let mut configs: Vec<TransferConfig> = Vec::new();
        for entry in &self.entries {
            if !transports.contains(&entry.transport.name()) {
                transports.push(entry.transport.name());
            }
            if !cases.contains(&entry.case.name()) {
                cases.push(entry.case.name());
            }
            if !configs.contains(&entry.config) {
                configs.push(entry.config);
            }
        }

        tracing::info!("transports: {}", transports.join(", "));
        if let Some(baseline) = transports.first() {
            tracing::info!("baseline transport: {baseline}");
        }
        tracing::info!("benchmark cases: {}", cases.join(", "));
        for (index, config) in configs.iter().enumerate() {
            tracing::info!(
                "transfer config {}: blob size: {} bytes, number of blobs: {}, concurrency: {}",
                index + 1,
                config.blob_bytes(),
                config.num_blobs,
                config.concurrency
            );
        }
        tracing::info!("repeat times: {}", self.repeat);
    }
}
