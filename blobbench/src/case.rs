//! Workload cases: the behavioral patterns a trial can follow.
//!
//! A [`Case`] runs one trial of a [`TransferConfig`] against a [`Transport`]. Both shipped cases
//! are thin glue around [`run_workers`]: they reset the transport, prepare buffers and then let
//! the worker pool drain the work items.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fixture::Fixtures;
use crate::payload::{allocate, blob_name, random_payload};
use crate::pool::{PoolOutcome, run_workers};
use crate::transport::Transport;

/// Upper bound for the number of worker threads in a single trial.
pub const MAX_CONCURRENCY: usize = 1024;

/// The shape of a trial's workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Size of every transferred blob.
    pub blob_size: ByteSize,
    /// Number of work items, i.e. transfers.
    pub num_blobs: usize,
    /// Number of concurrent workers.
    pub concurrency: usize,
}

/// A [`TransferConfig`] that cannot be executed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidTransferConfig {
    #[error("number of blobs must be at least 1")]
    NoBlobs,
    #[error("concurrency must be between 1 and {MAX_CONCURRENCY}, got {0}")]
    Concurrency(usize),
    #[error("blob size {0} exceeds the address space")]
    BlobSize(ByteSize),
}

impl TransferConfig {
    pub fn new(blob_size: u64, num_blobs: usize, concurrency: usize) -> Self {
        Self {
            blob_size: ByteSize::b(blob_size),
            num_blobs,
            concurrency,
        }
    }

    /// The blob size in bytes.
    pub fn blob_bytes(&self) -> u64 {
        self.blob_size.as_u64()
    }

    /// Total number of bytes moved by one trial, saturating at `u64::MAX`.
    pub fn total_bytes(&self) -> u64 {
        self.blob_bytes().saturating_mul(self.num_blobs as u64)
    }

    pub fn validate(&self) -> Result<(), InvalidTransferConfig> {
        if self.num_blobs == 0 {
            return Err(InvalidTransferConfig::NoBlobs);
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(InvalidTransferConfig::Concurrency(self.concurrency));
        }
        if usize::try_from(self.blob_bytes()).is_err() {
            return Err(InvalidTransferConfig::BlobSize(self.blob_size));
        }
        Ok(())
    }
}

impl fmt::Display for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x {} with {} threads",
            self.num_blobs,
            self.blob_size.display().iec(),
            self.concurrency
        )
    }
}

/// Outcome of a single trial attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrialResult {
    /// Average wall-clock time a worker spent in the trial.
    pub duration: Duration,
    /// Whether any transfer failed. There is no partial success.
    pub failure_observed: bool,
}

impl TrialResult {
    fn failed() -> Self {
        Self {
            duration: Duration::ZERO,
            failure_observed: true,
        }
    }
}

impl From<PoolOutcome> for TrialResult {
    fn from(outcome: PoolOutcome) -> Self {
        Self {
            duration: outcome.duration,
            failure_observed: outcome.failure_observed,
        }
    }
}

/// A unit of benchmark work that can be run repeatedly.
pub trait Case: Debug + Send + Sync {
    /// The case name, used in logs and reports.
    fn name(&self) -> &str;

    /// Runs one trial.
    fn run(&self, transport: &dyn Transport, config: &TransferConfig) -> TrialResult;
}

/// A shared, type-erased [`Case`] instance.
pub type SharedCase = Arc<dyn Case>;

/// Resets the transport for the trial's concurrency, logging failures.
fn reset_transport(transport: &dyn Transport, config: &TransferConfig) -> bool {
    match transport.reset(config.concurrency) {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(
                error = &error as &dyn std::error::Error,
                transport = transport.name(),
                "failed to reset transport"
            );
            false
        }
    }
}

/// Repeatedly downloads a single fixture blob.
///
/// Every worker downloads into its own private buffer.
#[derive(Debug)]
pub struct DownloadCase {
    fixtures: Arc<Fixtures>,
}

impl DownloadCase {
    pub fn new(fixtures: Arc<Fixtures>) -> Self {
        Self { fixtures }
    }
}

impl Case for DownloadCase {
    fn name(&self) -> &str {
        "download"
    }

    fn run(&self, transport: &dyn Transport, config: &TransferConfig) -> TrialResult {
        if !reset_transport(transport, config) {
            return TrialResult::failed();
        }

        let blob_size = config.blob_bytes();
        if let Err(error) = self.fixtures.ensure_blobs(transport, blob_size, 1) {
            tracing::debug!(error = &error as &dyn std::error::Error);
            return TrialResult::failed();
        }

        let name = blob_name(blob_size, 0);
        run_workers(
            config.concurrency,
            config.num_blobs,
            |_| allocate(blob_size),
            |buffer, _| transport.download(&name, buffer),
        )
        .into()
    }
}

/// Repeatedly uploads one shared payload under distinct blob names.
#[derive(Debug, Default)]
pub struct UploadCase;

impl Case for UploadCase {
    fn name(&self) -> &str {
        "upload"
    }

    fn run(&self, transport: &dyn Transport, config: &TransferConfig) -> TrialResult {
        if !reset_transport(transport, config) {
            return TrialResult::failed();
        }

        let blob_size = config.blob_bytes();
        let payload = match random_payload(blob_size) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::debug!(error = &error as &dyn std::error::Error, blob_size);
                return TrialResult::failed();
            }
        };
        run_workers(
            config.concurrency,
            config.num_blobs,
            |_| Ok(()),
            |_, index| transport.upload(&blob_name(blob_size, index), &payload),
        )
        .into()
    }
}

/// Configurable selection of the shipped [`Case`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseKind {
    Download,
    Upload,
}

impl CaseKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }

    /// Instantiates the case. Download cases share the given fixture cache.
    pub fn build(self, fixtures: &Arc<Fixtures>) -> SharedCase {
        match self {
            Self::Download => Arc::new(DownloadCase::new(Arc::clone(fixtures))),
            Self::Upload => Arc::new(UploadCase),
        }
    }
}

impl fmt::Display for CaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
