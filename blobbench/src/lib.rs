//! A throughput benchmark for blob storage transports.
//!
//! The benchmark measures how long it takes to upload or download a number of equally sized blobs
//! with a given number of concurrent workers. Every combination of [`TransferConfig`], transport
//! and workload [`Case`] is measured repeatedly, in random order, so that several client stacks
//! talking to the same storage service can be compared fairly.
//!
//! - [`transport`] defines the capability to move a single blob, plus the shipped backends.
//! - [`case`] defines workload cases such as repeated downloads or uploads.
//! - [`pool`] runs one trial on a pool of worker threads sharing a countdown of work items.
//! - [`orchestrator`] builds the benchmark matrix, schedules trials and retries failures.
//!
//! [`TransferConfig`]: case::TransferConfig
//! [`Case`]: case::Case
#![warn(missing_debug_implementations)]

pub mod case;
pub mod cli;
pub mod config;
pub mod error;
pub mod fixture;
pub mod observability;
pub mod orchestrator;
pub mod payload;
pub mod pool;
pub mod report;
pub mod transport;

pub use crate::case::{Case, TransferConfig, TrialResult};
pub use crate::error::TransferError;
pub use crate::orchestrator::{BenchmarkCase, Orchestrator};
pub use crate::transport::Transport;
