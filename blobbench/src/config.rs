//! Configuration for the benchmark runner.
//!
//! Configuration is loaded from the following sources, with the highest precedence first:
//!
//! 1. Environment variables (prefixed with `BB__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested structures, for example
//! `BB__REPEAT=5` or `BB__LOGGING__LEVEL=debug`.
//!
//! A complete YAML configuration looks like this:
//!
//! ```yaml
//! repeat: 5
//! exception_sleep: 30s
//! delay_between_tasks: 5s
//!
//! transfers:
//!   - blob_size: 10KiB
//!     num_blobs: 5000
//!     concurrency: 32
//!
//! transports:
//!   - type: http
//!     endpoint: http://localhost:8888
//!     container: benchmark
//!     client: blocking
//!   - type: filesystem
//!     path: /mnt/bench
//!
//! cases: [download, upload]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::case::{CaseKind, TransferConfig};
use crate::fixture::DEFAULT_SEED_CONCURRENCY;
use crate::orchestrator::Pacing;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "BB__";

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// The client stack used by an HTTP transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpClient {
    /// The blocking `reqwest` client, one request per worker thread.
    #[default]
    Blocking,
    /// The async `reqwest` client on a dedicated tokio runtime.
    Async,
}

impl fmt::Display for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => f.write_str("blocking"),
            Self::Async => f.write_str("async"),
        }
    }
}

/// A transport to benchmark.
///
/// The `type` field in YAML determines which variant is used.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// A blob store reachable over HTTP (type `"http"`).
    ///
    /// ```yaml
    /// transports:
    ///   - type: http
    ///     endpoint: http://localhost:8888
    ///     container: benchmark
    ///     client: async
    /// ```
    Http {
        /// Base URL of the blob store.
        endpoint: String,
        /// Container (first path segment) holding all benchmark blobs.
        container: String,
        /// Client stack driving the requests. Defaults to `blocking`.
        #[serde(default)]
        client: HttpClient,
    },

    /// Files below a local directory (type `"filesystem"`).
    FileSystem {
        /// Root directory, created if it does not exist.
        path: PathBuf,
    },

    /// A process-local map (type `"memory"`), useful for dry runs.
    Memory {
        /// Simulated latency of every transfer.
        #[serde(default, with = "humantime_serde")]
        latency: Duration,
    },
}

impl TransportConfig {
    /// The name under which results of this transport are reported.
    pub fn name(&self) -> String {
        match self {
            Self::Http { client, .. } => format!("http-{client}"),
            Self::FileSystem { .. } => "filesystem".to_owned(),
            Self::Memory { .. } => "memory".to_owned(),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty for TTY, otherwise simplified.
    #[default]
    Auto,
    /// Pretty printing with colors.
    Pretty,
    /// Simplified plain text output.
    Simplified,
    /// JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// `RUST_LOG` overrides this with a more granular filter. Per-transfer errors are logged at
    /// `DEBUG`.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Top-level benchmark configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Workload shapes to measure.
    pub transfers: Vec<TransferConfig>,

    /// Transports to compare. The first one is the baseline in reports.
    pub transports: Vec<TransportConfig>,

    /// Workload cases to run.
    pub cases: Vec<CaseKind>,

    /// How often every combination is measured.
    pub repeat: usize,

    /// Cooldown before retrying a failed trial.
    #[serde(with = "humantime_serde")]
    pub exception_sleep: Duration,

    /// Delay after every successful trial.
    #[serde(with = "humantime_serde")]
    pub delay_between_tasks: Duration,

    /// Whether to run trials in random order.
    pub shuffle: bool,

    /// Seed for the trial order. Random if unset.
    pub seed: Option<u64>,

    /// Number of workers used to populate download fixtures.
    pub fixture_concurrency: usize,

    /// Optional path of a JSON lines file receiving every trial record.
    pub results: Option<PathBuf>,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        let pacing = Pacing::default();
        Self {
            transfers: vec![
                TransferConfig::new(5, 5000, 32),
                TransferConfig::new(10 * KIB, 5000, 32),
                TransferConfig::new(10 * MIB, 1000, 32),
                TransferConfig::new(GIB, 16, 8),
                TransferConfig::new(GIB, 64, 32),
            ],
            transports: Vec::new(),
            cases: vec![CaseKind::Download, CaseKind::Upload],
            repeat: 3,
            exception_sleep: pacing.exception_sleep,
            delay_between_tasks: pacing.delay_between_tasks,
            shuffle: true,
            seed: None,
            fixture_concurrency: DEFAULT_SEED_CONCURRENCY,
            results: None,
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, the optional YAML file and the environment, in that
    /// order of increasing precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to load configuration")?;

        Ok(config)
    }

    /// Rejects configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.transports.is_empty() {
            bail!("no transports configured");
        }
        if self.cases.is_empty() {
            bail!("no benchmark cases configured");
        }
        if self.transfers.is_empty() {
            bail!("no transfer configurations configured");
        }
        if self.repeat == 0 {
            bail!("repeat must be at least 1");
        }

        let mut names = HashSet::new();
        for transport in &self.transports {
            let name = transport.name();
            if !names.insert(name.clone()) {
                bail!("transport `{name}` is configured more than once");
            }
        }

        for (index, transfer) in self.transfers.iter().enumerate() {
            transfer
                .validate()
                .with_context(|| format!("invalid transfer config {}", index + 1))?;
        }

        Ok(())
    }

    /// The delays applied between trials.
    pub fn pacing(&self) -> Pacing {
        Pacing {
            exception_sleep: self.exception_sleep,
            delay_between_tasks: self.delay_between_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bytesize::ByteSize;

    use super::*;

    #[test]
    fn defaults_need_a_transport() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();
            assert_eq!(config.transfers.len(), 5);
            assert_eq!(config.transfers[1].blob_size, ByteSize::kib(10));
            assert_eq!(config.repeat, 3);
            assert!(config.validate().is_err());

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BB__REPEAT", "7");
            jail.set_env("BB__EXCEPTION_SLEEP", "1m");
            jail.set_env("BB__SEED", "1234");
            jail.set_env("BB__CASES", "[upload]");
            jail.set_env("BB__LOGGING__LEVEL", "debug");

            let config = Config::load(None).unwrap();
            assert_eq!(config.repeat, 7);
            assert_eq!(config.exception_sleep, Duration::from_secs(60));
            assert_eq!(config.seed, Some(1234));
            assert_eq!(config.cases, [CaseKind::Upload]);
            assert_eq!(config.logging.level, LevelFilter::DEBUG);

            Ok(())
        });
    }

    #[test]
    fn configured_with_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
                delay_between_tasks: 250ms
                transfers:
                  - blob_size: 1MiB
                    num_blobs: 10
                    concurrency: 4
                transports:
                  - type: http
                    endpoint: http://localhost:8888
                    container: bench
                  - type: http
                    endpoint: http://localhost:8888
                    container: bench
                    client: async
                  - type: memory
                    latency: 5ms
                "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("BB__SHUFFLE", "false");

            let config = Config::load(Some(tempfile.path())).unwrap();
            config.validate().unwrap();

            assert_eq!(config.delay_between_tasks, Duration::from_millis(250));
            assert!(!config.shuffle);
            assert_eq!(
                config.transfers,
                [TransferConfig::new(1024 * 1024, 10, 4)]
            );

            let names: Vec<_> = config.transports.iter().map(|t| t.name()).collect();
            assert_eq!(names, ["http-blocking", "http-async", "memory"]);
            assert_eq!(
                config.transports[2],
                TransportConfig::Memory {
                    latency: Duration::from_millis(5)
                }
            );

            Ok(())
        });
    }

    #[test]
    fn rejects_duplicate_transports() {
        let config = Config {
            transports: vec![
                TransportConfig::FileSystem { path: "a".into() },
                TransportConfig::FileSystem { path: "b".into() },
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "transport `filesystem` is configured more than once"
        );
    }

    #[test]
    fn rejects_invalid_transfers() {
        let config = Config {
            transports: vec![TransportConfig::Memory {
                latency: Duration::ZERO,
            }],
            transfers: vec![TransferConfig::new(1, 1, 0)],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid transfer config 1");
    }
}
