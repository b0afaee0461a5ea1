//! Trial records and the human readable summary printed after a run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::case::TransferConfig;

/// The measurement of one successful trial.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrialRecord {
    /// Name of the transport.
    pub transport: String,
    /// Name of the workload case.
    pub case: String,
    /// Number of transferred blobs.
    pub num_blobs: usize,
    /// Size of every blob in bytes.
    pub blob_size: u64,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Average time per worker in milliseconds.
    pub duration_ms: u64,
}

impl TrialRecord {
    /// The transfer configuration this record was measured with.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig::new(self.blob_size, self.num_blobs, self.concurrency)
    }

    /// Measured duration, clamped to at least one millisecond.
    fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.max(1))
    }

    /// Throughput in bytes per second.
    pub fn throughput(&self) -> f64 {
        self.num_blobs as f64 * self.blob_size as f64 / self.duration().as_secs_f64()
    }

    /// Transfers per second.
    pub fn ops_per_second(&self) -> f64 {
        self.num_blobs as f64 / self.duration().as_secs_f64()
    }
}

/// A consumer of [`TrialRecord`]s as trials complete.
pub trait RecordSink {
    /// Accepts the record of a successful trial.
    fn record(&mut self, record: &TrialRecord);
}

impl RecordSink for Vec<TrialRecord> {
    fn record(&mut self, record: &TrialRecord) {
        self.push(record.clone());
    }
}

/// Writes every record as one JSON line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, record: &TrialRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        // flush eagerly, runs take hours and may be interrupted
        self.writer.flush()
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn record(&mut self, record: &TrialRecord) {
        if let Err(error) = self.write(record) {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "failed to write trial record"
            );
        }
    }
}

/// Aggregated records of one (case, transfer configuration, transport) combination.
struct Group {
    case: String,
    config: TransferConfig,
    transport: String,
    durations: DDSketch,
}

impl Group {
    fn avg(&self) -> f64 {
        self.durations.sum().unwrap_or_default() / self.durations.count().max(1) as f64
    }

    fn quantile(&self, q: f64) -> f64 {
        self.durations.quantile(q).ok().flatten().unwrap_or_default()
    }

    /// Throughput of the average duration, in bytes per second.
    fn throughput(&self) -> f64 {
        self.config.total_bytes() as f64 / self.avg().max(0.001)
    }
}

/// Statistics over all repetitions of every combination.
#[derive(Default)]
pub struct Summary {
    baseline: Option<String>,
    groups: Vec<Group>,
}

impl std::fmt::Debug for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summary")
            .field("baseline", &self.baseline)
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl Summary {
    /// Creates a summary comparing all transports against `baseline`.
    pub fn new(baseline: Option<String>) -> Self {
        Self {
            baseline,
            groups: Vec::new(),
        }
    }

    fn group_mut(&mut self, record: &TrialRecord) -> &mut Group {
        let config = record.transfer_config();
        let position = self.groups.iter().position(|g| {
            g.case == record.case && g.config == config && g.transport == record.transport
        });

        let index = position.unwrap_or_else(|| {
            self.groups.push(Group {
                case: record.case.clone(),
                config,
                transport: record.transport.clone(),
                durations: DDSketch::default(),
            });
            self.groups.len() - 1
        });
        &mut self.groups[index]
    }

    /// Number of recorded trials of the given combination.
    pub fn count(&self, case: &str, config: &TransferConfig, transport: &str) -> usize {
        self.find(case, config, transport)
            .map_or(0, |g| g.durations.count())
    }

    /// Average duration of the given combination in seconds.
    pub fn avg_secs(&self, case: &str, config: &TransferConfig, transport: &str) -> Option<f64> {
        self.find(case, config, transport).map(Group::avg)
    }

    /// Throughput of `transport` relative to the baseline transport, in percent.
    pub fn percent_of_baseline(
        &self,
        case: &str,
        config: &TransferConfig,
        transport: &str,
    ) -> Option<f64> {
        let baseline = self.find(case, config, self.baseline.as_deref()?)?;
        let group = self.find(case, config, transport)?;
        Some(group.throughput() / baseline.throughput() * 100.0)
    }

    fn find(&self, case: &str, config: &TransferConfig, transport: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| g.case == case && &g.config == config && g.transport == transport)
    }

    /// Prints the summary to stdout.
    pub fn print(&self) {
        let mut cases: Vec<&str> = Vec::new();
        for group in &self.groups {
            if !cases.contains(&group.case.as_str()) {
                cases.push(&group.case);
            }
        }

        for case in cases {
            println!();
            println!("{} {}", "## Case".bold(), case.bold().blue());

            let mut configs: Vec<TransferConfig> = Vec::new();
            for group in self.groups.iter().filter(|g| g.case == case) {
                if !configs.contains(&group.config) {
                    configs.push(group.config);
                }
            }

            for config in configs {
                println!("{}", format!("  {config}").bold());
                for group in self
                    .groups
                    .iter()
                    .filter(|g| g.case == case && g.config == config)
                {
                    self.print_group(group);
                }
            }
        }
    }

    fn print_group(&self, group: &Group) {
        let avg = Duration::from_secs_f64(group.avg());
        let p50 = Duration::from_secs_f64(group.quantile(0.5));
        let p90 = Duration::from_secs_f64(group.quantile(0.9));
        let throughput = ByteSize::b(group.throughput() as u64);
        let ops = group.config.num_blobs as f64 / group.avg().max(0.001);

        print!(
            "    {} ({} runs): avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; {}/s, {:.2} operations/s",
            group.transport.green(),
            group.durations.count(),
            avg.bold(),
            throughput.display().iec().bold(),
            ops,
        );
        match self.percent_of_baseline(&group.case, &group.config, &group.transport) {
            Some(_) if Some(&group.transport) == self.baseline.as_ref() => println!(" (baseline)"),
            Some(percent) => println!(", {:.1}% of baseline", percent.bold()),
            None => println!(),
        }
    }
}

impl RecordSink for Summary {
    fn record(&mut self, record: &TrialRecord) {
        let duration = record.duration_ms as f64 / 1000.0;
        self.group_mut(record).durations.add(duration);
    }
}

/// Fans records out to the summary and an optional JSON lines file.
#[derive(Debug)]
pub struct Reporter {
    pub summary: Summary,
    pub json: Option<JsonLinesSink<BufWriter<File>>>,
}

impl RecordSink for Reporter {
    fn record(&mut self, record: &TrialRecord) {
        self.summary.record(record);
        if let Some(json) = &mut self.json {
            json.record(record);
        }
    }
}
