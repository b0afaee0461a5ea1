//! Runs complete benchmarks against the local transports.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use blobbench::TransferConfig;
use blobbench::cli::{apply_filters, build_orchestrator};
use blobbench::config::{Config, TransportConfig};
use blobbench::payload::{blob_name, random_payload};
use blobbench::report::{JsonLinesSink, RecordSink, Summary, TrialRecord};

fn config(data: &std::path::Path) -> Config {
    Config {
        transfers: vec![
            TransferConfig::new(512, 16, 4),
            TransferConfig::new(4096, 3, 8),
        ],
        transports: vec![
            TransportConfig::Memory {
                latency: Duration::ZERO,
            },
            TransportConfig::FileSystem {
                path: data.to_owned(),
            },
        ],
        repeat: 2,
        exception_sleep: Duration::ZERO,
        delay_between_tasks: Duration::ZERO,
        seed: Some(42),
        fixture_concurrency: 4,
        ..Default::default()
    }
}

/// Forwards records to several sinks.
struct Tee<'a>(Vec<&'a mut dyn RecordSink>);

impl RecordSink for Tee<'_> {
    fn record(&mut self, record: &TrialRecord) {
        for sink in &mut self.0 {
            sink.record(record);
        }
    }
}

#[test]
fn test_full_matrix() -> Result<()> {
    blobbench_test::tracing::init();
    let data = tempfile::tempdir()?;
    let config = config(data.path());
    config.validate()?;

    let orchestrator = build_orchestrator(&config);
    assert_eq!(orchestrator.entries().len(), 8);

    let mut records: Vec<TrialRecord> = Vec::new();
    let mut json = JsonLinesSink::new(Vec::new());
    let mut summary = Summary::new(Some("memory".to_owned()));
    let mut sinks = Tee(vec![
        &mut records as &mut dyn RecordSink,
        &mut json,
        &mut summary,
    ]);
    let stats = orchestrator.run(&mut sinks);
    drop(sinks);

    assert_eq!(stats.trials, 16);
    assert_eq!(stats.failed_attempts, 0);
    assert_eq!(records.len(), 16);

    for transport in ["memory", "filesystem"] {
        for case in ["download", "upload"] {
            for transfer in &config.transfers {
                let count = records
                    .iter()
                    .filter(|r| {
                        r.transport == transport
                            && r.case == case
                            && &r.transfer_config() == transfer
                    })
                    .count();
                assert_eq!(count, 2, "{transport} {case} {transfer}");
                assert_eq!(summary.count(case, transfer, transport), 2);
            }
        }
    }

    let baseline = summary.percent_of_baseline("upload", &config.transfers[0], "memory");
    assert_eq!(baseline, Some(100.0));

    let output = String::from_utf8(json.into_inner())?;
    let parsed: Vec<TrialRecord> = output
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(parsed, records);

    // the filesystem transport holds the download fixture and every uploaded blob
    for transfer in &config.transfers {
        let size = transfer.blob_bytes();
        let fixture = std::fs::read(data.path().join(blob_name(size, 0)))?;
        assert_eq!(fixture, random_payload(size)?);

        for index in 1..=transfer.num_blobs {
            let metadata = std::fs::metadata(data.path().join(blob_name(size, index)))?;
            assert_eq!(metadata.len(), size);
        }
    }

    Ok(())
}

#[test]
fn test_filtered_run_with_yaml_config() -> Result<()> {
    let data = tempfile::tempdir()?;
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"
        repeat: 1
        shuffle: false
        exception_sleep: 0s
        delay_between_tasks: 0s
        transfers:
          - blob_size: 1KiB
            num_blobs: 8
            concurrency: 2
        transports:
          - type: memory
            latency: 1ms
          - type: filesystem
            path: {}
        "#,
        data.path().display()
    )?;

    let mut config = Config::load(Some(file.path()))?;
    apply_filters(&mut config, &["filesystem".into()], &["upload".into()])?;
    config.validate()?;

    let orchestrator = build_orchestrator(&config);
    let mut records: Vec<TrialRecord> = Vec::new();
    let stats = orchestrator.run(&mut records);

    assert_eq!(stats.trials, 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transport, "filesystem");
    assert_eq!(records[0].case, "upload");
    assert_eq!(records[0].blob_size, 1024);
    assert_eq!(std::fs::read_dir(data.path())?.count(), 8);

    Ok(())
}
