use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use argh::FromArgs;

use crate::case::SharedCase;
use crate::config::Config;
use crate::fixture::Fixtures;
use crate::observability;
use crate::orchestrator::{Orchestrator, matrix};
use crate::report::{JsonLinesSink, Reporter, Summary};
use crate::transport::{SharedTransport, build_transport};

/// Throughput benchmark for blob storage transports.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// only run the transport with this name, can be repeated
    #[argh(option)]
    pub transport: Vec<String>,

    /// only run the case with this name (`download` or `upload`), can be repeated
    #[argh(option)]
    pub case: Vec<String>,

    /// run trials in matrix order instead of shuffling them
    #[argh(switch)]
    pub no_shuffle: bool,
}

/// Restricts the configured transports and cases to the given names.
///
/// Empty filters keep everything. Names that match nothing are an error, since a typo would
/// otherwise silently skip a whole part of the benchmark.
pub fn apply_filters(config: &mut Config, transports: &[String], cases: &[String]) -> Result<()> {
    for name in transports {
        if !config.transports.iter().any(|t| &t.name() == name) {
            bail!("unknown transport `{name}`");
        }
    }
    for name in cases {
        if !config.cases.iter().any(|c| c.name() == name) {
            bail!("unknown case `{name}`");
        }
    }

    if !transports.is_empty() {
        config.transports.retain(|t| transports.contains(&t.name()));
    }
    if !cases.is_empty() {
        config.cases.retain(|c| cases.iter().any(|n| n == c.name()));
    }
    Ok(())
}

/// Instantiates transports and cases and builds the orchestrator for the configured matrix.
pub fn build_orchestrator(config: &Config) -> Orchestrator {
    let fixtures = Arc::new(Fixtures::new(config.fixture_concurrency));

    let transports: Vec<SharedTransport> = config.transports.iter().map(build_transport).collect();
    let cases: Vec<SharedCase> = config.cases.iter().map(|c| c.build(&fixtures)).collect();

    Orchestrator::new(matrix(&config.transfers, &transports, &cases), config.repeat)
        .shuffle(config.shuffle)
        .seed(config.seed)
        .pacing(config.pacing())
}

/// Parses the command line and runs the benchmark.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let mut config = Config::load(args.config.as_deref())?;
    if args.no_shuffle {
        config.shuffle = false;
    }

    observability::init_tracing(&config.logging);
    tracing::info!("started");
    tracing::info!("blobbench version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("OS: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    tracing::debug!(?config);

    apply_filters(&mut config, &args.transport, &args.case)?;
    config.validate()?;

    let json = match &config.results {
        Some(path) => Some(
            JsonLinesSink::create(path)
                .with_context(|| format!("failed to create results file {}", path.display()))?,
        ),
        None => None,
    };

    let orchestrator = build_orchestrator(&config);
    let baseline = config.transports.first().map(|t| t.name());
    let mut reporter = Reporter {
        summary: Summary::new(baseline),
        json,
    };

    let stats = orchestrator.run(&mut reporter);
    tracing::info!(
        trials = stats.trials,
        failed_attempts = stats.failed_attempts,
        "exited"
    );

    reporter.summary.print();
    Ok(())
}
