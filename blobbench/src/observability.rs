use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::config::{LogFormat, Logging};

pub fn init_tracing(config: &Logging) {
    let (level, env_filter) = parse_rust_log(config.level);

    let format = match config.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match format {
        LogFormat::Json => layer.json().with_filter(level).boxed(),
        LogFormat::Simplified => layer.with_ansi(false).compact().with_filter(level).boxed(),
        LogFormat::Pretty | LogFormat::Auto => layer.with_filter(level).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();
}

/// Returns the maximum level to log and the per-module filter.
///
/// `RUST_LOG` may hold a plain level, which replaces the configured one, or a full filter
/// directive that is then used verbatim.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from(level),
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        blobbench=TRACE,\
        reqwest=WARN,\
        hyper_util=WARN,\
        ",
    );

    (level, env_filter)
}
