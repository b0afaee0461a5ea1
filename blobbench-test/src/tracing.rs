use tracing_subscriber::EnvFilter;

/// Crates whose events are captured by default.
const CRATE_NAMES: &[&str] = &["blobbench", "blobbench_test"];

/// Initializes logging for tests.
///
/// Events are written to the test runner's captured output, so they only show up for failing
/// tests or with `--nocapture`. Unless `RUST_LOG` is set, only the benchmark crates log below
/// `ERROR`. Calling this more than once is harmless.
///
/// ```
/// blobbench_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        CRATE_NAMES
            .iter()
            .fold(EnvFilter::new("ERROR"), |filter, name| {
                filter.add_directive(format!("{name}=TRACE").parse().unwrap())
            })
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
