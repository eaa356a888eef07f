use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::{format::FmtSpan, writer::MakeWriterExt};

/// One-off `scan` runs. Mostly the retries of a page that is still rendering.
pub const SCAN_PREFIX: &str = "pacedays-scan";
/// Long running `watch` sessions, one span per scan cycle.
pub const WATCH_PREFIX: &str = "pacedays-watch";
/// Commands working on the stored months (`months`, `total`, `recompute`).
pub const REPORT_PREFIX: &str = "pacedays-report";

const LOG_DIR: &str = "logs";

/// Logs into daily rotated files next to the store, in `<app dir>/logs`, one set per command
/// kind. Stdout gets the same events only with `--log-console`, reports are printed there too.
/// `log_level` takes precedence over `RUST_LOG`, the default `info` shows every committed month.
pub fn enable_logging(
    prefix: &str,
    application_data_path: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix(prefix)
        .build(application_data_path.join(LOG_DIR))?;

    let stdout = std::io::stdout.with_filter(move |_| show_std);

    let level = log_level
        .map(|v| v.to_string())
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!(
            "{}={level}",
            env!("CARGO_PKG_NAME").replace("-", "_"),
        )))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stdout.and(appender))
        .pretty()
        .init();
    Ok(())
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .init()
});
