use std::path::Path;
use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Env var holding the log filter, e.g. `QUANTDESK_LOG=quantdesk_core=debug`.
const LOG_ENV: &str = "QUANTDESK_LOG";

/// Send tracing output to `<dir>/quantdesk.log`. The terminal belongs to the
/// UI, so nothing is written to stdout or stderr.
///
/// Keep the returned guard alive until exit so buffered lines get flushed.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, "quantdesk.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;

    Ok(guard)
}
