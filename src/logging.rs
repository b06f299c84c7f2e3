//! Tracing setup for the command line tool

use crate::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Console filter when `RUST_LOG` is unset; status lines already go to stdout
const DEFAULT_CONSOLE_FILTER: &str = "warn";

/// Per-probe diagnostics of this crate only, not the HTTP stack underneath
const DEBUG_FILE_FILTER: &str = "proxy_harvest=debug";

/// Install the global subscriber.
///
/// With `debug_file` set, every debug event of this crate is also appended to
/// that file through a single non-blocking writer. The returned guard flushes
/// and closes it when dropped, so hold it for the whole run.
pub fn init(debug_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter(env_directives.as_deref()));

    let Some(path) = debug_file else {
        tracing_subscriber::registry().with(console).try_init()?;
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("debug log path {path:?} has no file name"))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new(DEBUG_FILE_FILTER));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;

    Ok(Some(guard))
}

/// `RUST_LOG` directives when present and valid, the quiet default otherwise
fn console_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_CONSOLE_FILTER))
}
