use anyhow::{Context, Result};
use camino::Utf8Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber: stderr always, plus `log_file` when given.
///
/// `RUST_LOG` wins over `level`; `verbose` forces debug. Keep the returned
/// guard alive until exit or buffered file output is lost.
pub fn init(level: &str, verbose: bool, log_file: Option<&Utf8Path>) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_str().is_empty())
                .unwrap_or_else(|| Utf8Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file path {path} has no file name"))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {dir}"))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
