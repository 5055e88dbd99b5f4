use crate::config::{LogFormat, LoggingConfig};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging based on output mode, debug flag and `[logging]` config
///
/// Keep the returned guard alive for the life of the process; dropping it
/// stops the background file writer.
pub fn init_logging(
    debug: bool,
    quiet: bool,
    config: &LoggingConfig,
) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = if debug {
        EnvFilter::new("piano_flow=debug")
    } else if quiet {
        EnvFilter::new("piano_flow=error")
    } else {
        EnvFilter::try_new(config.level.as_deref().unwrap_or("piano_flow=info"))?
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(debug)
        .with_file(debug)
        .with_writer(std::io::stderr);
    layers.push(match config.format {
        LogFormat::Pretty => stderr_layer.boxed(),
        LogFormat::Json => stderr_layer.json().boxed(),
    });

    let mut guard = None;
    if let Some(ref raw) = config.file {
        let log_path = PathBuf::from(shellexpand::tilde(raw).as_ref());
        let (writer, file_guard) = file_writer(&log_path)?;
        guard = Some(file_guard);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);
        layers.push(match config.format {
            LogFormat::Pretty => file_layer.boxed(),
            LogFormat::Json => file_layer.json().boxed(),
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Non-blocking appender for a single, never-rotated log file
fn file_writer(
    log_path: &std::path::Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", log_path.display()))?;

    std::fs::create_dir_all(&dir)?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
