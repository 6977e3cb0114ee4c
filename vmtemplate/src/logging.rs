//! Tracing subscriber setup.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "vmtemplate.log";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Filter directives (`RUST_LOG` syntax). Falls back to `RUST_LOG`, then `info`.
    pub filter: Option<String>,
    /// Write a daily-rotated log file here instead of stderr.
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

pub(crate) fn build_filter(directives: Option<&str>) -> VmTemplateResult<EnvFilter> {
    match directives {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| VmTemplateError::Config(vec![format!("invalid log filter: {}", e)])),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global tracing subscriber.
///
/// When logging to a file, the returned guard must be kept alive to flush
/// buffered lines on shutdown.
pub fn init_logging(config: &LogConfig) -> VmTemplateResult<Option<WorkerGuard>> {
    let filter = build_filter(config.filter.as_deref())?;

    let (layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                VmTemplateError::Config(vec![format!(
                    "cannot create log directory {}: {}",
                    dir.display(),
                    e
                )])
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (layer, Some(guard))
        }
        None => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_target(true)
                .boxed();
            (layer, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| VmTemplateError::Internal(format!("failed to install logger: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_filter_rejected() {
        let err = build_filter(Some("vmtemplate=notalevel")).unwrap_err();
        assert!(matches!(err, VmTemplateError::Config(_)));
    }

    #[test]
    fn test_valid_filter_accepted() {
        assert!(build_filter(Some("vmtemplate=debug,warn")).is_ok());
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");

        let guard = init_logging(&LogConfig {
            filter: Some("debug".into()),
            log_dir: Some(log_dir.clone()),
            ansi: false,
        })
        .unwrap();

        assert!(guard.is_some());
        assert!(log_dir.is_dir());
    }
}
