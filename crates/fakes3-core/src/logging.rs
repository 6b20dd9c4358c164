//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::error::{FakeS3Error, FakeS3Result};

/// Initialize the global tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to `log_level`. Calling this
/// twice in one process is an error because the global subscriber can only
/// be installed once.
pub fn init_tracing(log_level: &str, format: LogFormat) -> FakeS3Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .map_err(|e| FakeS3Error::Tracing(format!("invalid log level filter {log_level:?}: {e}")))?
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| FakeS3Error::Tracing(e.to_string()))
}
