//! Logging initialization for ChatDeck.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact `LEVEL target message {fields}` lines; use the
//!   [`log_component!`] macro to tag events with a `component` field
//! - `json`: structured JSON lines, optionally appended to a file

use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber from config.
///
/// `RUST_LOG` takes precedence over `cfg.level`. Calling this more than once
/// is harmless; later calls leave the first subscriber in place.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let _ = match cfg.format {
        LogFormat::Json => match cfg.file.as_deref().map(open_log_file) {
            Some(Ok(file)) => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .try_init(),
            Some(Err(e)) => {
                eprintln!("chatdeck: cannot open log file, logging to stderr: {}", e);
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .try_init()
            }
            None => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        },
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Component => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init(),
    };
}

fn open_log_file(path: &str) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

/// Emit a component-tagged tracing event.
///
/// ```
/// # use chatdeck::log_component;
/// log_component!(info, "worker", "task received");
/// log_component!(warn, "tasks", "worker not alive", pending = 3u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
