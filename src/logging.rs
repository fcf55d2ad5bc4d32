//! Tracing setup.
//!
//! Library code only emits `tracing` events. Hosts that want them on
//! stderr or in a file call `init` once at startup.

use std::fs::OpenOptions;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` overrides `config.level`. With `config.file` set, output is
/// appended to that file through a non-blocking writer whose guard must
/// be kept alive. Returns `None` when writing to stderr, when the file
/// cannot be opened, or when a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.format.eq_ignore_ascii_case("json");

    let Some(path) = &config.file else {
        let base = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        installed(if json {
            base.json().try_init()
        } else {
            base.compact().try_init()
        });
        return None;
    };

    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ERROR: Unable to open log file '{}': {e}", path.display());
            return None;
        }
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let base = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_writer(non_blocking);
    let result = if json {
        base.json().try_init()
    } else {
        base.compact().try_init()
    };
    installed(result).then_some(guard)
}

/// An already installed global subscriber is kept.
fn installed(result: Result<(), Box<dyn std::error::Error + Send + Sync>>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "keeping existing tracing subscriber");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unwritable_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            file: Some(dir.path().join("missing").join("store.log")),
            ..LoggingConfig::default()
        };
        assert!(init(&config).is_none());
    }

    #[test]
    fn test_second_init_keeps_existing_subscriber() {
        init(&LoggingConfig::default());

        let dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            file: Some(dir.path().join("store.log")),
            ..LoggingConfig::default()
        };
        assert!(init(&config).is_none());
        assert!(dir.path().join("store.log").exists());
    }
}
