//! Tracing initialisation for the binary
//!
//! Logs go to stderr, filtered by `RUST_LOG` (falling back to the given
//! level), and are mirrored without ANSI colours into a log file under the
//! data directory.

use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the lifetime of the program. Only the first call takes effect.
pub fn init_logging(json: bool, level: Level, log_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (file_writer, guard) = match log_path.and_then(open_log_file) {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
            .ok();
    }

    guard
}

fn open_log_file(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    let dir = path.parent()?;
    let file_name = path.file_name()?;
    std::fs::create_dir_all(dir).ok()?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_log_file_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/compat-verify.log");

        let opened = open_log_file(&path);

        assert!(opened.is_some());
        assert!(temp_dir.path().join("nested").is_dir());
    }

    #[test]
    fn open_log_file_rejects_path_without_file_name() {
        assert!(open_log_file(Path::new("/")).is_none());
    }

    #[test]
    fn init_logging_can_be_called_twice() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("compat-verify.log");

        let _first = init_logging(false, Level::INFO, Some(&path));
        let _second = init_logging(true, Level::DEBUG, None);
    }
}
