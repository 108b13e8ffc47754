//! Logging Infrastructure
//!
//! Structured logging setup. `RUST_LOG` takes precedence over the configured level.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_subscriber::EnvFilter;

/// Prefix of the daily rolling log files (`staffdesk.YYYY-MM-DD`)
pub const LOG_FILE_PREFIX: &str = "staffdesk";

/// Initialize the logger
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional JSON format and daily file output
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file_appender = log_dir
        .and_then(prepare_log_dir)
        .map(|dir| tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));

    let result = match (file_appender, json.unwrap_or(false)) {
        (Some(appender), true) => builder.json().with_writer(appender).try_init(),
        (Some(appender), false) => builder.with_ansi(false).with_writer(appender).try_init(),
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logger already initialized: {e}");
    }
}

/// 日志目录不存在时创建；创建失败则只输出到终端
fn prepare_log_dir(dir: &str) -> Option<&str> {
    let path = Path::new(dir);
    if !path.exists()
        && let Err(e) = std::fs::create_dir_all(path)
    {
        eprintln!("Cannot create log directory {dir}: {e}");
        return None;
    }
    Some(dir)
}

/// Clean up old log files
///
/// Removes `staffdesk.*` files last modified more than `days` days ago and
/// returns how many were removed. Other files in the directory are left alone.
pub fn cleanup_old_logs(log_dir: &str, days: u64) -> std::io::Result<usize> {
    let path = Path::new(log_dir);
    if !path.is_dir() {
        return Ok(0);
    }

    let max_age = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age > max_age {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str, age_days: u64) {
        let file = File::create(dir.join(name)).unwrap();
        let modified = SystemTime::now() - Duration::from_secs(age_days * 24 * 60 * 60);
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn test_cleanup_removes_only_expired_log_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "staffdesk.2024-01-01", 30);
        touch(dir.path(), "staffdesk.2024-05-13", 1);
        touch(dir.path(), "notes.txt", 30);

        let removed = cleanup_old_logs(dir.path().to_str().unwrap(), 14).unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("staffdesk.2024-01-01").exists());
        assert!(dir.path().join("staffdesk.2024-05-13").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_with_huge_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "staffdesk.2020-01-01", 3650);

        assert_eq!(cleanup_old_logs(dir.path().to_str().unwrap(), u64::MAX).unwrap(), 0);
        assert!(dir.path().join("staffdesk.2020-01-01").exists());
    }

    #[test]
    fn test_cleanup_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(cleanup_old_logs(missing.to_str().unwrap(), 1).unwrap(), 0);
    }

    #[test]
    fn test_prepare_log_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs/desk");
        assert!(prepare_log_dir(nested.to_str().unwrap()).is_some());
        assert!(nested.is_dir());
    }
}
