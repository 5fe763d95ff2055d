// src/logging.rs
//
// Diagnostics for the I/O layer. Every line goes to stderr with a local
// `HH:MM:SS.mmm` stamp and, while a log file is attached, to that file too.
// Transports tag their lines with the device, e.g. `[uart:/dev/ttyUSB0]`.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Name of the link that tracks the newest log file
const LATEST_LINK: &str = "serial-wiring.log";

static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

fn log_file() -> MutexGuard<'static, Option<File>> {
    LOG_FILE.lock().unwrap_or_else(|e| e.into_inner())
}

fn timestamp() -> impl fmt::Display {
    chrono::Local::now().format("%H:%M:%S%.3f")
}

/// Write one stamped line. Use `tlog!` rather than calling this directly.
#[doc(hidden)]
pub fn emit(args: fmt::Arguments<'_>) {
    let line = format!("{} {}", timestamp(), args);
    eprintln!("{}", line);
    if let Some(file) = log_file().as_mut() {
        let _ = writeln!(file, "{}", line);
    }
}

/// Attach a fresh `YYYYmmdd-HHMMSS-serial-wiring.log` in `log_dir` and return
/// its path. On Unix `serial-wiring.log` is relinked to it.
pub fn init_file_logging(log_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let name = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-serial-wiring.log")
        .to_string();
    let path = log_dir.join(&name);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    #[cfg(unix)]
    {
        let link = log_dir.join(LATEST_LINK);
        let _ = std::fs::remove_file(&link);
        if let Err(e) = std::os::unix::fs::symlink(&name, &link) {
            emit(format_args!("[logging] Could not link {}: {}", LATEST_LINK, e));
        }
    }

    *log_file() = Some(file);
    emit(format_args!("[logging] Logging to {}", path.display()));
    Ok(path)
}

/// Detach the log file; stderr output continues.
pub fn stop_file_logging() {
    if log_file().take().is_some() {
        emit(format_args!("[logging] File logging stopped"));
    }
}

pub fn is_file_logging() -> bool {
    log_file().is_some()
}

/// Timestamped diagnostics line, `format!` syntax.
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::emit(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_mirrors_tlog() {
        let dir = std::env::temp_dir().join(format!("serial-wiring-log-{}", std::process::id()));
        let log_path = init_file_logging(&dir).expect("init logging");
        assert!(is_file_logging());

        tlog!("[test] hello {}", 42);
        stop_file_logging();
        assert!(!is_file_logging());
        tlog!("[test] after stop");

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("[test] hello 42"));
        assert!(!contents.contains("[test] after stop"));

        #[cfg(unix)]
        assert_eq!(
            std::fs::read_link(dir.join(LATEST_LINK)).unwrap(),
            PathBuf::from(log_path.file_name().unwrap())
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
