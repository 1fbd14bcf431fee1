//! Session logger: writes log output for the editing core to a single file.
//!
//! The file is **truncated at each `init`**, so it only ever contains output
//! from the most-recent session.
//!
//! Default location (see [`init`]):
//!   Windows:  `%APPDATA%\PaintFE\paintfe-core.log`
//!   Linux:    `~/.local/share/PaintFE/paintfe-core.log`
//!   macOS:    `~/Library/Application Support/PaintFE/paintfe-core.log`
//!
//! Hosts that embed the core and want the log elsewhere call [`init_at`].
//! Until one of the two is called every log macro is a silent no-op, so the
//! library never writes anywhere its host did not ask for.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Returns `true` once a log file has been opened.
pub fn is_initialized() -> bool {
    LOG_FILE.get().is_some()
}

/// Write a line to the session log.  Silently ignores I/O errors so that
/// logging never destabilises an edit.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Write a timestamped, level-tagged line to the session log.
pub fn write(level: &str, msg: &str) {
    if !is_initialized() {
        return;
    }
    let ts = timestamp();
    write_line(&format!("[{}] [{}] {}", ts, level, msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write("INFO", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write("WARN", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write("ERROR", &format!($($arg)*))
    };
}

/// Initialise the session logger at the platform data directory.
pub fn init() -> bool {
    init_at(&log_file_path())
}

/// Initialise the session logger at an explicit path.
///
/// * Creates (or truncates) the log file.
/// * Installs a panic hook that mirrors the panic message into the log
///   before running the previous handler.
///
/// Only the first successful call takes effect; later calls return `false`.
pub fn init_at(path: &Path) -> bool {
    if is_initialized() {
        return false;
    }

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path);

    match file {
        Ok(f) => {
            if LOG_FILE.set(Mutex::new(f)).is_err() {
                return false;
            }
            let _ = LOG_PATH.set(path.to_path_buf());
        }
        Err(e) => {
            // Can't open log file; not fatal, logging stays disabled
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return false;
        }
    }

    write_line(&format!(
        "=== paintfe-core session started {} ===",
        human_timestamp()
    ));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
    true
}

fn log_file_path() -> PathBuf {
    data_dir().join("PaintFE").join("paintfe-core.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS within the current UTC day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            let h = (secs % 86400) / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            format!("{:02}:{:02}:{:02}", h, m, s)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
