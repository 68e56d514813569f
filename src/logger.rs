//! Session logger: routes `tracing` output to a single file in the OS data
//! directory.
//!
//! The file is **truncated at each launch**, so it only ever holds output
//! from the most recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\PrintDesigner\printdesigner.log`
//!   Linux:    `~/.local/share/PrintDesigner/printdesigner.log`
//!   macOS:    `~/Library/Application Support/PrintDesigner/printdesigner.log`
//!
//! When the file cannot be opened, output goes to stderr instead.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Path of the current session log, once [`init`] opened it.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Install the global subscriber at `level` and a panic hook that records
/// panics in the log before running the default handler. Calling it again
/// is a no-op.
pub fn init(level: tracing::Level) {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);

    let installed = match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            tracing_subscriber::fmt()
                .with_writer(Mutex::new(f))
                .with_ansi(false)
                .with_max_level(level)
                .try_init()
                .is_ok()
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(level)
                .try_init()
                .is_ok()
        }
    };
    if !installed {
        return;
    }

    tracing::info!(log = %path.display(), version = env!("CARGO_PKG_VERSION"), "PrintDesigner session started");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("PrintDesigner").join("printdesigner.log")
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
            return PathBuf::from(home).join("Library").join("Application Support");
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
