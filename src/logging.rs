//! Run log setup. Records go to the log file named on the command line;
//! if that cannot be opened the run logs to stderr instead.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Open the run log for appending. Earlier runs' records are kept.
fn open_log(log_file: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(log_file)
}

/// Send every record for this run to `log_file`, one plain-text line each.
pub fn init_logging(log_file: &Path) -> io::Result<()> {
    let file = open_log(log_file)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    tracing::info!(log_file = %log_file.display(), "run log opened");
    Ok(())
}

pub fn init_logging_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}
