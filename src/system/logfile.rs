// src/system/logfile.rs

//! Per-run log files: `<base_dir>/<exp_name>/<prefix><timestamp><suffix>`.

use crate::constants::{DEFAULT_LOG_SUFFIX, DEFAULT_LOG_TIME_FORMAT};
use chrono::Local;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a log file could not be created.
#[derive(Error, Debug)]
pub enum LogFileError {
    /// The base directory must already exist; only the experiment directory is created.
    #[error("Log base directory '{0}' does not exist.")]
    BaseDirMissing(PathBuf),
    /// `time_format` contains a specifier chrono cannot render.
    #[error("Invalid time format '{0}' for log file names.")]
    TimeFormat(String),
    /// Creating the directory or writing the file failed.
    #[error("I/O error on log file '{path}': {source}")]
    Io {
        /// The directory or file being created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// How the log file is named and what it starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileOptions {
    /// Prepended to the timestamp.
    pub prefix: String,
    /// `strftime` format for the timestamp part of the name.
    pub time_format: String,
    /// Appended to the timestamp, `.log` by default.
    pub suffix: String,
    /// Written first, followed by a blank line. Typically the sweep definition itself,
    /// so every log records what produced it.
    pub header: Option<String>,
}

impl Default for LogFileOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            time_format: DEFAULT_LOG_TIME_FORMAT.to_string(),
            suffix: DEFAULT_LOG_SUFFIX.to_string(),
            header: None,
        }
    }
}

/// Creates a fresh log file for `exp_name` under `base_dir`.
///
/// `base_dir` must already exist; the experiment directory inside it is created when
/// missing. Returns the file's path together with the open handle.
pub fn create_log_file(
    exp_name: &str,
    base_dir: &Path,
    options: &LogFileOptions,
) -> Result<(PathBuf, File), LogFileError> {
    if !base_dir.is_dir() {
        return Err(LogFileError::BaseDirMissing(base_dir.to_path_buf()));
    }
    let dir = base_dir.join(exp_name);
    fs::create_dir_all(&dir).map_err(|source| LogFileError::Io {
        path: dir.clone(),
        source,
    })?;

    // `format` panics on a bad specifier when displayed; `write!` reports it instead.
    let mut stamp = String::new();
    write!(stamp, "{}", Local::now().format(&options.time_format))
        .map_err(|_| LogFileError::TimeFormat(options.time_format.clone()))?;

    let path = dir.join(format!("{}{}{}", options.prefix, stamp, options.suffix));
    let mut file = File::create(&path).map_err(|source| LogFileError::Io {
        path: path.clone(),
        source,
    })?;

    if let Some(header) = &options.header {
        file.write_all(header.as_bytes())
            .and_then(|()| file.write_all(b"\n\n"))
            .map_err(|source| LogFileError::Io {
                path: path.clone(),
                source,
            })?;
    }
    log::info!("Logging to {}", path.display());
    Ok((path, file))
}

// MARK: --- UNIT TESTS ---
