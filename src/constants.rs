// src/constants.rs

/// Default idle timeout, in seconds, for a task that produces no output.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// How often a running task checks the cancellation token, in milliseconds.
pub const CANCELLATION_POLL_MS: u64 = 100;

/// How long a terminated task gets to exit after SIGTERM before it is killed, in milliseconds.
pub const TERMINATE_GRACE_MS: u64 = 2_000;

/// `strftime` format used in log file names.
pub const DEFAULT_LOG_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Extension appended to log file names.
pub const DEFAULT_LOG_SUFFIX: &str = ".log";

/// Exit code used when the user confirms an interrupt, as a shell would after Ctrl+C.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Prompt shown by the interactive interrupt confirmation.
pub const EXIT_PROMPT: &str = "Do you really want to exit?";
