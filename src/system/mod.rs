//! # System Interaction Layer
//!
//! Everything that touches the operating system while a sweep runs.
//!
//! ## Modules
//!
//! - **`executor`**: Spawns one task, multiplexes its stdout and stderr line by line and
//!   enforces the idle and total timeouts and cancellation.
//! - **`interrupt`**: Turns Ctrl+C into a confirmation prompt and, on "yes", a set
//!   cancellation token.
//! - **`logfile`**: Creates the timestamped per-run log file.
//! - **`progress`**: The progress display advanced by the task iterator.
//! - **`sinks`**: Where captured output is written.

pub mod executor;
pub mod interrupt;
pub mod logfile;
pub mod progress;
pub mod sinks;
