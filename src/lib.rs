//! # gridrun
//!
//! Runs a command once for every combination of its argument values.
//!
//! A [`CommandSpace`](core::space::CommandSpace) holds a base program and an ordered list
//! of axes (fixed values, flag/value lists, positional lists and on/off switches). Its
//! points are enumerated in mixed-radix order, turned into
//! [`TaskExecutable`](core::tasks::TaskExecutable)s and executed one at a time by the
//! [`ProcessRunner`](system::executor::ProcessRunner), which captures stdout and stderr
//! line by line and enforces an idle timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared abort flag. Set once, by a confirmed interrupt; never cleared.
pub type CancellationToken = Arc<AtomicBool>;

/// A fresh, unset token.
pub fn new_cancellation_token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

/// Whether `token` has been set.
pub fn is_cancelled(token: &CancellationToken) -> bool {
    token.load(Ordering::SeqCst)
}

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
