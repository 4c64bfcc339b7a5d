// src/system/progress.rs

use colored::Colorize;
use std::io::{self, Write};
use std::time::Instant;

/// A progress display driven by the task iterator.
///
/// The iterator advances it once per produced task and closes it exactly once, when the
/// sweep is exhausted or abandoned.
pub trait Progress: Send {
    /// Advances the display by `count` units.
    fn update(&mut self, count: usize);
    /// Finalizes the display. No further updates follow.
    fn close(&mut self);
}

/// Renders `[done/total] pct% elapsed` on a single, rewritten stderr line.
#[derive(Debug)]
pub struct TerminalProgress {
    total: usize,
    done: usize,
    started: Instant,
    closed: bool,
}

impl TerminalProgress {
    /// Creates a display for a sweep of `total` tasks.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            started: Instant::now(),
            closed: false,
        }
    }

    /// Units reported so far.
    pub fn done(&self) -> usize {
        self.done
    }

    fn render(&self) -> String {
        let percent = if self.total == 0 {
            100
        } else {
            self.done.min(self.total) * 100 / self.total
        };
        format!(
            "{} {:>3}% {}",
            format!("[{}/{}]", self.done, self.total).cyan().bold(),
            percent,
            format!("{:.1}s", self.started.elapsed().as_secs_f64()).dimmed()
        )
    }
}

impl Progress for TerminalProgress {
    fn update(&mut self, count: usize) {
        if self.closed {
            return;
        }
        self.done = self.done.saturating_add(count);
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "\r{}", self.render());
        let _ = stderr.flush();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        eprintln!("\r{}", self.render());
    }
}
