// src/core/tasks.rs

//! Turning points of a [`CommandSpace`] into runnable tasks.

use crate::{
    CancellationToken,
    core::{
        radix::MultiRange,
        space::{ArgDict, CommandSpace},
    },
    system::{
        executor::{CapturedLine, ProcessRunner, RunOutcome, RunnerConfig, TimeoutKind},
        progress::Progress,
        sinks::OutputSinks,
    },
};
use chrono::{DateTime, Local, TimeDelta};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How a single task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The process ran to completion. `exit_code` is `None` when it died from a signal.
    Completed {
        /// Exit code reported by the OS.
        exit_code: Option<i32>,
    },
    /// Stopped by the idle or total timeout.
    TimedOut(TimeoutKind),
    /// Killed because the sweep was aborted.
    Cancelled,
    /// The process could not be run; the message has already been logged and printed.
    Faulted(String),
}

impl TaskOutcome {
    /// Completed with exit code 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { exit_code: Some(0) })
    }
}

/// One point of the sweep, ready to run.
#[derive(Debug, Clone)]
pub struct TaskExecutable {
    args: Vec<String>,
    dict: ArgDict,
    index: Vec<usize>,
    dims: Vec<usize>,
    linear: usize,
    total: usize,
    env: Option<Arc<HashMap<String, String>>>,
    started: Option<DateTime<Local>>,
    ended: Option<DateTime<Local>>,
    captured: Vec<CapturedLine>,
}

impl TaskExecutable {
    /// The full argument list, program first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The selected value of every axis, keyed by axis identifier.
    pub fn dict(&self) -> &ArgDict {
        &self.dict
    }

    /// Position on every axis.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Length of every axis.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Position in enumeration order.
    pub fn linear(&self) -> usize {
        self.linear
    }

    /// Tasks in the whole sweep.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Lines captured by the last [`execute`](Self::execute).
    pub fn captured(&self) -> &[CapturedLine] {
        &self.captured
    }

    /// The command as a copy-pasteable shell line.
    pub fn command_line(&self) -> String {
        shlex::try_join(self.args.iter().map(String::as_str))
            .unwrap_or_else(|_| self.args.join(" "))
    }

    /// `"{linear} / {total}, {index} / {dims}"`, e.g. `"4 / 6, [1, 1] / [2, 3]"`.
    pub fn status_line(&self) -> String {
        format!(
            "{} / {}, {:?} / {:?}",
            self.linear, self.total, self.index, self.dims
        )
    }

    /// Wall time of the last run, once it has ended.
    pub fn duration(&self) -> Option<TimeDelta> {
        Some(self.ended? - self.started?)
    }

    /// Runs the task to completion, timeout or cancellation.
    ///
    /// Runner failures do not escape: they are logged, written to `sinks` and returned as
    /// [`TaskOutcome::Faulted`] so the sweep can move on to the next task.
    pub async fn execute(
        &mut self,
        config: &RunnerConfig,
        sinks: &mut OutputSinks,
        cancellation: Option<&CancellationToken>,
    ) -> TaskOutcome {
        self.started = Some(Local::now());
        self.ended = None;

        let mut runner = ProcessRunner::new(&self.args, config);
        if let Some(env) = self.env.as_deref() {
            runner = runner.env(env);
        }
        if let Some(token) = cancellation {
            runner = runner.cancellation(token);
        }
        let result = runner.run(sinks).await;
        self.captured = runner.into_captured();

        match result {
            Ok(RunOutcome::Finished {
                started,
                ended,
                exit_code,
            }) => {
                self.started = Some(started);
                self.ended = Some(ended);
                if exit_code != Some(0) {
                    log::debug!("Task {} exited with {:?}", self.linear, exit_code);
                }
                TaskOutcome::Completed { exit_code }
            }
            Ok(RunOutcome::TimedOut(kind)) => {
                self.ended = Some(Local::now());
                sinks.println(&format!(
                    "Task {} terminated: {} timeout reached",
                    self.linear, kind
                ));
                TaskOutcome::TimedOut(kind)
            }
            Ok(RunOutcome::Cancelled) => {
                self.ended = Some(Local::now());
                TaskOutcome::Cancelled
            }
            Err(e) => {
                self.ended = Some(Local::now());
                let message = e.to_string();
                let report = format!("{:?}", anyhow::Error::new(e));
                log::error!("Task {} ({}) failed: {}", self.linear, self.command_line(), report);
                sinks.println(&format!("Error: {}", report));
                TaskOutcome::Faulted(message)
            }
        }
    }
}

/// Formats a duration as `H:MM:SS.mmm`.
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    let (secs, millis) = (millis / 1000, millis % 1000);
    format!(
        "{}:{:02}:{:02}.{:03}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60,
        millis
    )
}

/// Lazily produces one [`TaskExecutable`] per point of a [`CommandSpace`].
pub struct TaskIterator<'a> {
    space: &'a CommandSpace,
    indices: MultiRange,
    env: Option<Arc<HashMap<String, String>>>,
    progress: Option<Box<dyn Progress>>,
}

impl fmt::Debug for TaskIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskIterator")
            .field("position", &self.indices.position())
            .field("total", &self.indices.radix().total())
            .field("env", &self.env)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl<'a> TaskIterator<'a> {
    fn new(space: &'a CommandSpace, start: usize) -> Self {
        Self {
            space,
            indices: space.index_loop(start),
            env: None,
            progress: None,
        }
    }

    /// Environment overrides handed to every produced task.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(Arc::new(env));
        self
    }

    /// Attaches a progress display, advanced immediately past the skipped tasks.
    pub fn with_progress(mut self, mut progress: Box<dyn Progress>) -> Self {
        let skipped = self.indices.position().min(self.indices.radix().total());
        if skipped > 0 {
            progress.update(skipped);
        }
        self.progress = Some(progress);
        self
    }

    /// Number of tasks in the whole sweep, including skipped ones.
    pub fn total(&self) -> usize {
        self.indices.radix().total()
    }

    /// Linear index of the next task.
    pub fn position(&self) -> usize {
        self.indices.position()
    }

    fn close_progress(&mut self) {
        if let Some(mut progress) = self.progress.take() {
            progress.close();
        }
    }
}

impl Iterator for TaskIterator<'_> {
    type Item = TaskExecutable;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let linear = self.indices.position();
            let Some(index) = self.indices.next() else {
                self.close_progress();
                return None;
            };
            let rendered = self
                .space
                .render_args(&index)
                .and_then(|args| Ok((args, self.space.render_dict(&index)?)));
            let (args, dict) = match rendered {
                Ok(pair) => pair,
                Err(e) => {
                    log::error!("Skipping task {}: {}", linear, e);
                    continue;
                }
            };
            if let Some(progress) = self.progress.as_mut() {
                progress.update(1);
            }
            return Some(TaskExecutable {
                args,
                dict,
                dims: self.indices.radix().dims().to_vec(),
                index,
                linear,
                total: self.indices.radix().total(),
                env: self.env.clone(),
                started: None,
                ended: None,
                captured: Vec::new(),
            });
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl Drop for TaskIterator<'_> {
    fn drop(&mut self) {
        self.close_progress();
    }
}

impl CommandSpace {
    /// Enumerates runnable tasks from linear position `start`.
    pub fn executable_loop(&self, start: usize) -> TaskIterator<'_> {
        TaskIterator::new(self, start)
    }
}

// MARK: --- UNIT TESTS ---
