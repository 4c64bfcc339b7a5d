// src/core/sweep.rs

//! The sweep driver: runs every task of a [`TaskIterator`] one after the other.

use crate::{
    CancellationToken,
    core::tasks::{TaskIterator, TaskOutcome, format_elapsed},
    system::{executor::RunnerConfig, sinks::OutputSinks},
};
use serde::Serialize;
use thiserror::Error;

/// Returned through `anyhow` when a confirmed interrupt stopped the sweep, so the binary
/// can exit with 130 instead of reporting an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sweep aborted by user after {completed} of {total} tasks")]
pub struct SweepAborted {
    /// Tasks that ran to completion before the abort.
    pub completed: usize,
    /// Tasks in the whole sweep.
    pub total: usize,
}

/// How [`run_sweep`] runs and reports each task.
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Timeouts, environment handling and working directory for every task.
    pub runner: RunnerConfig,
    /// Print commands without running them.
    pub dry_run: bool,
    /// Print each command line before it runs.
    pub echo_commands: bool,
    /// Print the `i / total, [idx] / [dims]` status line before each task.
    pub echo_status: bool,
    /// Print the elapsed time after each task.
    pub echo_duration: bool,
}

impl SweepOptions {
    /// Options that print the command, status and duration of every task.
    pub fn verbose(runner: RunnerConfig) -> Self {
        Self {
            runner,
            dry_run: false,
            echo_commands: true,
            echo_status: true,
            echo_duration: true,
        }
    }
}

/// Counts of how the tasks of one sweep ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Tasks in the whole sweep, including any skipped by a start offset.
    pub total: usize,
    /// Tasks that ran to completion, whatever their exit code.
    pub completed: usize,
    /// Completed tasks that exited with a non-zero code or a signal.
    pub failed: usize,
    /// Tasks stopped by the idle or total timeout.
    pub timed_out: usize,
    /// The task that was killed by an abort, if any.
    pub cancelled_task: Option<usize>,
    /// Tasks the runner could not execute at all.
    pub faulted: usize,
    /// Whether a confirmed interrupt stopped the enumeration.
    pub aborted: bool,
    /// Tasks printed in dry-run mode.
    pub listed: usize,
}

impl SweepSummary {
    /// Whether every task was visited. Individual task failures do not count against it.
    pub fn enumeration_completed(&self) -> bool {
        !self.aborted
    }
}

/// Runs `tasks` sequentially.
///
/// The token is checked before each task and polled while one runs. A task that times
/// out, fails or cannot be spawned never stops the sweep; only a set token does.
pub async fn run_sweep(
    tasks: TaskIterator<'_>,
    options: &SweepOptions,
    sinks: &mut OutputSinks,
    token: &CancellationToken,
) -> SweepSummary {
    let mut summary = SweepSummary {
        total: tasks.total(),
        ..SweepSummary::default()
    };

    for mut task in tasks {
        if crate::is_cancelled(token) {
            log::info!("Sweep aborted before task {}", task.linear());
            summary.aborted = true;
            break;
        }

        if options.dry_run {
            sinks.println(&task.command_line());
            summary.listed += 1;
            continue;
        }
        if options.echo_commands {
            sinks.println(&task.command_line());
        }
        if options.echo_status {
            sinks.println(&task.status_line());
        }
        sinks.flush();

        log::debug!("Running task {} of {}", task.linear(), task.total());
        let outcome = task.execute(&options.runner, sinks, Some(token)).await;
        match &outcome {
            TaskOutcome::Completed { exit_code } => {
                summary.completed += 1;
                if *exit_code != Some(0) {
                    summary.failed += 1;
                }
            }
            TaskOutcome::TimedOut(_) => summary.timed_out += 1,
            TaskOutcome::Faulted(_) => summary.faulted += 1,
            TaskOutcome::Cancelled => {
                summary.cancelled_task = Some(task.linear());
                summary.aborted = true;
            }
        }

        if options.echo_duration
            && let Some(elapsed) = task.duration()
        {
            sinks.println(&format_elapsed(elapsed));
        }
        sinks.flush();

        if summary.aborted {
            break;
        }
    }

    log::info!(
        "Sweep finished: {} completed ({} failed), {} timed out, {} faulted, aborted: {}",
        summary.completed,
        summary.failed,
        summary.timed_out,
        summary.faulted,
        summary.aborted
    );
    summary
}

// MARK: --- UNIT TESTS ---

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::space::CommandSpace;
    use crate::system::sinks::MemorySink;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    fn memory_sinks() -> (MemorySink, OutputSinks) {
        let memory = MemorySink::new();
        let mut sinks = OutputSinks::new();
        sinks.push(memory.clone());
        (memory, sinks)
    }

    #[tokio::test]
    async fn test_runs_every_task_and_continues_past_failures() {
        let mut space = CommandSpace::new("/bin/sh -c").unwrap();
        space
            .arg(None, ["echo first", "exit 2", "echo third"])
            .unwrap();
        let (memory, mut sinks) = memory_sinks();

        let summary = run_sweep(
            space.executable_loop(0),
            &SweepOptions::default(),
            &mut sinks,
            &token(),
        )
        .await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 1);
        assert!(summary.enumeration_completed());
        assert_eq!(memory.contents(), "first\nthird\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_does_not_stop_the_sweep() {
        let mut space = CommandSpace::new("").unwrap();
        space
            .arg(None, ["gridrun-no-such-program", "true"])
            .unwrap();
        let (_memory, mut sinks) = memory_sinks();

        let summary = run_sweep(
            space.executable_loop(0),
            &SweepOptions::default(),
            &mut sinks,
            &token(),
        )
        .await;

        assert_eq!(summary.faulted, 1);
        assert_eq!(summary.completed, 1);
        assert!(!summary.aborted);
    }

    #[tokio::test]
    async fn test_verbose_output_frames_each_task() {
        let mut space = CommandSpace::new("echo").unwrap();
        space.arg(Some("--n"), [1, 2]).unwrap();
        let (memory, mut sinks) = memory_sinks();

        run_sweep(
            space.executable_loop(1),
            &SweepOptions::verbose(RunnerConfig::default()),
            &mut sinks,
            &token(),
        )
        .await;

        let lines: Vec<String> = memory.contents().lines().map(str::to_string).collect();
        assert_eq!(lines[0], "echo --n 2");
        assert_eq!(lines[1], "1 / 2, [1] / [2]");
        assert_eq!(lines[2], "--n 2");
        assert!(lines[3].starts_with("0:00:0"));
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test]
    async fn test_dry_run_lists_without_executing() {
        let mut space = CommandSpace::new("/bin/sh -c").unwrap();
        space.arg(None, ["exit 1", "exit 2"]).unwrap();
        let (memory, mut sinks) = memory_sinks();
        let options = SweepOptions {
            dry_run: true,
            ..SweepOptions::default()
        };

        let summary = run_sweep(space.executable_loop(0), &options, &mut sinks, &token()).await;

        assert_eq!(summary.listed, 2);
        assert_eq!(summary.completed, 0);
        assert_eq!(memory.contents(), "/bin/sh -c 'exit 1'\n/bin/sh -c 'exit 2'\n");
    }

    #[tokio::test]
    async fn test_set_token_stops_before_the_first_task() {
        let space = CommandSpace::new("true").unwrap();
        let stop = token();
        stop.store(true, Ordering::SeqCst);
        let (_memory, mut sinks) = memory_sinks();

        let summary = run_sweep(
            space.executable_loop(0),
            &SweepOptions::default(),
            &mut sinks,
            &stop,
        )
        .await;

        assert!(summary.aborted);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.cancelled_task, None);
    }

    #[tokio::test]
    async fn test_abort_mid_task_kills_it_and_stops_enumeration() {
        let mut space = CommandSpace::new("/bin/sh -c").unwrap();
        space.arg(None, ["exec sleep 5", "echo never"]).unwrap();
        let (memory, mut sinks) = memory_sinks();
        let stop = token();

        let trigger = Arc::clone(&stop);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.store(true, Ordering::SeqCst);
        });

        let began = std::time::Instant::now();
        let summary = run_sweep(
            space.executable_loop(0),
            &SweepOptions::default(),
            &mut sinks,
            &stop,
        )
        .await;

        assert!(began.elapsed() < Duration::from_secs(4));
        assert!(summary.aborted);
        assert_eq!(summary.cancelled_task, Some(0));
        assert!(!memory.contents().contains("never"));
    }

    fn is_alive(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            })
            .is_some_and(|state| state != 'Z' && state != 'X')
    }

    #[tokio::test]
    async fn test_abort_stops_descendants_of_the_running_task() {
        if !std::path::Path::new("/proc/self").exists() {
            return;
        }
        let mut space = CommandSpace::new("/bin/sh -c").unwrap();
        space
            .arg(None, ["sleep 30 >/dev/null 2>&1 & echo $!; wait", "echo never"])
            .unwrap();
        let (memory, mut sinks) = memory_sinks();
        let stop = token();

        let trigger = Arc::clone(&stop);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.store(true, Ordering::SeqCst);
        });

        let summary = run_sweep(
            space.executable_loop(0),
            &SweepOptions::default(),
            &mut sinks,
            &stop,
        )
        .await;

        assert_eq!(summary.cancelled_task, Some(0));
        let contents = memory.contents();
        let grandchild = contents.trim();
        assert!(!grandchild.is_empty());
        let mut gone = false;
        for _ in 0..40 {
            if !is_alive(grandchild) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "grandchild {} survived the abort", grandchild);
        assert!(!contents.contains("never"));
    }
}
