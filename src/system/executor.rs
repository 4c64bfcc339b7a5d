// src/system/executor.rs

//! Runs one task as a child process and captures its output.
//!
//! Both pipes are read from a single `tokio::select!` loop, one line at a time, so lines
//! from the same stream are never reordered or split. Every line is timestamped, kept
//! in memory, forwarded to the output sinks and handed to the optional line callback.
//!
//! A run ends in one of three ways: the child exits and both pipes are drained
//! ([`RunOutcome::Finished`]), no output arrives within the idle timeout or the total
//! timeout elapses ([`RunOutcome::TimedOut`]), or the cancellation token is set
//! ([`RunOutcome::Cancelled`]). In the last two cases the child's process group gets
//! SIGTERM, then SIGKILL once the grace period runs out, and the child is reaped
//! before `run` returns.

use crate::{
    CancellationToken,
    constants::{CANCELLATION_POLL_MS, DEFAULT_IDLE_TIMEOUT_SECS, TERMINATE_GRACE_MS},
    system::sinks::OutputSinks,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{Instant, MissedTickBehavior};

#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{Signal, killpg},
    unistd::Pid,
};

/// Failures of the runner itself, as opposed to a task that ran and failed.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The argument list was empty.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The program could not be started.
    #[error("Command '{command}' could not be executed: {source}")]
    Spawn {
        /// The command line as typed.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A pipe requested at spawn time was not there.
    #[error("Command '{command}' was started without a {stream} pipe.")]
    MissingPipe {
        /// The command line as typed.
        command: String,
        /// The missing pipe.
        stream: Stream,
    },
    /// Reading a pipe failed. The child is terminated before this is returned.
    #[error("Reading {stream} of command '{command}' failed: {source}")]
    Read {
        /// The command line as typed.
        command: String,
        /// The pipe that failed.
        stream: Stream,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Collecting the exit status failed.
    #[error("Waiting for command '{command}' failed: {source}")]
    Wait {
        /// The command line as typed.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// The pipe a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// One line of child output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedLine {
    /// The line as written by the child, including its `\n` when there was one.
    pub text: String,
    /// The pipe it came from.
    pub stream: Stream,
    /// When it was read.
    pub at: DateTime<Local>,
}

impl CapturedLine {
    /// The text without its line terminator.
    pub fn trimmed(&self) -> &str {
        self.text.trim_end_matches(['\n', '\r'])
    }
}

/// How environment overrides combine with the inherited environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// Overrides are applied on top of the inherited environment.
    #[default]
    Merge,
    /// The child sees only the overrides.
    Replace,
}

/// Which limit ended a run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutKind {
    /// No output for the whole idle window.
    Idle,
    /// The run exceeded its total time budget.
    Total,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Total => "total",
        })
    }
}

/// Result of one process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited and its output was drained.
    Finished {
        /// When the child was spawned.
        started: DateTime<Local>,
        /// When its exit was observed.
        ended: DateTime<Local>,
        /// `None` when the child was ended by a signal.
        exit_code: Option<i32>,
    },
    /// A timeout fired; the child was killed and reaped.
    TimedOut(TimeoutKind),
    /// The cancellation token was set; the child was killed and reaped.
    Cancelled,
}

/// Knobs for [`ProcessRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Longest wait for the next line before the child is treated as stalled.
    pub idle_timeout: Duration,
    /// Optional wall-clock budget for the whole run.
    pub total_timeout: Option<Duration>,
    /// How [`ProcessRunner::env`] overrides are applied.
    pub env_mode: EnvMode,
    /// Working directory for the child. Defaults to the current one.
    pub cwd: Option<PathBuf>,
    /// Start the child in its own process group so a terminal Ctrl+C reaches only
    /// this runner, which then asks before killing anything. Termination signals the
    /// whole group, so descendants of the child stop with it.
    pub own_process_group: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            total_timeout: None,
            env_mode: EnvMode::Merge,
            cwd: None,
            own_process_group: true,
        }
    }
}

/// Reads one pipe line by line.
///
/// `read_until` keeps partially read bytes in `buf` when its future is dropped by
/// `select!`, so a line interrupted by another branch is completed on the next call.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
            done: false,
        }
    }

    /// The next line, or `None` once the pipe is at end of stream.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            self.done = true;
            if self.buf.is_empty() {
                return Ok(None);
            }
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

type LineCallback<'a> = Box<dyn FnMut(&CapturedLine) + Send + 'a>;

/// Executes one fully rendered command and captures its output.
pub struct ProcessRunner<'a> {
    args: &'a [String],
    config: &'a RunnerConfig,
    env: Option<&'a HashMap<String, String>>,
    cancellation: Option<&'a CancellationToken>,
    on_line: Option<LineCallback<'a>>,
    captured: Vec<CapturedLine>,
}

impl fmt::Debug for ProcessRunner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("args", &self.args)
            .field("config", &self.config)
            .field("env", &self.env)
            .field("captured", &self.captured.len())
            .finish_non_exhaustive()
    }
}

impl<'a> ProcessRunner<'a> {
    /// A runner for `args`; the first element is the program.
    pub fn new(args: &'a [String], config: &'a RunnerConfig) -> Self {
        Self {
            args,
            config,
            env: None,
            cancellation: None,
            on_line: None,
            captured: Vec::new(),
        }
    }

    /// Environment overrides, applied according to [`RunnerConfig::env_mode`].
    pub fn env(mut self, env: &'a HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// A token that, once set, kills the child at the next poll.
    pub fn cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Called with every captured line, after it has been written to the sinks.
    pub fn on_line(mut self, callback: impl FnMut(&CapturedLine) + Send + 'a) -> Self {
        self.on_line = Some(Box::new(callback));
        self
    }

    /// Every line captured so far, in the order it was read.
    pub fn captured(&self) -> &[CapturedLine] {
        &self.captured
    }

    /// Consumes the runner, returning the captured lines.
    pub fn into_captured(self) -> Vec<CapturedLine> {
        self.captured
    }

    /// Spawns the child and pumps its output until it finishes, stalls or is cancelled.
    pub async fn run(&mut self, sinks: &mut OutputSinks) -> Result<RunOutcome, RunnerError> {
        let (program, rest) = self.args.split_first().ok_or(RunnerError::EmptyCommand)?;
        let command_line = self.args.join(" ");

        let mut child = self
            .build_command(program, rest)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: command_line.clone(),
                source,
            })?;
        let started = Local::now();
        log::debug!("Started '{}' (pid {:?})", command_line, child.id());
        // With process_group(0) the group id is the child's pid.
        let group = if self.config.own_process_group {
            child.id()
        } else {
            None
        };

        let stdout = child.stdout.take().ok_or_else(|| RunnerError::MissingPipe {
            command: command_line.clone(),
            stream: Stream::Stdout,
        })?;
        let stderr = child.stderr.take().ok_or_else(|| RunnerError::MissingPipe {
            command: command_line.clone(),
            stream: Stream::Stderr,
        })?;
        let mut out = LineReader::new(stdout);
        let mut err = LineReader::new(stderr);

        let idle = self.config.idle_timeout;
        let mut idle_deadline = Instant::now() + idle;
        let total_deadline = self.config.total_timeout.map(|t| Instant::now() + t);
        let mut poll = tokio::time::interval(Duration::from_millis(CANCELLATION_POLL_MS));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut exit_status: Option<ExitStatus> = None;

        while !(out.done && err.done) {
            tokio::select! {
                read = out.next_line(), if !out.done => {
                    idle_deadline = Instant::now() + idle;
                    if let Err(source) = self.accept(read, Stream::Stdout, sinks) {
                        terminate(&mut child, group, &command_line).await;
                        return Err(RunnerError::Read { command: command_line, stream: Stream::Stdout, source });
                    }
                }
                read = err.next_line(), if !err.done => {
                    idle_deadline = Instant::now() + idle;
                    if let Err(source) = self.accept(read, Stream::Stderr, sinks) {
                        terminate(&mut child, group, &command_line).await;
                        return Err(RunnerError::Read { command: command_line, stream: Stream::Stderr, source });
                    }
                }
                status = child.wait(), if exit_status.is_none() => {
                    let status = status.map_err(|source| RunnerError::Wait {
                        command: command_line.clone(),
                        source,
                    })?;
                    log::trace!("'{}' exited with {}; draining its output", command_line, status);
                    exit_status = Some(status);
                }
                () = tokio::time::sleep_until(idle_deadline) => {
                    if exit_status.is_some() {
                        // A grandchild inherited the pipes; the task itself is done.
                        log::debug!("'{}' exited but its pipes are still open; stop draining", command_line);
                        break;
                    }
                    log::warn!("No output from '{}' for {:?}; terminating it.", command_line, idle);
                    terminate(&mut child, group, &command_line).await;
                    return Ok(RunOutcome::TimedOut(TimeoutKind::Idle));
                }
                () = tokio::time::sleep_until(total_deadline.unwrap_or(idle_deadline)), if total_deadline.is_some() => {
                    if exit_status.is_some() {
                        break;
                    }
                    log::warn!("'{}' exceeded its total time budget; terminating it.", command_line);
                    terminate(&mut child, group, &command_line).await;
                    return Ok(RunOutcome::TimedOut(TimeoutKind::Total));
                }
                _ = poll.tick(), if self.cancellation.is_some() => {
                    if self.cancellation.is_some_and(crate::is_cancelled) {
                        log::info!("Cancellation requested, terminating '{}' (pid {:?})", command_line, child.id());
                        terminate(&mut child, group, &command_line).await;
                        return Ok(RunOutcome::Cancelled);
                    }
                }
            }
        }

        let status = match exit_status {
            Some(status) => status,
            None => child.wait().await.map_err(|source| RunnerError::Wait {
                command: command_line.clone(),
                source,
            })?,
        };
        let ended = Local::now();
        log::debug!("'{}' finished with {}", command_line, status);

        Ok(RunOutcome::Finished {
            started,
            ended,
            exit_code: status.code(),
        })
    }

    fn build_command(&self, program: &str, rest: &[String]) -> Command {
        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.config.cwd {
            command.current_dir(dunce::simplified(cwd));
        }
        if let Some(env) = self.env {
            if self.config.env_mode == EnvMode::Replace {
                command.env_clear();
            }
            command.envs(env);
        }
        #[cfg(unix)]
        if self.config.own_process_group {
            command.process_group(0);
        }
        command
    }

    /// Records a successful read. End of stream is skipped, not recorded.
    fn accept(
        &mut self,
        read: std::io::Result<Option<String>>,
        stream: Stream,
        sinks: &mut OutputSinks,
    ) -> std::io::Result<()> {
        match read? {
            Some(text) => self.record(text, stream, sinks),
            None => log::trace!("{} reached end of stream", stream),
        }
        Ok(())
    }

    fn record(&mut self, text: String, stream: Stream, sinks: &mut OutputSinks) {
        let line = CapturedLine {
            text,
            stream,
            at: Local::now(),
        };
        sinks.write_raw(&line.text);
        if let Some(on_line) = self.on_line.as_mut() {
            on_line(&line);
        }
        self.captured.push(line);
    }
}

/// Stops the child and reaps it.
///
/// With a process group, the group gets SIGTERM first and SIGKILL after the grace
/// period. Without one, only the child is killed.
async fn terminate(child: &mut Child, group: Option<u32>, command_line: &str) {
    #[cfg(unix)]
    if let Some(pgid) = group {
        terminate_group(child, pgid, command_line).await;
        return;
    }
    #[cfg(not(unix))]
    let _ = group;

    if let Err(e) = child.kill().await {
        log::warn!(
            "Failed to kill child process {:?} ('{}'): {}",
            child.id(),
            command_line,
            e
        );
    }
}

#[cfg(unix)]
async fn terminate_group(child: &mut Child, pgid: u32, command_line: &str) {
    signal_group(pgid, Signal::SIGTERM, command_line);

    let grace = Duration::from_millis(TERMINATE_GRACE_MS);
    let reaped = match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            log::debug!("'{}' stopped with {} after SIGTERM", command_line, status);
            true
        }
        Ok(Err(e)) => {
            log::warn!("Waiting for '{}' after SIGTERM failed: {}", command_line, e);
            false
        }
        Err(_) => {
            log::warn!(
                "'{}' still running {:?} after SIGTERM; killing process group {}",
                command_line,
                grace,
                pgid
            );
            false
        }
    };

    // Members of the group can outlive its leader.
    signal_group(pgid, Signal::SIGKILL, command_line);
    if !reaped && let Err(e) = child.kill().await {
        log::warn!(
            "Failed to kill child process {:?} ('{}'): {}",
            child.id(),
            command_line,
            e
        );
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: Signal, command_line: &str) {
    let Ok(raw) = i32::try_from(pgid) else {
        log::warn!("Process group id {} of '{}' is out of range", pgid, command_line);
        return;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => log::trace!("Sent {:?} to process group {}", signal, pgid),
        Err(Errno::ESRCH) => log::trace!("Process group {} has already exited", pgid),
        Err(e) => log::warn!(
            "Failed to send {:?} to process group {} ('{}'): {}",
            signal,
            pgid,
            command_line,
            e
        ),
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::system::sinks::MemorySink;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn config_with_idle(millis: u64) -> RunnerConfig {
        RunnerConfig {
            idle_timeout: Duration::from_millis(millis),
            ..RunnerConfig::default()
        }
    }

    /// Zombies count as gone: an orphan is reaped by whatever adopted it, not by us.
    fn is_alive(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z' && state != 'X'),
            Err(_) if std::path::Path::new("/proc/self").exists() => false,
            Err(_) => std::process::Command::new("kill")
                .args(["-0", pid])
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false),
        }
    }

    async fn is_gone_soon(pid: &str) -> bool {
        for _ in 0..40 {
            if !is_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    const BACKGROUND_SLEEPER: &str = "sleep 30 >/dev/null 2>&1 & echo $!; wait";

    #[tokio::test]
    async fn test_captures_lines_verbatim_per_stream() {
        let args = sh(r#"printf 'one\ntwo\n'; printf 'err\n' 1>&2; printf 'tail'"#);
        let config = config_with_idle(5_000);
        let memory = MemorySink::new();
        let mut sinks = OutputSinks::new();
        sinks.push(memory.clone());

        let mut runner = ProcessRunner::new(&args, &config);
        let outcome = runner.run(&mut sinks).await.unwrap();

        match outcome {
            RunOutcome::Finished {
                started,
                ended,
                exit_code,
            } => {
                assert_eq!(exit_code, Some(0));
                assert!(started <= ended);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let lines = runner.captured();
        let stdout: Vec<&str> = lines
            .iter()
            .filter(|l| l.stream == Stream::Stdout)
            .map(|l| l.text.as_str())
            .collect();
        let stderr: Vec<&str> = lines
            .iter()
            .filter(|l| l.stream == Stream::Stderr)
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(stdout, vec!["one\n", "two\n", "tail"]);
        assert_eq!(stderr, vec!["err\n"]);
        assert!(lines.windows(2).all(|w| w[0].at <= w[1].at));

        let written = memory.contents();
        for line in lines {
            assert!(written.contains(line.text.as_str()));
        }
        assert_eq!(written.len(), "one\ntwo\nerr\ntail".len());
    }

    #[tokio::test]
    async fn test_reports_non_zero_exit_code() {
        let args = sh("echo failing; exit 3");
        let config = config_with_idle(5_000);
        let mut runner = ProcessRunner::new(&args, &config);
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Finished {
                exit_code: Some(3),
                ..
            }
        ));
        assert_eq!(runner.captured()[0].trimmed(), "failing");
    }

    #[tokio::test]
    async fn test_idle_timeout_kills_and_reaps_the_child() {
        let args = sh("echo $$; exec sleep 5");
        let config = config_with_idle(300);
        let mut runner = ProcessRunner::new(&args, &config);

        let began = std::time::Instant::now();
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::TimedOut(TimeoutKind::Idle));
        assert!(began.elapsed() < Duration::from_secs(4));
        let pid = runner.captured()[0].trimmed().to_string();
        assert!(!is_alive(&pid), "process {} is still alive", pid);
    }

    #[tokio::test]
    async fn test_idle_timeout_stops_backgrounded_descendants() {
        let args = sh(BACKGROUND_SLEEPER);
        let config = config_with_idle(300);
        let mut runner = ProcessRunner::new(&args, &config);

        let began = std::time::Instant::now();
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::TimedOut(TimeoutKind::Idle));
        assert!(began.elapsed() < Duration::from_secs(4));
        let grandchild = runner.captured()[0].trimmed().to_string();
        assert!(is_gone_soon(&grandchild).await, "grandchild {} survived", grandchild);
    }

    #[tokio::test]
    async fn test_sigterm_gives_the_child_a_chance_to_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            cwd: Some(dir.path().to_path_buf()),
            ..config_with_idle(300)
        };
        let args = sh("trap 'echo stopped > term.txt; exit 0' TERM; echo ready; while true; do sleep 0.1; done");
        let mut runner = ProcessRunner::new(&args, &config);

        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::TimedOut(TimeoutKind::Idle));
        let marker = std::fs::read_to_string(dir.path().join("term.txt")).unwrap();
        assert_eq!(marker, "stopped\n");
    }

    #[tokio::test]
    async fn test_child_ignoring_sigterm_is_killed_after_the_grace_period() {
        let args = sh("trap '' TERM; echo $$; while true; do sleep 0.1; done");
        let config = config_with_idle(300);
        let mut runner = ProcessRunner::new(&args, &config);

        let began = std::time::Instant::now();
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();
        let elapsed = began.elapsed();

        assert_eq!(outcome, RunOutcome::TimedOut(TimeoutKind::Idle));
        assert!(elapsed >= Duration::from_millis(TERMINATE_GRACE_MS));
        assert!(elapsed < Duration::from_millis(TERMINATE_GRACE_MS) + Duration::from_secs(3));
        let pid = runner.captured()[0].trimmed().to_string();
        assert!(!is_alive(&pid), "process {} is still alive", pid);
    }

    #[tokio::test]
    async fn test_steady_output_is_not_an_idle_timeout() {
        let args = sh("for i in 1 2 3 4; do echo $i; sleep 0.2; done");
        let config = config_with_idle(1_000);
        let mut runner = ProcessRunner::new(&args, &config);
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Finished { .. }));
        assert_eq!(runner.captured().len(), 4);
    }

    #[tokio::test]
    async fn test_total_timeout_ends_a_chatty_child() {
        let args = sh("while true; do echo tick; sleep 0.05; done");
        let config = RunnerConfig {
            idle_timeout: Duration::from_secs(5),
            total_timeout: Some(Duration::from_millis(400)),
            ..RunnerConfig::default()
        };
        let mut runner = ProcessRunner::new(&args, &config);
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::TimedOut(TimeoutKind::Total));
        assert!(!runner.captured().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_child() {
        let args = sh("echo $$; exec sleep 5");
        let config = config_with_idle(10_000);
        let token: CancellationToken = Arc::new(AtomicBool::new(false));

        let trigger = Arc::clone(&token);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.store(true, Ordering::SeqCst);
        });

        let mut runner = ProcessRunner::new(&args, &config).cancellation(&token);
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        let pid = runner.captured()[0].trimmed().to_string();
        assert!(!is_alive(&pid));
    }

    #[tokio::test]
    async fn test_cancellation_stops_backgrounded_descendants() {
        let args = sh(BACKGROUND_SLEEPER);
        let config = config_with_idle(10_000);
        let token: CancellationToken = Arc::new(AtomicBool::new(false));

        let trigger = Arc::clone(&token);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.store(true, Ordering::SeqCst);
        });

        let began = std::time::Instant::now();
        let mut runner = ProcessRunner::new(&args, &config).cancellation(&token);
        let outcome = runner.run(&mut OutputSinks::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(began.elapsed() < Duration::from_secs(4));
        let grandchild = runner.captured()[0].trimmed().to_string();
        assert!(is_gone_soon(&grandchild).await, "grandchild {} survived", grandchild);
    }

    #[tokio::test]
    async fn test_callback_sees_every_line() {
        let args = sh("echo a; echo b 1>&2; echo c");
        let config = config_with_idle(5_000);
        let mut seen = Vec::new();
        {
            let mut runner =
                ProcessRunner::new(&args, &config).on_line(|line| seen.push((line.trimmed().to_string(), line.stream)));
            runner.run(&mut OutputSinks::new()).await.unwrap();
        }
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), Stream::Stdout),
                ("b".to_string(), Stream::Stderr),
                ("c".to_string(), Stream::Stdout),
            ]
        );
    }

    #[tokio::test]
    async fn test_env_merge_and_replace() {
        let args = vec!["/usr/bin/env".to_string()];
        let env = HashMap::from([("GRIDRUN_TEST_VAR".to_string(), "x".to_string())]);

        let merge = config_with_idle(5_000);
        let mut runner = ProcessRunner::new(&args, &merge).env(&env);
        runner.run(&mut OutputSinks::new()).await.unwrap();
        let merged: Vec<&str> = runner.captured().iter().map(CapturedLine::trimmed).collect();
        assert!(merged.contains(&"GRIDRUN_TEST_VAR=x"));
        assert!(merged.len() > 1);

        let replace = RunnerConfig {
            env_mode: EnvMode::Replace,
            ..config_with_idle(5_000)
        };
        let mut runner = ProcessRunner::new(&args, &replace).env(&env);
        runner.run(&mut OutputSinks::new()).await.unwrap();
        let replaced: Vec<&str> = runner.captured().iter().map(CapturedLine::trimmed).collect();
        assert_eq!(replaced, vec!["GRIDRUN_TEST_VAR=x"]);
    }

    #[tokio::test]
    async fn test_runs_in_the_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let config = RunnerConfig {
            cwd: Some(dir.path().to_path_buf()),
            ..config_with_idle(5_000)
        };
        let args = sh("ls");
        let mut runner = ProcessRunner::new(&args, &config);
        runner.run(&mut OutputSinks::new()).await.unwrap();
        assert_eq!(runner.captured()[0].trimmed(), "marker.txt");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let args = vec!["gridrun-definitely-not-a-program".to_string()];
        let config = RunnerConfig::default();
        let mut runner = ProcessRunner::new(&args, &config);
        let result = runner.run(&mut OutputSinks::new()).await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        let args: Vec<String> = Vec::new();
        let config = RunnerConfig::default();
        let mut runner = ProcessRunner::new(&args, &config);
        let result = runner.run(&mut OutputSinks::new()).await;
        assert!(matches!(result, Err(RunnerError::EmptyCommand)));
    }
}
