// src/cli/handlers/run.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    CancellationToken,
    cli::handlers::commons,
    core::sweep::{SweepAborted, SweepOptions, SweepSummary, run_sweep},
    system::{
        interrupt::{AlwaysAbort, DialoguerConfirm, ExitConfirm, spawn_interrupt_watcher},
        logfile::{LogFileOptions, create_log_file},
        progress::TerminalProgress,
        sinks::OutputSinks,
    },
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Runs every task of a sweep file.")]
struct RunArgs {
    /// Path to the sweep definition (TOML).
    file: PathBuf,

    /// Linear index to start from. Overrides `start` in the file.
    #[arg(long)]
    start: Option<usize>,

    /// Print the commands without running them.
    #[arg(long)]
    dry_run: bool,

    /// Do not show the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Do not write a log file, even if `log_dir` is set.
    #[arg(long)]
    no_log: bool,

    /// Keep task output off the terminal. The log file still receives it.
    #[arg(long, short)]
    quiet: bool,

    /// Abort on the first Ctrl+C without asking.
    #[arg(long, short)]
    yes: bool,
}

/// `gridrun run <file>`: runs every task, teeing output to the terminal and a log file.
///
/// A confirmed Ctrl+C returns [`SweepAborted`] so the binary can exit with 130.
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let run_args = RunArgs::try_parse_from(&args)?;
    let sweep = commons::load_sweep(&run_args.file)?;
    let start = run_args.start.unwrap_or(sweep.config.start);

    let mut sinks = if run_args.quiet {
        OutputSinks::new()
    } else {
        OutputSinks::stdout()
    };

    let log_dir = if run_args.no_log || run_args.dry_run {
        None
    } else {
        sweep.config.expanded_log_dir()?
    };
    if let Some(dir) = log_dir {
        let options = LogFileOptions {
            header: Some(sweep.raw.clone()),
            ..LogFileOptions::default()
        };
        let (path, file) = create_log_file(&sweep.config.name, &dir, &options)?;
        println!("{} {}", "Logging to".dimmed(), path.display());
        sinks.push(file);
    }

    let mut options = SweepOptions::verbose(sweep.config.runner_config(&sweep.base_dir)?);
    options.dry_run = run_args.dry_run;

    let mut tasks = sweep
        .space
        .executable_loop(start)
        .with_env(sweep.config.env.clone());
    if !(run_args.no_progress || run_args.dry_run) {
        tasks = tasks.with_progress(Box::new(TerminalProgress::new(sweep.space.count_total())));
    }

    let confirm: Arc<dyn ExitConfirm> = if run_args.yes {
        Arc::new(AlwaysAbort)
    } else {
        Arc::new(DialoguerConfirm)
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let summary = runtime.block_on(async {
        let _watcher = spawn_interrupt_watcher(Arc::clone(cancellation_token), confirm);
        run_sweep(tasks, &options, &mut sinks, cancellation_token).await
    });

    print_summary(&summary);
    if summary.aborted {
        return Err(SweepAborted {
            completed: summary.completed,
            total: summary.total,
        }
        .into());
    }
    Ok(())
}

fn print_summary(summary: &SweepSummary) {
    if summary.listed > 0 {
        println!("{} {} commands", "Listed".green().bold(), summary.listed);
        return;
    }
    let mut parts = vec![format!("{} completed", summary.completed)];
    if summary.failed > 0 {
        parts.push(format!("{} with non-zero exit", summary.failed).yellow().to_string());
    }
    if summary.timed_out > 0 {
        parts.push(format!("{} timed out", summary.timed_out).yellow().to_string());
    }
    if summary.faulted > 0 {
        parts.push(format!("{} could not run", summary.faulted).red().to_string());
    }
    let heading = if summary.aborted {
        "Aborted".red().bold()
    } else {
        "Done".green().bold()
    };
    println!("{} {} of {} tasks: {}", heading, summary.completed, summary.total, parts.join(", "));
}
