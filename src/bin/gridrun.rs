// src/bin/gridrun.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::*;
use gridrun::{
    CancellationToken,
    cli::{Cli, handlers},
    constants::EXIT_CODE_INTERRUPTED,
    core::sweep::SweepAborted,
    new_cancellation_token,
};

// --- Command Definition and Registry ---

/// A system command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &CancellationToken) -> Result<()>,
}

static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "count",
        aliases: &[],
        handler: handlers::count::handle,
    },
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        handler: handlers::list::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        handler: handlers::run::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn main() {
    env_logger::init();
    let cancellation_token = new_cancellation_token();

    if let Err(e) = run_cli(Cli::parse(), &cancellation_token) {
        if let Some(aborted) = e.downcast_ref::<SweepAborted>() {
            log::info!("{}", aborted);
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        // Help and version requests from a handler's own parser.
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            clap_err.exit();
        }

        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli, cancellation_token: &CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let Some(name) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match find_command(&name) {
        Some(command) => (command.handler)(cli.args, cancellation_token),
        None => Err(anyhow::anyhow!(
            "Unknown command '{}'. Available commands: {}",
            name.yellow(),
            COMMAND_REGISTRY
                .iter()
                .map(|c| c.name)
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}
