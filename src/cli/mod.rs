// src/cli/mod.rs

use clap::Parser;

pub mod handlers;

const COMMANDS_HELP: &str = "\
Commands:
  run <sweep.toml>    Run every task of a sweep
  list <sweep.toml>   Print every rendered command (alias: ls)
  count <sweep.toml>  Print the dimensions and the number of tasks

Run `gridrun <command> --help` for the options of a command.";

/// gridrun: runs a command once for every combination of its argument values.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
#[command(after_help = COMMANDS_HELP)]
pub struct Cli {
    /// The command to execute.
    pub command: Option<String>,

    /// Arguments for the command, parsed by its handler.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
