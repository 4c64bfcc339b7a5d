// src/cli/handlers/count.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use crate::{CancellationToken, cli::handlers::commons};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Prints the dimensions and size of a sweep.")]
struct CountArgs {
    /// Path to the sweep definition (TOML).
    file: PathBuf,
}

/// `gridrun count <file>`: prints each axis with its length and the total task count.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let count_args = CountArgs::try_parse_from(&args)?;
    let sweep = commons::load_sweep(&count_args.file)?;

    println!("{}", sweep.config.name.cyan().bold());
    for axis in sweep.space.axes() {
        println!("  {:<24} {}", axis.id().to_string(), axis.values().len());
    }
    println!(
        "{} {:?} = {}",
        "Total:".bold(),
        sweep.space.dimensions(),
        sweep.space.count_total().to_string().green().bold()
    );
    Ok(())
}
