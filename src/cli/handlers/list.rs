// src/cli/handlers/list.rs

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::{CancellationToken, cli::handlers::commons};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Prints every rendered command of a sweep.")]
struct ListArgs {
    /// Path to the sweep definition (TOML).
    file: PathBuf,

    /// Linear index to start from. Overrides `start` in the file.
    #[arg(long)]
    start: Option<usize>,

    /// Print the selected value of every axis instead of the command.
    #[arg(long)]
    dict: bool,
}

/// `gridrun list <file>`: prints every task without running anything.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let list_args = ListArgs::try_parse_from(&args)?;
    let sweep = commons::load_sweep(&list_args.file)?;
    let start = list_args.start.unwrap_or(sweep.config.start);

    for line in render(&sweep.space, start, list_args.dict) {
        println!("{}", line);
    }
    Ok(())
}

fn render(space: &crate::core::space::CommandSpace, start: usize, dict: bool) -> Vec<String> {
    if dict {
        space.dict_loop(start).map(|d| d.to_string()).collect()
    } else {
        space
            .executable_loop(start)
            .map(|task| task.command_line())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space::CommandSpace;

    #[test]
    fn test_render_commands_and_dicts() {
        let mut space = CommandSpace::new("bench").unwrap();
        space
            .fixed(Some("--backend"), "vllm")
            .unwrap()
            .arg(Some("--n"), [1, 2])
            .unwrap();

        assert_eq!(
            render(&space, 1, false),
            vec!["bench --backend vllm --n 2".to_string()]
        );
        assert_eq!(
            render(&space, 0, true),
            vec![
                r#"{--backend: "vllm", --n: "1"}"#.to_string(),
                r#"{--backend: "vllm", --n: "2"}"#.to_string(),
            ]
        );
    }
}
