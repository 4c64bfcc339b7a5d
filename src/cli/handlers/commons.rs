// src/cli/handlers/commons.rs

// Shared helpers for the sweep handlers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::{core::space::CommandSpace, models::SweepConfig};

/// A sweep file loaded and turned into its command space.
#[derive(Debug)]
pub struct LoadedSweep {
    /// The parsed file.
    pub config: SweepConfig,
    /// The file as written, kept for log headers.
    pub raw: String,
    /// Every axis of the file, registered in order.
    pub space: CommandSpace,
    /// Directory containing the sweep file. Relative paths inside it resolve from here.
    pub base_dir: PathBuf,
}

/// Reads `path` and builds its command space. Any shape error aborts here.
pub fn load_sweep(path: &Path) -> Result<LoadedSweep> {
    let (config, raw) = SweepConfig::load(path)?;
    let space = config
        .build_space()
        .with_context(|| format!("Sweep '{}' in {} is not valid", config.name, path.display()))?;

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().context("Could not determine the current directory")?,
    };
    let base_dir = dunce::simplified(&base_dir).to_path_buf();

    log::debug!(
        "Sweep '{}': {} tasks over dimensions {:?}",
        config.name,
        space.count_total(),
        space.dimensions()
    );
    Ok(LoadedSweep {
        config,
        raw,
        space,
        base_dir,
    })
}
