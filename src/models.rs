// src/models.rs

//! The sweep definition file.
//!
//! ```toml
//! name = "throughput"
//! program = "python ./bench.py"
//!
//! [runner]
//! idle_timeout_secs = 120
//!
//! [[axis]]
//! kind = "arg"
//! key = "--requests"
//! values = [16, 32, 64]
//! ```

use crate::{
    constants::DEFAULT_IDLE_TIMEOUT_SECS,
    core::{error::SweepError, space::CommandSpace},
    system::executor::{EnvMode, RunnerConfig},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Problems with a sweep file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Could not read sweep file '{path}': {source}")]
    Io {
        /// The sweep file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML or does not match the sweep schema.
    #[error("Invalid sweep file '{path}': {source}")]
    Parse {
        /// The sweep file.
        path: PathBuf,
        /// Parser error, with the offending span.
        #[source]
        source: toml::de::Error,
    },
    /// A field parsed but holds an unusable value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField {
        /// Dotted path of the field, e.g. `runner.idle_timeout_secs`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// An axis could not be registered.
    #[error(transparent)]
    Sweep(#[from] SweepError),
}

/// One `[[axis]]` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AxisDef {
    /// A single value on every task.
    Fixed {
        /// Flag written before the value. Without one the value is positional.
        #[serde(default)]
        key: Option<String>,
        /// A string, integer, float or boolean.
        value: toml::Value,
    },
    /// One value per task from a list.
    Arg {
        /// Flag written before the value. Without one the value is positional.
        #[serde(default)]
        key: Option<String>,
        /// A list of strings, integers, floats or booleans.
        values: toml::Value,
    },
    /// A flag that is present on half the tasks and absent on the other half.
    Switch {
        /// The flag itself, e.g. `"--enable"`.
        flag: toml::Value,
    },
}

/// The `[runner]` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSection {
    /// Seconds without output before a task is terminated.
    pub idle_timeout_secs: f64,
    /// Optional wall-clock budget per task, in seconds.
    pub total_timeout_secs: Option<f64>,
    /// `"merge"` or `"replace"`.
    pub env_mode: EnvMode,
    /// Run each task in its own process group.
    pub process_group: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS as f64,
            total_timeout_secs: None,
            env_mode: EnvMode::Merge,
            process_group: true,
        }
    }
}

/// A whole sweep file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Experiment name; also the log subdirectory.
    pub name: String,
    /// Base command template, shell-lexed.
    pub program: String,
    /// Optional outer command, e.g. `"gdb --args"`.
    #[serde(default)]
    pub wrap: Option<String>,
    /// Linear index to resume from.
    #[serde(default)]
    pub start: usize,
    /// Base directory for log files. `~` and `$VARS` are expanded.
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Working directory for every task, relative to the sweep file.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// The `[runner]` table.
    #[serde(default)]
    pub runner: RunnerSection,
    /// Environment overrides for every task.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// The `[[axis]]` tables, in registration order.
    #[serde(default, rename = "axis")]
    pub axes: Vec<AxisDef>,
}

impl SweepConfig {
    /// Parses a sweep definition. `path` is only used in error messages.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a sweep file, returning the raw text alongside it.
    pub fn load(path: &Path) -> Result<(Self, String), ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content, path)?;
        log::debug!(
            "Loaded sweep '{}' with {} axes from {}",
            config.name,
            config.axes.len(),
            path.display()
        );
        Ok((config, content))
    }

    /// Builds the command space. Value-shape errors surface here, before any task runs.
    pub fn build_space(&self) -> Result<CommandSpace, SweepError> {
        let mut space = CommandSpace::new(&self.program)?;
        if let Some(outer) = &self.wrap {
            space.wrap(outer)?;
        }
        for axis in &self.axes {
            match axis {
                AxisDef::Fixed { key, value } => space.fixed_value(key.as_deref(), value)?,
                AxisDef::Arg { key, values } => space.arg_value(key.as_deref(), values)?,
                AxisDef::Switch { flag } => space.switch_value(flag)?,
            };
        }
        Ok(space)
    }

    /// Runner settings. A relative `cwd` is resolved against `base_dir`.
    pub fn runner_config(&self, base_dir: &Path) -> Result<RunnerConfig, ConfigError> {
        let idle_timeout = seconds("runner.idle_timeout_secs", self.runner.idle_timeout_secs)?;
        let total_timeout = self
            .runner
            .total_timeout_secs
            .map(|secs| seconds("runner.total_timeout_secs", secs))
            .transpose()?;
        let cwd = self.cwd.as_ref().map(|dir| {
            let joined = base_dir.join(dir);
            dunce::simplified(&joined).to_path_buf()
        });
        Ok(RunnerConfig {
            idle_timeout,
            total_timeout,
            env_mode: self.runner.env_mode,
            cwd,
            own_process_group: self.runner.process_group,
        })
    }

    /// `log_dir` with `~` and environment variables expanded.
    pub fn expanded_log_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.log_dir
            .as_deref()
            .map(|raw| {
                shellexpand::full(raw)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .map_err(|e| ConfigError::InvalidField {
                        field: "log_dir",
                        reason: e.to_string(),
                    })
            })
            .transpose()
    }
}

fn seconds(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if secs <= 0.0 {
        return Err(ConfigError::InvalidField {
            field,
            reason: format!("{} should be a positive number of seconds", secs),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "throughput"
program = "python ./bench.py"
wrap = "gdb --args"
cwd = "work"

[runner]
idle_timeout_secs = 1.5
total_timeout_secs = 60
env_mode = "replace"

[env]
CUDA_VISIBLE_DEVICES = "0"

[[axis]]
kind = "fixed"
key = "--backend"
value = "vllm"

[[axis]]
kind = "arg"
key = "--requests"
values = [16, 32, 64]

[[axis]]
kind = "arg"
values = ["a.json", "b.json"]

[[axis]]
kind = "switch"
flag = "--enable"
"#;

    fn parse(content: &str) -> Result<SweepConfig, ConfigError> {
        SweepConfig::from_toml_str(content, Path::new("sweep.toml"))
    }

    #[test]
    fn test_sample_builds_the_expected_space() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.env.get("CUDA_VISIBLE_DEVICES").map(String::as_str), Some("0"));
        assert_eq!(config.start, 0);

        let space = config.build_space().unwrap();
        assert_eq!(space.dimensions(), vec![1, 3, 2, 2]);
        assert_eq!(space.count_total(), 12);
        assert_eq!(
            space.render_args(&[0, 2, 1, 0]).unwrap(),
            vec![
                "gdb", "--args", "python", "./bench.py", "--backend", "vllm", "--requests",
                "64", "b.json", "--enable"
            ]
        );
    }

    #[test]
    fn test_runner_section_maps_to_runner_config() {
        let config = parse(SAMPLE).unwrap();
        let runner = config.runner_config(Path::new("/sweeps")).unwrap();
        assert_eq!(runner.idle_timeout, Duration::from_millis(1_500));
        assert_eq!(runner.total_timeout, Some(Duration::from_secs(60)));
        assert_eq!(runner.env_mode, EnvMode::Replace);
        assert_eq!(runner.cwd, Some(PathBuf::from("/sweeps/work")));
        assert!(runner.own_process_group);
    }

    #[test]
    fn test_defaults_apply_when_sections_are_missing() {
        let config = parse("name = \"x\"\nprogram = \"true\"\n").unwrap();
        let runner = config.runner_config(Path::new(".")).unwrap();
        assert_eq!(runner, RunnerConfig::default());
        assert_eq!(config.build_space().unwrap().count_total(), 1);
        assert_eq!(config.expanded_log_dir().unwrap(), None);
    }

    #[test]
    fn test_scalar_where_list_expected_is_a_type_error() {
        let content = "name = \"x\"\nprogram = \"p\"\n[[axis]]\nkind = \"arg\"\nkey = \"--n\"\nvalues = 3\n";
        let config = parse(content).unwrap();
        assert!(matches!(config.build_space(), Err(SweepError::TypeKind(_))));
    }

    #[test]
    fn test_table_where_scalar_expected_is_a_type_error() {
        let content = "name = \"x\"\nprogram = \"p\"\n[[axis]]\nkind = \"fixed\"\nvalue = { a = 1 }\n";
        let config = parse(content).unwrap();
        assert!(matches!(config.build_space(), Err(SweepError::TypeKind(_))));
    }

    #[test]
    fn test_unknown_axis_kind_is_a_parse_error() {
        let content = "name = \"x\"\nprogram = \"p\"\n[[axis]]\nkind = \"range\"\nvalues = [1]\n";
        assert!(matches!(parse(content), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_non_positive_timeout_is_rejected() {
        let content = "name = \"x\"\nprogram = \"p\"\n[runner]\nidle_timeout_secs = 0\n";
        let config = parse(content).unwrap();
        assert!(matches!(
            config.runner_config(Path::new(".")),
            Err(ConfigError::InvalidField { field: "runner.idle_timeout_secs", .. })
        ));
    }

    #[test]
    fn test_log_dir_expands_home() {
        if std::env::var_os("HOME").is_none() {
            return;
        }
        let content = "name = \"x\"\nprogram = \"p\"\nlog_dir = \"~/sweeps\"\n";
        let config = parse(content).unwrap();
        let expanded = config.expanded_log_dir().unwrap().unwrap();
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("sweeps"));
    }

    #[test]
    fn test_log_dir_with_undefined_variable_is_rejected() {
        let content = "name = \"x\"\nprogram = \"p\"\nlog_dir = \"$GRIDRUN_UNSET_TEST_VAR/logs\"\n";
        let config = parse(content).unwrap();
        assert!(matches!(
            config.expanded_log_dir(),
            Err(ConfigError::InvalidField { field: "log_dir", .. })
        ));
    }

    #[test]
    fn test_load_reads_file_and_keeps_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        fs::write(&path, SAMPLE).unwrap();
        let (config, raw) = SweepConfig::load(&path).unwrap();
        assert_eq!(config.name, "throughput");
        assert_eq!(raw, SAMPLE);

        let missing = SweepConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
