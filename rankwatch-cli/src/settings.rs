//! Layered settings for the command-line tool.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. an optional TOML file passed with `--config`
//! 3. `RANKWATCH_*` environment variables (`RANKWATCH_WORLD_SIZE`, ...)
//! 4. command-line flags
//!
//! ```toml
//! world_size = 4
//! snapshot_dir = "/shared/run-42/snapshots"
//! results_dir = "./result"
//! prefix = "cora_4"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Prefix of the environment variables read as settings.
pub const ENV_PREFIX: &str = "RANKWATCH";

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Number of ranks whose snapshots are expected.
    pub world_size: usize,
    /// Directory holding `duration_dict_<rank>.json` and `gpu_memory_<rank>.json`.
    pub snapshot_dir: PathBuf,
    /// Directory reports are written to.
    pub results_dir: PathBuf,
    /// Report file stem; each command supplies its own default.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Values given on the command line, applied over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub world_size: Option<usize>,
    pub snapshot_dir: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub prefix: Option<String>,
}

impl Settings {
    /// Load settings from every source, reading the process environment.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        Self::load_with_env(
            file,
            Environment::with_prefix(ENV_PREFIX).try_parsing(true),
            overrides,
        )
    }

    fn load_with_env(file: Option<&Path>, env: Environment, overrides: &Overrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("world_size", 1_i64)?
            .set_default("snapshot_dir", "./snapshots")?
            .set_default("results_dir", "./result")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(env)
            .set_override_option("world_size", overrides.world_size.map(|n| n as i64))?
            .set_override_option("snapshot_dir", overrides.snapshot_dir.as_deref().map(path_value))?
            .set_override_option("results_dir", overrides.results_dir.as_deref().map(path_value))?
            .set_override_option("prefix", overrides.prefix.clone())?
            .build()
            .context("failed to load settings")?
            .try_deserialize()
            .context("invalid settings")?;

        if settings.world_size == 0 {
            bail!("world_size must be at least 1");
        }
        Ok(settings)
    }

    /// The configured prefix, or `default` when none was given.
    pub fn prefix_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.prefix.as_deref().unwrap_or(default)
    }
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
