//! Configuration loading.
//!
//! Sources, lowest priority first: built-in defaults, one YAML file (the
//! explicit `--config` path, else `./dagbench.yaml`, else the platform
//! config directory), `DAGBENCH_*` environment variables, and finally CLI
//! flags (applied by the caller).

pub mod schema;

pub use schema::{
    AuthorTitle, BenchConfig, BoundedScenario, OutputFormat, ScenarioConfig, SqliteConfig,
    TopologySpec,
};

use std::path::{Path, PathBuf};

use crate::backend::BackendKind;
use crate::error::{DagBenchError, Result};

pub const CONFIG_FILE_NAME: &str = "dagbench.yaml";

pub const ENV_REPETITIONS: &str = "DAGBENCH_REPETITIONS";
pub const ENV_SEED: &str = "DAGBENCH_SEED";
pub const ENV_BACKENDS: &str = "DAGBENCH_BACKENDS";

/// Config file in the platform config directory, e.g.
/// `~/.config/dagbench/dagbench.yaml` on Linux.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "dagbench")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Pick the config file to read, if any.
///
/// An explicit path is returned as-is even if it does not exist, so that
/// loading reports it; implicit locations are only used when present.
pub fn discover_config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    user_config_path().filter(|p| p.is_file())
}

/// Parse a YAML (or JSON) config document.
pub fn parse_config(text: &str) -> Result<BenchConfig> {
    if text.trim().is_empty() {
        return Ok(BenchConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

pub fn load_config_file(path: &Path) -> Result<BenchConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        DagBenchError::Config(format!("cannot read config {}: {e}", path.display()))
    })?;
    parse_config(&text)
}

/// Apply `DAGBENCH_*` overrides. `lookup` is `std::env::var` in production.
pub fn apply_env_overrides(
    config: &mut BenchConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(raw) = lookup(ENV_REPETITIONS) {
        config.repetitions = raw.trim().parse().map_err(|_| {
            DagBenchError::Config(format!("{ENV_REPETITIONS}={raw} is not a non-negative integer"))
        })?;
    }
    if let Some(raw) = lookup(ENV_SEED) {
        config.seed = Some(raw.trim().parse().map_err(|_| {
            DagBenchError::Config(format!("{ENV_SEED}={raw} is not an unsigned integer"))
        })?);
    }
    if let Some(raw) = lookup(ENV_BACKENDS) {
        config.backends = parse_backend_list(&raw)?;
    }
    Ok(())
}

/// Parse a comma-separated backend list such as `sqlite,native`.
pub fn parse_backend_list(raw: &str) -> Result<Vec<BackendKind>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<BackendKind>().map_err(DagBenchError::Config))
        .collect()
}

/// Defaults, then the discovered file, then the environment. The result is
/// not yet validated; CLI overrides still follow.
pub fn load_config(explicit: Option<&Path>) -> Result<BenchConfig> {
    let cwd = std::env::current_dir()?;
    let mut config = match discover_config_path(explicit, &cwd) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            load_config_file(&path)?
        }
        None => BenchConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}
