use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ChainscopeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "chainscope.toml",
    "chainscope.yaml",
    "chainscope.yml",
    "chainscope.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ChainscopeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./chainscope.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/chainscope/chainscope.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ChainscopeConfig::default()` if no config file is found.
pub fn discover_and_load() -> ChainscopeConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ChainscopeConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists());
    if local.is_some() {
        return local;
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/chainscope/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "chainscope").map(|d| d.config_dir().to_path_buf())
}

/// Apply `CHAINSCOPE_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut ChainscopeConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_overrides_with(config: &mut ChainscopeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(path) = lookup("CHAINSCOPE_CHROME_PATH").filter(|p| !p.is_empty()) {
        config.browser.chrome_path = Some(path);
    }
    if let Some(raw) = lookup("CHAINSCOPE_POOL_SIZE") {
        match raw.trim().parse::<usize>() {
            Ok(size) => config.browser.pool_size = size,
            Err(e) => warn!(value = raw, error = %e, "ignoring invalid CHAINSCOPE_POOL_SIZE"),
        }
    }
    if let Some(raw) = lookup("CHAINSCOPE_HEADLESS") {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => config.browser.headless = true,
            "0" | "false" | "no" => config.browser.headless = false,
            other => warn!(value = other, "ignoring invalid CHAINSCOPE_HEADLESS"),
        }
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ChainscopeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
