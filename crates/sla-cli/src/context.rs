use anyhow::Context;
use sla_core::config::PollerConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_PATH: &str = ".sla/trackers.redb";
pub const DEFAULT_CONFIG_PATH: &str = ".sla/config.yaml";

/// Resolve which config file to read.
///
/// An explicit path always wins, whether or not it exists. Otherwise
/// `.sla/config.yaml` is used when present, and `None` means defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    default.is_file().then_some(default)
}

/// Where `config init` writes.
pub fn config_target(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the file (if any) and apply environment overrides.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<PollerConfig> {
    let path = resolve_config_path(explicit);
    PollerConfig::load(path.as_deref()).with_context(|| match &path {
        Some(p) => format!("failed to load config from {}", p.display()),
        None => "failed to load config from environment".to_string(),
    })
}
