// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::poll::types::Meter;
use crate::poll::validate::ReadingRange;
use crate::poll::CycleOptions;

pub const ENV_CONFIG_PATH: &str = "POLLER_CONFIG_PATH";

fn default_store_path() -> PathBuf {
    PathBuf::from("data/readings.json")
}

fn default_fixture_path() -> PathBuf {
    PathBuf::from("config/fixture.json")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    /// Inclusive lower limit for accepted values; absent means no lower limit.
    #[serde(default)]
    pub lower_bound: Option<f64>,
    /// Inclusive upper limit; absent means no upper limit.
    #[serde(default)]
    pub upper_bound: Option<f64>,
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_fixture_path")]
    pub fixture_path: PathBuf,
    #[serde(default)]
    pub meters: Vec<Meter>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            lower_bound: None,
            upper_bound: None,
            max_in_flight: None,
            store_path: default_store_path(),
            fixture_path: default_fixture_path(),
            meters: Vec::new(),
        }
    }
}

impl PollConfig {
    pub fn range(&self) -> Result<ReadingRange> {
        ReadingRange::from_options(self.lower_bound, self.upper_bound)
            .context("invalid reading bounds in poller config")
    }

    pub fn cycle_options(&self) -> Result<CycleOptions> {
        Ok(CycleOptions {
            range: self.range()?,
            max_in_flight: self.max_in_flight,
        })
    }

    /// Only enabled meters take part in a cycle.
    pub fn enabled_meters(&self) -> Vec<Meter> {
        self.meters.iter().filter(|m| m.enabled).cloned().collect()
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<PollConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading poller config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, ext.as_str())?;
    check(&cfg)?;
    Ok(cfg)
}

/// Load config using env var + fallbacks:
/// 1) $POLLER_CONFIG_PATH
/// 2) config/poller.toml
/// 3) config/poller.json
pub fn load_config_default() -> Result<PollConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("POLLER_CONFIG_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/poller.toml");
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/poller.json");
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(PollConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PollConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing poller config json");
    }
    match toml::from_str::<PollConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!(toml_err))
            .context("unsupported poller config format"),
    }
}

fn check(cfg: &PollConfig) -> Result<()> {
    cfg.range()?;
    let mut seen = std::collections::HashSet::new();
    for m in &cfg.meters {
        if m.name.trim().is_empty() {
            return Err(anyhow!("meter with empty name in poller config"));
        }
        if !seen.insert(m.name.as_str()) {
            return Err(anyhow!("duplicate meter name `{}` in poller config", m.name));
        }
    }
    Ok(())
}
