//! Nested configuration for the governance core, loaded from a single
//! `config.toml` with per-section defaults — the same shape as the
//! teacher's `CoreConfig` (`system`/`memory`/`logbook`/...), generalized to
//! the sections this workspace actually needs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub policies: PoliciesPathConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl GovernanceConfig {
    /// Loads `config.toml` from `root`, falling back to defaults if absent,
    /// then resolves every relative path against `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<GovernanceConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            GovernanceConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.policies.path = absolutize(root, &self.policies.path);
        self.history.path = absolutize(root, &self.history.path);
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            policies: PoliciesPathConfig::default(),
            history: HistoryConfig::default(),
            semantic: SemanticConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_name")]
    pub name: String,
    #[serde(default = "SystemConfig::default_version")]
    pub version: String,
}

impl SystemConfig {
    fn default_name() -> String {
        "governance-core".to_string()
    }

    fn default_version() -> String {
        "0.1.0".to_string()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self { name: Self::default_name(), version: Self::default_version() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoliciesPathConfig {
    #[serde(default = "PoliciesPathConfig::default_path")]
    pub path: PathBuf,
}

impl PoliciesPathConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("policies")
    }
}

impl Default for PoliciesPathConfig {
    fn default() -> Self {
        Self { path: Self::default_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_path")]
    pub path: PathBuf,
    #[serde(default = "HistoryConfig::default_max_retries")]
    pub max_write_retries: u32,
}

impl HistoryConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("history")
    }

    fn default_max_retries() -> u32 {
        3
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { path: Self::default_path(), max_write_retries: Self::default_max_retries() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticConfig {
    #[serde(default = "SemanticConfig::default_fan_out")]
    pub fan_out: usize,
    #[serde(default = "SemanticConfig::default_timeout_secs")]
    pub per_call_timeout_secs: u64,
    #[serde(default = "SemanticConfig::default_max_in_flight")]
    pub max_in_flight: usize,
}

impl SemanticConfig {
    fn default_fan_out() -> usize {
        4
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    fn default_max_in_flight() -> usize {
        32
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            fan_out: Self::default_fan_out(),
            per_call_timeout_secs: Self::default_timeout_secs(),
            max_in_flight: Self::default_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "OrchestratorConfig::default_low_complexity_ceiling")]
    pub fast_complexity_ceiling: f64,
    #[serde(default = "OrchestratorConfig::default_balanced_complexity_floor")]
    pub balanced_semantic_complexity_floor: f64,
}

impl OrchestratorConfig {
    fn default_low_complexity_ceiling() -> f64 {
        30.0
    }

    fn default_balanced_complexity_floor() -> f64 {
        50.0
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fast_complexity_ceiling: Self::default_low_complexity_ceiling(),
            balanced_semantic_complexity_floor: Self::default_balanced_complexity_floor(),
        }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}
