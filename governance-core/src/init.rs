//! Idempotent workspace initializer — creates the on-disk history store
//! layout, the policy catalog directory (seeded with the embedded
//! defaults), and a default `config.toml`. Grounded on the teacher's
//! `commands::init::ensure_initialized_once` "single global init gate"
//! pattern (`OnceCell`, `write_atomic`, created/existed bookkeeping).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;

use crate::config::GovernanceConfig;

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<String>,
    pub existed: Vec<String>,
    pub config: GovernanceConfig,
}

static INIT: OnceCell<InitReport> = OnceCell::new();

/// Idempotent global initializer, safe to call from every entry point.
pub fn ensure_initialized_once() -> Result<&'static InitReport> {
    INIT.get_or_try_init(ensure_initialized)
}

fn governance_root() -> PathBuf {
    std::env::var_os("GOVERNANCE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".governance"))
}

/// Non-cached variant, useful for tests that want an isolated workspace per
/// call rather than the process-wide singleton.
pub fn ensure_initialized_at(root: &Path) -> Result<InitReport> {
    let mut created = Vec::new();
    let mut existed = Vec::new();

    ensure_dir_abs(root, &mut created, &mut existed)?;
    ensure_file(root, "config.toml", Some(DEFAULT_CONFIG_TOML), &mut created, &mut existed)?;

    let config = GovernanceConfig::load(root)?;

    ensure_dir_abs(&config.history.path, &mut created, &mut existed)?;
    ensure_dir_abs(&config.history.path.join("objects"), &mut created, &mut existed)?;
    ensure_dir_abs(&config.history.path.join("refs").join("heads"), &mut created, &mut existed)?;
    ensure_dir_abs(&config.history.path.join("refs").join("tags"), &mut created, &mut existed)?;
    ensure_file(
        &config.history.path,
        "format",
        Some("1\n"),
        &mut created,
        &mut existed,
    )?;
    ensure_seeded_file(&config.history.path, "log", &mut created, &mut existed)?;

    ensure_dir_abs(&config.policies.path, &mut created, &mut existed)?;
    for name in policy_engine::assets::seed_default_catalog(&config.policies.path)? {
        created.push(config.policies.path.join(name).display().to_string());
    }

    Ok(InitReport { root: root.to_path_buf(), created, existed, config })
}

fn ensure_initialized() -> Result<InitReport> {
    ensure_initialized_at(&governance_root())
}

fn ensure_dir_abs(path: &Path, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    if path.exists() {
        existed.push(path.display().to_string());
        return Ok(());
    }
    fs::create_dir_all(path).with_context(|| format!("create_dir_all({:?})", path))?;
    created.push(path.display().to_string());
    Ok(())
}

fn ensure_file(
    base: &Path,
    rel_file: &str,
    content_if_absent: Option<&str>,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = base.join(rel_file);
    if p.exists() {
        existed.push(rel_file.to_string());
        return Ok(());
    }
    write_atomic(&p, content_if_absent.unwrap_or("").as_bytes())?;
    created.push(rel_file.to_string());
    Ok(())
}

fn ensure_seeded_file(base: &Path, rel_file: &str, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    ensure_file(base, rel_file, Some(""), created, existed)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all({:?})", parent))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open temp file {:?}", tmp))?;
        f.write_all(bytes)?;
        f.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

const DEFAULT_CONFIG_TOML: &str = r#"
[system]
name = "governance-core"
version = "0.1.0"

[policies]
path = "policies"

[history]
path = "history"
max_write_retries = 3

[semantic]
fan_out = 4
per_call_timeout_secs = 30
max_in_flight = 32

[orchestrator]
fast_complexity_ceiling = 30.0
balanced_semantic_complexity_floor = 50.0
"#;
