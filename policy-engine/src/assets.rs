//! Embedded canonical policy catalog (17 rule + 8 semantic policies).
//!
//! Seeds these into a configured directory on first load, mirroring the
//! teacher's `contracts::assets` embed-and-seed pattern: the files ship
//! inside the binary via `include_str!` and are written out idempotently so
//! the catalog directory is always populated, even on a fresh checkout.

use std::fs;
use std::path::Path;

use crate::error::PolicyError;

const SENSITIVE_DATA_TOML: &str = include_str!("../assets/sensitive_data.toml");
const DATA_QUALITY_TOML: &str = include_str!("../assets/data_quality.toml");
const SCHEMA_GOVERNANCE_TOML: &str = include_str!("../assets/schema_governance.toml");
const SEMANTIC_TOML: &str = include_str!("../assets/semantic.toml");

const DEFAULTS: &[(&str, &str)] = &[
    ("sensitive_data.toml", SENSITIVE_DATA_TOML),
    ("data_quality.toml", DATA_QUALITY_TOML),
    ("schema_governance.toml", SCHEMA_GOVERNANCE_TOML),
    ("semantic.toml", SEMANTIC_TOML),
];

/// Writes the embedded default catalog files into `dir`, skipping any file
/// that already exists. Idempotent; safe to call on every load.
pub fn seed_default_catalog(dir: &Path) -> Result<Vec<String>, PolicyError> {
    fs::create_dir_all(dir)?;
    let mut created = Vec::new();
    for (name, text) in DEFAULTS {
        let path = dir.join(name);
        if !path.exists() {
            fs::write(&path, text)?;
            created.push((*name).to_string());
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_all_four_files_into_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let created = seed_default_catalog(dir.path()).unwrap();
        assert_eq!(created.len(), 4);
        assert!(dir.path().join("sensitive_data.toml").exists());
        assert!(dir.path().join("semantic.toml").exists());
    }

    #[test]
    fn seeding_twice_creates_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        seed_default_catalog(dir.path()).unwrap();
        let created = seed_default_catalog(dir.path()).unwrap();
        assert!(created.is_empty());
    }
}
