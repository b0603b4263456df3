use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::error::PolicyError;
use crate::policy::{Category, Policy, Severity};
use crate::rules;

#[derive(Debug, Deserialize)]
struct PolicyFile {
    policies: Vec<Policy>,
}

#[derive(Debug, Default)]
pub struct CatalogInner {
    by_id: HashMap<String, Policy>,
}

impl CatalogInner {
    fn validate_and_insert(&mut self, policy: Policy) -> Result<(), PolicyError> {
        if self.by_id.contains_key(&policy.id) {
            return Err(PolicyError::DuplicateId(policy.id));
        }
        if policy.severity != Severity::Info && policy.remediation.trim().is_empty() {
            return Err(PolicyError::MissingRemediation(policy.id));
        }
        if !policy.is_semantic() {
            match &policy.rule_ref {
                Some(r) if rules::is_known_predicate(r) => {}
                Some(r) => return Err(PolicyError::UnknownPredicate(r.clone())),
                None => return Err(PolicyError::UnknownPredicate(policy.id)),
            }
        }
        self.by_id.insert(policy.id.clone(), policy);
        Ok(())
    }
}

/// A read-shared, atomically-published catalog (§4.1). Readers call
/// [`PolicyCatalog::snapshot`] once per validation request and evaluate
/// against that snapshot for the duration of the call, so a concurrent
/// `reload` can never be observed mid-evaluation.
pub struct PolicyCatalog {
    inner: RwLock<Arc<CatalogInner>>,
}

#[derive(Clone)]
pub struct CatalogSnapshot(Arc<CatalogInner>);

impl CatalogSnapshot {
    pub fn get(&self, id: &str) -> Option<&Policy> {
        self.0.by_id.get(id)
    }

    pub fn list(&self, category: Option<Category>) -> Vec<&Policy> {
        self.0
            .by_id
            .values()
            .filter(|p| category.map(|c| p.category == c).unwrap_or(true))
            .collect()
    }

    pub fn rule_policies(&self) -> Vec<&Policy> {
        self.0.by_id.values().filter(|p| !p.is_semantic()).collect()
    }

    pub fn semantic_policies(&self) -> Vec<&Policy> {
        self.0.by_id.values().filter(|p| p.is_semantic()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.by_id.len()
    }
}

impl PolicyCatalog {
    fn build_from_dir(dir: &Path) -> Result<CatalogInner, PolicyError> {
        let mut inner = CatalogInner::default();
        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|ext| ext == "toml").unwrap_or(false))
            .collect();
        // Deterministic load order so duplicate-id errors are reproducible.
        entries.sort_by_key(|e| e.path());

        for entry in entries {
            let path = entry.path();
            let text = fs::read_to_string(&path)?;
            let file: PolicyFile = toml::from_str(&text).map_err(|source| PolicyError::Parse {
                file: path.display().to_string(),
                source,
            })?;
            for policy in file.policies {
                inner.validate_and_insert(policy)?;
            }
        }
        Ok(inner)
    }

    /// Loads the catalog from `dir`, seeding the embedded defaults first if
    /// the directory is empty or absent.
    pub fn load(dir: &Path) -> Result<Self, PolicyError> {
        crate::assets::seed_default_catalog(dir)?;
        let inner = Self::build_from_dir(dir)?;
        tracing::info!(policies = inner.by_id.len(), dir = %dir.display(), "policy catalog loaded");
        Ok(Self { inner: RwLock::new(Arc::new(inner)) })
    }

    /// Reloads from `dir`. On any error the previously published catalog
    /// remains active (§4.1 atomicity guarantee); reloads are serialized by
    /// the write half of the lock.
    pub fn reload(&self, dir: &Path) -> Result<(), PolicyError> {
        let fresh = Self::build_from_dir(dir)?;
        let mut guard = self.inner.write().expect("policy catalog lock poisoned");
        *guard = Arc::new(fresh);
        tracing::info!(dir = %dir.display(), "policy catalog reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        let guard = self.inner.read().expect("policy catalog lock poisoned");
        CatalogSnapshot(Arc::clone(&guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_embedded_defaults_into_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = PolicyCatalog::load(dir.path()).unwrap();
        let snap = catalog.snapshot();
        assert_eq!(snap.rule_policies().len(), 17);
        assert_eq!(snap.semantic_policies().len(), 8);
    }

    #[test]
    fn reload_with_duplicate_id_keeps_old_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = PolicyCatalog::load(dir.path()).unwrap();
        let before = catalog.snapshot().len();

        let bad_dir = tempfile::tempdir().unwrap();
        fs::write(
            bad_dir.path().join("dup.toml"),
            r#"
            [[policies]]
            id = "SD001"
            name = "dup"
            category = "sensitive_data"
            severity = "critical"
            description = "dup"
            rule_ref = "sd001_pii_requires_encryption"
            remediation = "n/a"

            [[policies]]
            id = "SD001"
            name = "dup again"
            category = "sensitive_data"
            severity = "critical"
            description = "dup"
            rule_ref = "sd001_pii_requires_encryption"
            remediation = "n/a"
            "#,
        )
        .unwrap();

        let result = catalog.reload(bad_dir.path());
        assert!(result.is_err());
        assert_eq!(catalog.snapshot().len(), before);
    }
}
