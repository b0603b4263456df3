//! Coordinator (spec §4.8): the single public entry point that composes
//! build → validate → version → commit into one atomic operation, rolling
//! back any staged blobs on a failure path so `not_committed` always means
//! nothing was written.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use policy_engine::{Contract, LmBackend, PolicyCatalog, SemanticEvaluator, Status, Version};

use crate::builder::{self, RawContractInput};
use crate::config::GovernanceConfig;
use crate::error::GovernanceError;
use crate::history::{CommitRequest, HistoryStore};
use crate::orchestrator::{Orchestrator, Strategy};
use crate::serializer;
use crate::versioner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed { commit_id: String, version: Version },
    NotCommitted,
}

pub struct CoordinatorResult {
    pub contract: Contract,
    pub report: policy_engine::ValidationReport,
    pub outcome: Outcome,
}

pub struct Coordinator {
    history: HistoryStore,
    orchestrator: Orchestrator,
    catalog: PolicyCatalog,
    config: GovernanceConfig,
}

impl Coordinator {
    pub fn new(history: HistoryStore, orchestrator: Orchestrator, catalog: PolicyCatalog, config: GovernanceConfig) -> Self {
        Self { history, orchestrator, catalog, config }
    }

    /// Assembles a `Coordinator` from a loaded `GovernanceConfig`, applying
    /// `config.semantic`'s fan-out, per-call timeout, and process-wide
    /// in-flight cap (§5) to the `SemanticEvaluator` it builds around
    /// `backend`. The embedding application supplies the backend; this crate
    /// never ships a concrete one (§6.4's `LmBackend` boundary).
    pub fn from_config(
        config: GovernanceConfig,
        catalog: PolicyCatalog,
        backend: Arc<dyn LmBackend>,
    ) -> Self {
        let history = HistoryStore::new(&config.history.path);
        let semantic = SemanticEvaluator::new(backend)
            .with_fan_out(config.semantic.fan_out)
            .with_timeout(Duration::from_secs(config.semantic.per_call_timeout_secs))
            .with_max_in_flight(config.semantic.max_in_flight);
        let orchestrator = Orchestrator::new(semantic);
        Self { history, orchestrator, catalog, config }
    }

    fn predecessor(&self, dataset: &str) -> Result<Option<Contract>, GovernanceError> {
        match self.history.latest_machine_blob_for_dataset(dataset)? {
            None => Ok(None),
            Some((_, bytes)) => {
                let contract = serializer::parse_machine(&bytes)
                    .map_err(|detail| GovernanceError::InvalidContract { dataset: dataset.to_string(), detail })?;
                Ok(Some(contract))
            }
        }
    }

    /// Runs the full create-or-update flow in §4.8's pseudocode, with version
    /// assignment, validation, and commit all performed inside one per-dataset
    /// critical section (spec §5, §4.6: "version assignment reads the history
    /// head; treat this as part of the per-dataset critical section, do not
    /// cache head across the read/commit gap"). Reading the predecessor and
    /// assigning the version outside that section would let two concurrent
    /// writers for the same new dataset both see no predecessor, both assign
    /// `1.0.0`, and both commit without ever tripping `HistoryConflict`.
    ///
    /// Version assignment happens *before* validation, not after: SG006
    /// ("breaking change requires a MAJOR bump") checks `contract.version`
    /// against the predecessor, so the version under validation must already
    /// be the one that would actually be committed. When the caller supplied
    /// no `declared_version`, that is the auto-assigned version per §4.6;
    /// when a caller asserts one explicitly (e.g. re-submitting a specific
    /// bump), SG006 validates that assertion instead of trusting it.
    ///
    /// On a `HistoryConflict` the whole sequence — predecessor read, version
    /// assignment, validation, commit — is retried up to
    /// `config.history.max_write_retries` times (spec §7's recovery rule for
    /// that error), never just the commit in isolation: a retry that reused
    /// the stale predecessor/version would immediately conflict again.
    pub fn create_or_update_contract(
        &self,
        raw: RawContractInput,
        strategy: Strategy,
        deadline: Option<Instant>,
        author: &str,
    ) -> Result<CoordinatorResult, GovernanceError> {
        let had_declared_version = raw.declared_version.is_some();
        let base_contract = builder::build(raw)?;
        let dataset = base_contract.dataset_name.clone();
        let catalog = self.catalog.snapshot();

        self.history.with_dataset_lock(&dataset, || {
            let mut attempt: u32 = 0;
            loop {
                let predecessor = self.predecessor(&dataset)?;
                let mut contract = base_contract.clone();
                if !had_declared_version {
                    contract.version = versioner::assign_version(&contract, predecessor.as_ref());
                }

                let report = self.orchestrator.validate(
                    &contract,
                    predecessor.as_ref(),
                    &catalog,
                    strategy,
                    deadline,
                    &self.config.orchestrator,
                );

                if report.status == Status::Failed || report.metadata.deadline_exceeded {
                    return Ok(CoordinatorResult { contract, report, outcome: Outcome::NotCommitted });
                }

                let version = contract.version;
                match self.try_commit_locked(&contract, predecessor.as_ref(), &dataset, author) {
                    Ok(commit_id) => {
                        return Ok(CoordinatorResult {
                            contract,
                            report,
                            outcome: Outcome::Committed { commit_id, version },
                        });
                    }
                    Err(GovernanceError::HistoryConflict { .. }) if attempt < self.config.history.max_write_retries => {
                        attempt += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }

    /// Stages the human/machine blobs and commits them, assuming the caller
    /// already holds `dataset`'s per-dataset lock.
    fn try_commit_locked(
        &self,
        contract: &Contract,
        predecessor: Option<&Contract>,
        dataset: &str,
        author: &str,
    ) -> Result<String, GovernanceError> {
        let human = serializer::render_human(contract, Utc::now());
        let machine = serializer::render_machine(contract);

        let (human_id, human_created) = self.history.put(human.as_bytes())?;
        let (machine_id, machine_created) = self.history.put(&machine)?;
        let staged: Vec<String> = [
            human_created.then(|| human_id.clone()),
            machine_created.then(|| machine_id.clone()),
        ]
        .into_iter()
        .flatten()
        .collect();

        let change_kind = match predecessor {
            None => "initial version".to_string(),
            Some(prev) => format!("{:?}", policy_engine::rules::classify_change(prev, contract)),
        };
        let message = format!("{} -> {} ({})", dataset, contract.version, change_kind);

        let mut refs_by_name = BTreeMap::new();
        refs_by_name.insert(format!("{dataset}_v{}", contract.version), human_id);
        refs_by_name.insert(format!("{dataset}_v{}.struct", contract.version), machine_id);

        match self.history.commit_locked(CommitRequest {
            dataset: dataset.to_string(),
            message,
            parent: self.last_commit_for(dataset)?,
            author: author.to_string(),
            timestamp: Utc::now(),
            refs_by_name,
        }) {
            Ok(commit_id) => Ok(commit_id),
            Err(e) => {
                self.history.rollback_staged(&staged);
                Err(e)
            }
        }
    }

    fn last_commit_for(&self, dataset: &str) -> Result<Option<String>, GovernanceError> {
        Ok(self.history.log(usize::MAX, None)?.into_iter().find(|m| m.dataset == dataset).map(|m| m.commit_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::semantic::{Judgment, SemanticError, SemanticRequest, Verdict};
    use policy_engine::{Classification, Field, FieldType, Governance, LmBackend, Quality, SemanticEvaluator};
    use std::sync::Arc;

    struct AlwaysUpBackend;
    impl LmBackend for AlwaysUpBackend {
        fn probe(&self) -> bool {
            true
        }
        fn submit(&self, _request: SemanticRequest, _deadline: Instant) -> Result<Judgment, SemanticError> {
            Ok(Judgment { verdict: Verdict::Ok, field_paths: vec![], message: "fine".into(), confidence: 0.9 })
        }
    }

    fn coordinator(root: &std::path::Path) -> Coordinator {
        let history_dir = root.join("history");
        std::fs::create_dir_all(history_dir.join("objects")).unwrap();
        std::fs::create_dir_all(history_dir.join("refs").join("heads")).unwrap();
        std::fs::create_dir_all(history_dir.join("refs").join("tags")).unwrap();
        let policies_dir = root.join("policies");
        let catalog = PolicyCatalog::load(&policies_dir).unwrap();
        let history = HistoryStore::new(&history_dir);
        let orchestrator = Orchestrator::new(SemanticEvaluator::new(Arc::new(AlwaysUpBackend)));
        Coordinator::new(history, orchestrator, catalog, GovernanceConfig::default())
    }

    fn clean_raw(name: &str) -> RawContractInput {
        RawContractInput {
            dataset_name: name.to_string(),
            owner_name: "Jane".into(),
            owner_contact: "jane@example.com".into(),
            domain_tag: "analytics".into(),
            stewards: vec![],
            schema: vec![
                Field {
                    name: "metric".into(),
                    field_type: FieldType::String,
                    nullable: false,
                    required: true,
                    description: Some("metric name".into()),
                    max_length: Some(64),
                    pii: false,
                    enum_values: None,
                    unique: false,
                },
                Field {
                    name: "value".into(),
                    field_type: FieldType::Float,
                    nullable: false,
                    required: true,
                    description: Some("metric value".into()),
                    max_length: None,
                    pii: false,
                    enum_values: None,
                    unique: false,
                },
            ],
            governance: Governance {
                classification: Classification::Public,
                retention_days: None,
                compliance_tags: Default::default(),
                encryption_required: false,
                approved_use_cases: Default::default(),
                data_residency: None,
                breaking_change_policy: None,
            },
            quality: Quality {
                completeness_threshold: 0.9,
                accuracy_threshold: 0.85,
                freshness_horizon_secs: None,
                availability_target: None,
                uniqueness_keys: vec![],
                quality_tier: Some("standard".into()),
            },
            subscriptions: vec![],
            versioning_strategy_note: Some("semver per dataset".into()),
            declared_version: None,
        }
    }

    #[test]
    fn clean_contract_commits_at_1_0_0() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let result = coordinator
            .create_or_update_contract(clean_raw("public_kpis"), Strategy::Fast, None, "tester")
            .unwrap();
        assert_eq!(result.report.status, Status::Passed);
        match result.outcome {
            Outcome::Committed { version, .. } => assert_eq!(version, Version::initial()),
            Outcome::NotCommitted => panic!("expected a commit"),
        }
    }

    #[test]
    fn additive_field_on_second_write_bumps_minor() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        coordinator
            .create_or_update_contract(clean_raw("public_kpis"), Strategy::Fast, None, "tester")
            .unwrap();

        let mut raw = clean_raw("public_kpis");
        raw.schema.push(Field {
            name: "region".into(),
            field_type: FieldType::String,
            nullable: true,
            required: false,
            description: Some("ISO code".into()),
            max_length: Some(8),
            pii: false,
            enum_values: None,
            unique: false,
        });
        let result = coordinator
            .create_or_update_contract(raw, Strategy::Fast, None, "tester")
            .unwrap();
        match result.outcome {
            Outcome::Committed { version, .. } => assert_eq!(version, Version::new(1, 1, 0)),
            Outcome::NotCommitted => panic!("expected a commit"),
        }
    }

    #[test]
    fn pii_without_encryption_fails_and_does_not_commit() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let mut raw = clean_raw("customer_accounts");
        raw.governance.classification = Classification::Confidential;
        raw.governance.retention_days = Some(2555);
        raw.quality.completeness_threshold = 0.99;
        raw.schema.push(Field {
            name: "customer_ssn".into(),
            field_type: FieldType::String,
            nullable: false,
            required: true,
            description: Some("ssn".into()),
            max_length: Some(11),
            pii: true,
            enum_values: None,
            unique: false,
        });
        let result = coordinator
            .create_or_update_contract(raw, Strategy::Fast, None, "tester")
            .unwrap();
        assert_eq!(result.report.status, Status::Failed);
        assert_eq!(result.outcome, Outcome::NotCommitted);
    }

    #[test]
    fn breaking_change_asserting_only_a_patch_bump_fires_sg006() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        coordinator
            .create_or_update_contract(clean_raw("public_kpis"), Strategy::Fast, None, "tester")
            .unwrap();

        let mut raw = clean_raw("public_kpis");
        raw.schema.retain(|f| f.name != "value");
        raw.declared_version = Some(Version::new(1, 0, 1));
        let result = coordinator
            .create_or_update_contract(raw, Strategy::Fast, None, "tester")
            .unwrap();

        assert!(result.report.findings.iter().any(|f| f.policy_id == "SG006"));
        assert_eq!(result.report.status, Status::Failed);
        assert_eq!(result.outcome, Outcome::NotCommitted);
    }

    #[test]
    fn breaking_change_asserting_a_major_bump_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        coordinator
            .create_or_update_contract(clean_raw("public_kpis"), Strategy::Fast, None, "tester")
            .unwrap();

        let mut raw = clean_raw("public_kpis");
        raw.schema.retain(|f| f.name != "value");
        raw.declared_version = Some(Version::new(2, 0, 0));
        let result = coordinator
            .create_or_update_contract(raw, Strategy::Fast, None, "tester")
            .unwrap();

        assert!(!result.report.findings.iter().any(|f| f.policy_id == "SG006"));
        match result.outcome {
            Outcome::Committed { version, .. } => assert_eq!(version, Version::new(2, 0, 0)),
            Outcome::NotCommitted => panic!("expected a commit at the asserted major version"),
        }
    }
}
