//! Deterministic rule predicates over the fixed contract-accessor vocabulary
//! (§4.2). Each predicate is a plain function dispatched by the policy's
//! `rule_ref`; there is no reflection and no free-text matching.

use std::panic::{self, AssertUnwindSafe};

use crate::catalog::CatalogSnapshot;
use crate::contract::{Classification, Contract, FieldType};
use crate::finding::{Engine, Finding};
use crate::policy::{Category, Policy, Severity};

/// Outcome of a single predicate evaluation.
pub enum RuleOutcome {
    Satisfied,
    Violated { field_paths: Vec<String>, detail: String },
}

fn ok() -> RuleOutcome {
    RuleOutcome::Satisfied
}

fn violated(field_paths: Vec<String>, detail: impl Into<String>) -> RuleOutcome {
    RuleOutcome::Violated { field_paths, detail: detail.into() }
}

/// Structural classification of a contract change relative to a predecessor
/// (§4.6). Shared between the rule evaluator's SG006 check and the
/// governance-core versioner so both agree on one definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Breaking,
    Additive,
    DocOnly,
    None,
}

/// Classifies `new` against `old` per the rules in §4.6 Open Question (i):
/// field removal, type change, a field becoming required that was
/// previously optional, a tightened uniqueness declaration, or an escalated
/// classification are all breaking. Only new optional fields, new
/// subscriptions, or widened constraints (without any breaking condition)
/// are additive. Everything else that differs only in descriptive text is
/// doc-only.
pub fn classify_change(old: &Contract, new: &Contract) -> ChangeKind {
    let mut breaking = false;
    let mut additive = false;

    for old_field in &old.schema {
        match new.field(&old_field.name) {
            None => breaking = true,
            Some(new_field) => {
                if new_field.field_type != old_field.field_type {
                    breaking = true;
                }
                if !old_field.required() && new_field.required() {
                    breaking = true;
                }
            }
        }
    }
    for new_field in &new.schema {
        if old.field(&new_field.name).is_none() {
            additive = true;
        }
    }

    let old_unique: std::collections::HashSet<&str> =
        old.quality.uniqueness_keys.iter().map(|s| s.as_str()).collect();
    let new_unique: std::collections::HashSet<&str> =
        new.quality.uniqueness_keys.iter().map(|s| s.as_str()).collect();
    if !old_unique.is_subset(&new_unique) {
        // An existing uniqueness declaration was narrowed or dropped.
        breaking = true;
    } else if new_unique.len() > old_unique.len() {
        additive = true;
    }

    if new.governance.classification > old.governance.classification {
        breaking = true;
    }

    if new.subscriptions.len() > old.subscriptions.len() {
        additive = true;
    }
    if new.quality.completeness_threshold < old.quality.completeness_threshold
        || new.quality.accuracy_threshold < old.quality.accuracy_threshold
    {
        // Constraints got looser for callers (easier to satisfy) -> additive,
        // unless something else already marked this breaking.
        additive = true;
    }

    if breaking {
        ChangeKind::Breaking
    } else if additive {
        ChangeKind::Additive
    } else if new != old {
        ChangeKind::DocOnly
    } else {
        ChangeKind::None
    }
}

const PREDICATE_NAMES: &[&str] = &[
    "sd001_pii_requires_encryption",
    "sd002_sensitive_requires_retention",
    "sd003_pii_requires_compliance_tags",
    "sd004_restricted_requires_approved_use_cases",
    "sd005_pii_requires_data_residency",
    "dq001_sensitive_requires_completeness",
    "dq002_timestamp_requires_freshness",
    "dq003_primary_key_requires_uniqueness_declaration",
    "dq004_accuracy_threshold_coherent_with_classification",
    "dq005_quality_tier_present",
    "sg001_fields_have_descriptions",
    "sg002_no_field_required_and_nullable",
    "sg003_owner_identity_present",
    "sg004_string_fields_have_max_length",
    "sg005_enum_fields_list_values",
    "sg006_breaking_change_requires_major_bump",
    "sg007_versioning_strategy_note_present",
];

pub fn is_known_predicate(name: &str) -> bool {
    PREDICATE_NAMES.contains(&name)
}

fn eval_predicate(rule_ref: &str, contract: &Contract, predecessor: Option<&Contract>) -> RuleOutcome {
    match rule_ref {
        "sd001_pii_requires_encryption" => {
            let pii: Vec<String> = contract.pii_fields().iter().map(|f| f.name.clone()).collect();
            if !pii.is_empty() && !contract.governance.encryption_required {
                violated(pii, "PII fields present but encryption_required is false")
            } else {
                ok()
            }
        }
        "sd002_sensitive_requires_retention" => {
            let sensitive = matches!(
                contract.governance.classification,
                Classification::Confidential | Classification::Restricted
            );
            if sensitive && contract.governance.retention_days.is_none() {
                violated(vec!["governance.retention_days".into()], "classification requires a retention horizon")
            } else {
                ok()
            }
        }
        "sd003_pii_requires_compliance_tags" => {
            if contract.has_pii() && contract.governance.compliance_tags.is_empty() {
                let fields: Vec<String> = contract.pii_fields().iter().map(|f| f.name.clone()).collect();
                violated(fields, "PII present but no compliance tags declared")
            } else {
                ok()
            }
        }
        "sd004_restricted_requires_approved_use_cases" => {
            if contract.governance.classification == Classification::Restricted
                && contract.governance.approved_use_cases.is_empty()
            {
                violated(vec!["governance.approved_use_cases".into()], "restricted data requires approved use cases")
            } else {
                ok()
            }
        }
        "sd005_pii_requires_data_residency" => {
            if contract.has_pii() && contract.governance.data_residency.is_none() {
                violated(vec!["governance.data_residency".into()], "PII present but data residency is unset")
            } else {
                ok()
            }
        }
        "dq001_sensitive_requires_completeness" => {
            let sensitive = matches!(
                contract.governance.classification,
                Classification::Confidential | Classification::Restricted
            );
            if sensitive && contract.quality.completeness_threshold < 0.95 {
                violated(
                    vec!["quality.completeness_threshold".into()],
                    "sensitive classification requires completeness threshold >= 0.95",
                )
            } else {
                ok()
            }
        }
        "dq002_timestamp_requires_freshness" => {
            if contract.has_timestamp_field() && contract.quality.freshness_horizon_secs.is_none() {
                violated(vec!["quality.freshness_horizon_secs".into()], "timestamp field present but no freshness horizon")
            } else {
                ok()
            }
        }
        "dq003_primary_key_requires_uniqueness_declaration" => {
            let pk_names: Vec<String> = contract.primary_key_like_fields().iter().map(|f| f.name.clone()).collect();
            let uncovered: Vec<String> = pk_names
                .into_iter()
                .filter(|n| !contract.quality.uniqueness_keys.iter().any(|k| k == n))
                .collect();
            if !uncovered.is_empty() {
                violated(uncovered, "primary-key-like fields are not covered by a uniqueness declaration")
            } else {
                ok()
            }
        }
        "dq004_accuracy_threshold_coherent_with_classification" => {
            let min = contract.governance.classification.min_accuracy_threshold();
            if contract.quality.accuracy_threshold < min {
                violated(
                    vec!["quality.accuracy_threshold".into()],
                    format!("accuracy_threshold below minimum {:.2} for this classification", min),
                )
            } else {
                ok()
            }
        }
        "dq005_quality_tier_present" => {
            if contract.quality.quality_tier.as_deref().unwrap_or("").trim().is_empty() {
                violated(vec!["quality.quality_tier".into()], "no quality-tier label present")
            } else {
                ok()
            }
        }
        "sg001_fields_have_descriptions" => {
            let missing: Vec<String> = contract
                .schema
                .iter()
                .filter(|f| f.description.as_deref().unwrap_or("").trim().is_empty())
                .map(|f| f.name.clone())
                .collect();
            if !missing.is_empty() {
                violated(missing, "fields without a description")
            } else {
                ok()
            }
        }
        "sg002_no_field_required_and_nullable" => {
            let offenders: Vec<String> = contract
                .schema
                .iter()
                .filter(|f| f.required && f.nullable)
                .map(|f| f.name.clone())
                .collect();
            if !offenders.is_empty() {
                violated(offenders, "field marked required is also nullable")
            } else {
                ok()
            }
        }
        "sg003_owner_identity_present" => {
            if contract.owner_name.trim().is_empty() || contract.owner_contact.trim().is_empty() {
                violated(vec!["owner_name".into(), "owner_contact".into()], "owner name or contact missing")
            } else {
                ok()
            }
        }
        "sg004_string_fields_have_max_length" => {
            let missing: Vec<String> = contract
                .schema
                .iter()
                .filter(|f| f.field_type == FieldType::String && f.max_length.is_none())
                .map(|f| f.name.clone())
                .collect();
            if !missing.is_empty() {
                violated(missing, "string fields without max_length")
            } else {
                ok()
            }
        }
        "sg005_enum_fields_list_values" => {
            let missing: Vec<String> = contract
                .schema
                .iter()
                .filter(|f| f.enum_values.as_ref().map(|v| v.is_empty()).unwrap_or(false))
                .map(|f| f.name.clone())
                .collect();
            if !missing.is_empty() {
                violated(missing, "enumerated fields without listed values")
            } else {
                ok()
            }
        }
        "sg006_breaking_change_requires_major_bump" => match predecessor {
            None => ok(),
            Some(prev) => {
                let kind = classify_change(prev, contract);
                let major_bumped = contract.version.major > prev.version.major;
                if kind == ChangeKind::Breaking && !major_bumped {
                    violated(vec![], "breaking change detected without a MAJOR version bump")
                } else {
                    ok()
                }
            }
        },
        "sg007_versioning_strategy_note_present" => {
            if contract.versioning_strategy_note.as_deref().unwrap_or("").trim().is_empty() {
                violated(vec![], "contract carries no versioning-strategy note")
            } else {
                ok()
            }
        }
        other => violated(vec![], format!("unrecognized predicate reference: {other}")),
    }
}

/// Evaluates every applicable rule-category policy in `catalog` against
/// `contract`, producing Findings in the canonical order (severity, id,
/// field path). A predicate panic is caught and reported as a distinct
/// info-severity "engine-error" finding rather than propagated (§4.2).
pub fn evaluate(contract: &Contract, predecessor: Option<&Contract>, catalog: &CatalogSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut policies: Vec<&Policy> = catalog.rule_policies();
    policies.sort_by(|a, b| a.id.cmp(&b.id));

    for policy in policies {
        let rule_ref = match &policy.rule_ref {
            Some(r) => r.clone(),
            None => continue,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| eval_predicate(&rule_ref, contract, predecessor)));
        match outcome {
            Ok(RuleOutcome::Satisfied) => {}
            Ok(RuleOutcome::Violated { field_paths, detail }) => {
                findings.push(Finding::rule(&policy.id, policy.severity, field_paths, detail, policy.remediation.clone()));
            }
            Err(_) => {
                findings.push(Finding {
                    policy_id: "engine-error".to_string(),
                    severity: Severity::Info,
                    field_paths: vec![],
                    message: format!("predicate for policy {} failed internally", policy.id),
                    remediation: String::new(),
                    engine: Engine::Rule,
                    confidence: None,
                });
            }
        }
    }
    findings
}

pub fn applicable_policies(catalog: &CatalogSnapshot, category: Option<Category>) -> Vec<&Policy> {
    catalog.list(category)
}
