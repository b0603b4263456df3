//! Contract Analyzer (spec §4.4): pure, deterministic risk/complexity
//! scoring over a `Contract`. No I/O, no locks — the same small pure
//! value-type style as the teacher's `Finalized`/`FinalizedStatus`.

use serde::{Deserialize, Serialize};

use policy_engine::{Classification, Contract};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub field_count: usize,
    pub has_pii: bool,
    pub pii_count: usize,
    pub classification: Classification,
    pub compliance_tag_count: usize,
    pub complexity_score: f64,
    pub risk_level: RiskLevel,
    pub concerns: Vec<String>,
}

/// Number of distinct quality rules a contract declares: the two mandatory
/// thresholds plus whichever optional quality constraints are present. Used
/// only to drive `complexity_score`'s quality term.
fn quality_rule_count(contract: &Contract) -> usize {
    let mut count = 2; // completeness_threshold, accuracy_threshold are mandatory
    if contract.quality.freshness_horizon_secs.is_some() {
        count += 1;
    }
    if contract.quality.availability_target.is_some() {
        count += 1;
    }
    if !contract.quality.uniqueness_keys.is_empty() {
        count += 1;
    }
    if contract.quality.quality_tier.is_some() {
        count += 1;
    }
    count
}

/// Computes the [0,100] complexity score per spec §4.4.
pub fn complexity_score(contract: &Contract) -> f64 {
    let field_term = (1.5 * contract.schema.len() as f64).min(30.0);
    let pii_term = (5.0 * contract.pii_fields().len() as f64).min(20.0);
    let tag_term = (10.0 * contract.compliance_tag_count() as f64).min(20.0);
    let quality_term = (3.0 * quality_rule_count(contract) as f64).min(15.0);
    let classification_term = contract.governance.classification.weight() as f64;

    (field_term + pii_term + tag_term + quality_term + classification_term).min(100.0)
}

/// Resolves the risk level per spec §4.4's decision table, evaluated
/// top-down so the first matching tier wins.
pub fn risk_level(contract: &Contract, complexity: f64) -> RiskLevel {
    let tags = contract.compliance_tag_count();
    let has_pii = contract.has_pii();
    let classification = contract.governance.classification;

    if classification == Classification::Restricted || tags >= 3 {
        return RiskLevel::Critical;
    }
    if (classification == Classification::Confidential && (has_pii || tags >= 1))
        || tags >= 2
        || complexity >= 70.0
    {
        return RiskLevel::High;
    }
    if has_pii
        || tags >= 1
        || classification == Classification::Confidential
        || contract.schema.len() > 15
        || complexity >= 40.0
    {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

fn concerns(contract: &Contract, complexity: f64, risk: RiskLevel) -> Vec<String> {
    let mut out = Vec::new();
    if contract.has_pii() {
        out.push(format!("{} PII field(s) present", contract.pii_fields().len()));
    }
    let tags = contract.compliance_tag_count();
    if tags > 0 {
        out.push(format!("{tags} compliance tag(s) declared"));
    }
    if contract.governance.classification >= Classification::Confidential {
        out.push(format!("classification is {:?}", contract.governance.classification));
    }
    if contract.schema.len() > 15 {
        out.push(format!("wide schema ({} fields)", contract.schema.len()));
    }
    if complexity >= 70.0 {
        out.push("complexity score in the high band".to_string());
    }
    if out.is_empty() {
        out.push(format!("no elevated drivers, risk={}", risk.as_str()));
    }
    out.truncate(8);
    out
}

/// Analyzes `contract`, producing the deterministic risk/complexity report
/// the orchestrator uses to pick a strategy.
pub fn analyze(contract: &Contract) -> AnalysisReport {
    let complexity = complexity_score(contract);
    let risk = risk_level(contract, complexity);
    AnalysisReport {
        field_count: contract.schema.len(),
        has_pii: contract.has_pii(),
        pii_count: contract.pii_fields().len(),
        classification: contract.governance.classification,
        compliance_tag_count: contract.compliance_tag_count(),
        complexity_score: complexity,
        risk_level: risk,
        concerns: concerns(contract, complexity, risk),
    }
}
