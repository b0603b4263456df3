//! Risk-aware strategy selection (spec §4.5). Decides which engines to run
//! for a contract, runs them, merges findings, and records the metadata the
//! caller needs to explain the decision — the orchestration layer that sits
//! between `governance-core::analyzer` and `policy_engine`'s two evaluators.

use std::time::Instant;

use policy_engine::finding::merge_findings;
use policy_engine::semantic::apply_policy_severity;
use policy_engine::{
    CatalogSnapshot, Contract, Engine, Policy, ReportMetadata, SemanticEvaluator, Status,
    ValidationReport,
};

use crate::analyzer::{self, RiskLevel};
use crate::config::OrchestratorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Fast,
    Balanced,
    Thorough,
    Adaptive,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Fast => "fast",
            Strategy::Balanced => "balanced",
            Strategy::Thorough => "thorough",
            Strategy::Adaptive => "adaptive",
        }
    }
}

/// Chooses the semantic policy subset for BALANCED per spec §4.5.
fn balanced_subset<'a>(
    contract: &Contract,
    complexity: f64,
    catalog: &'a CatalogSnapshot,
    config: &OrchestratorConfig,
) -> Vec<&'a Policy> {
    let sensitive_classification = matches!(
        contract.governance.classification,
        policy_engine::Classification::Confidential | policy_engine::Classification::Restricted
    );
    catalog
        .semantic_policies()
        .into_iter()
        .filter(|p| match p.id.as_str() {
            "SEM001" => contract.has_pii(),
            "SEM004" => !contract.governance.compliance_tags.is_empty(),
            "SEM002" => complexity >= config.balanced_semantic_complexity_floor,
            "SEM003" => contract.has_pii() || sensitive_classification,
            _ => false,
        })
        .collect()
}

/// Resolves an ADAPTIVE request to a concrete strategy per the decision
/// table in §4.5, given the analyzer's risk level and complexity score.
fn resolve_adaptive(risk: RiskLevel, complexity: f64, config: &OrchestratorConfig) -> Strategy {
    if matches!(risk, RiskLevel::Critical | RiskLevel::High) {
        Strategy::Thorough
    } else if risk == RiskLevel::Low && complexity < config.fast_complexity_ceiling {
        Strategy::Fast
    } else {
        Strategy::Balanced
    }
}

pub struct Orchestrator {
    semantic: SemanticEvaluator,
}

impl Orchestrator {
    pub fn new(semantic: SemanticEvaluator) -> Self {
        Self { semantic }
    }

    /// Runs validation for `contract` against `predecessor` (the dataset's
    /// previous committed version, if any) using `catalog`, honoring an
    /// optional `deadline`. Never returns an `Err` — rule-predicate panics
    /// and semantic unavailability are both folded into findings.
    pub fn validate(
        &self,
        contract: &Contract,
        predecessor: Option<&Contract>,
        catalog: &CatalogSnapshot,
        strategy_requested: Strategy,
        deadline: Option<Instant>,
        config: &OrchestratorConfig,
    ) -> ValidationReport {
        let started = Instant::now();
        let analysis = analyzer::analyze(contract);

        let mut degraded_from: Option<Strategy> = None;
        let mut executed = strategy_requested;
        if strategy_requested == Strategy::Adaptive {
            executed = resolve_adaptive(analysis.risk_level, analysis.complexity_score, config);
        }
        if executed != Strategy::Fast && !self.semantic.is_available() {
            degraded_from = Some(executed);
            executed = Strategy::Fast;
        }

        let mut engines_used = vec![Engine::Rule];
        let rule_findings = policy_engine::rules::evaluate(contract, predecessor, catalog);

        let deadline_already_passed = deadline.map(|d| Instant::now() > d).unwrap_or(false);

        let (semantic_findings, semantic_executed, reasoning_suffix) = if executed == Strategy::Fast
            || deadline_already_passed
        {
            (vec![], vec![], "no semantic policies selected".to_string())
        } else {
            let subset: Vec<&Policy> = match executed {
                Strategy::Balanced => {
                    balanced_subset(contract, analysis.complexity_score, catalog, config)
                }
                Strategy::Thorough => catalog.semantic_policies(),
                Strategy::Fast | Strategy::Adaptive => vec![],
            };
            if subset.is_empty() {
                (vec![], vec![], "no semantic policies selected".to_string())
            } else {
                engines_used.push(Engine::Semantic);
                let run = self.semantic.run(contract, &subset, deadline);
                let reasoning = if run.unavailable {
                    "semantic backend unavailable, rule-only findings returned".to_string()
                } else {
                    format!("ran {} semantic polic(ies)", run.policies_executed.len())
                };
                (run.findings, run.policies_executed, reasoning)
            }
        };

        let mut merged = rule_findings;
        merged.extend(semantic_findings);
        let mut merged = merge_findings(merged);
        apply_policy_severity(&mut merged, catalog);

        let deadline_exceeded =
            deadline_already_passed || deadline.map(|d| Instant::now() > d).unwrap_or(false);

        let policies_evaluated = catalog.rule_policies().len() + semantic_executed.len();
        let metadata = ReportMetadata {
            strategy_requested: strategy_requested.as_str().to_string(),
            strategy_executed: executed.as_str().to_string(),
            risk_level: analysis.risk_level.as_str().to_string(),
            complexity_score: analysis.complexity_score,
            engines_used,
            semantic_policies_executed: semantic_executed,
            reasoning: format!(
                "risk={}, complexity={:.1}: {}",
                analysis.risk_level.as_str(),
                analysis.complexity_score,
                reasoning_suffix
            ),
            wallclock_ms: started.elapsed().as_millis() as u64,
            degraded_from: degraded_from.map(|s| s.as_str().to_string()),
            deadline_exceeded,
        };

        let mut report = ValidationReport::from_findings(merged, policies_evaluated, metadata);
        if report.metadata.deadline_exceeded && report.status == Status::Passed {
            report.status = Status::Warning;
        }
        report
    }
}
