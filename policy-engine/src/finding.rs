use serde::{Deserialize, Serialize};

use crate::policy::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Rule,
    Semantic,
}

/// A single violation detection (§3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub policy_id: String,
    pub severity: Severity,
    pub field_paths: Vec<String>,
    pub message: String,
    pub remediation: String,
    pub engine: Engine,
    /// Only populated for semantic findings.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Finding {
    pub fn rule(policy_id: &str, severity: Severity, field_paths: Vec<String>, message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            severity,
            field_paths,
            message: message.into(),
            remediation: remediation.into(),
            engine: Engine::Rule,
            confidence: None,
        }
    }

    pub fn semantic(policy_id: &str, severity: Severity, field_paths: Vec<String>, message: impl Into<String>, remediation: impl Into<String>, confidence: f64) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            severity,
            field_paths,
            message: message.into(),
            remediation: remediation.into(),
            engine: Engine::Semantic,
            confidence: Some(confidence),
        }
    }

    /// Sort key per §4.2: severity order, then policy id, then first field path.
    fn sort_key(&self) -> (Severity, String, String) {
        (
            self.severity,
            self.policy_id.clone(),
            self.field_paths.first().cloned().unwrap_or_default(),
        )
    }
}

pub fn sort_findings(findings: &mut Vec<Finding>) {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Collapses duplicate findings (same policy id + field path), keeping the
/// higher-severity one; ties keep the higher-confidence one (rule = 1.0),
/// per the orchestrator merge rule in §4.5.
pub fn merge_findings(mut findings: Vec<Finding>) -> Vec<Finding> {
    use std::collections::HashMap;

    let mut best: HashMap<(String, String), Finding> = HashMap::new();
    for f in findings.drain(..) {
        let key = (f.policy_id.clone(), f.field_paths.first().cloned().unwrap_or_default());
        match best.get(&key) {
            None => {
                best.insert(key, f);
            }
            Some(existing) => {
                let existing_conf = existing.confidence.unwrap_or(1.0);
                let new_conf = f.confidence.unwrap_or(1.0);
                let replace = f.severity < existing.severity
                    || (f.severity == existing.severity && new_conf > existing_conf);
                if replace {
                    best.insert(key, f);
                }
            }
        }
    }
    let mut merged: Vec<Finding> = best.into_values().collect();
    sort_findings(&mut merged);
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Warning,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Counts {
    pub passed: u32,
    pub warnings: u32,
    pub failures: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub strategy_requested: String,
    pub strategy_executed: String,
    pub risk_level: String,
    pub complexity_score: f64,
    pub engines_used: Vec<Engine>,
    pub semantic_policies_executed: Vec<String>,
    pub reasoning: String,
    pub wallclock_ms: u64,
    #[serde(default)]
    pub degraded_from: Option<String>,
    #[serde(default)]
    pub deadline_exceeded: bool,
}

/// Aggregate over findings (§3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: Status,
    pub counts: Counts,
    pub findings: Vec<Finding>,
    pub metadata: ReportMetadata,
}

impl ValidationReport {
    /// `policies_evaluated` is the number of distinct policies the engines
    /// actually ran (rule + semantic); it drives `counts.passed` for policies
    /// that produced no finding at all. Severity still determines `status`
    /// per the rule in §3.4: failed iff any critical finding, else warning
    /// iff any warning finding, else passed.
    pub fn from_findings(findings: Vec<Finding>, policies_evaluated: usize, metadata: ReportMetadata) -> Self {
        let mut findings = findings;
        sort_findings(&mut findings);

        let mut violated_critical = std::collections::HashSet::new();
        let mut violated_warning = std::collections::HashSet::new();
        for f in &findings {
            match f.severity {
                Severity::Critical => {
                    violated_critical.insert(f.policy_id.clone());
                }
                Severity::Warning => {
                    violated_warning.insert(f.policy_id.clone());
                }
                Severity::Info => {}
            }
        }
        let failures = violated_critical.len() as u32;
        let warnings = violated_warning.len() as u32;
        let violated = violated_critical.len() + violated_warning.len();
        let passed = policies_evaluated.saturating_sub(violated) as u32;
        let counts = Counts { passed, warnings, failures };

        let status = if failures > 0 {
            Status::Failed
        } else if warnings > 0 {
            Status::Warning
        } else {
            Status::Passed
        };

        Self { status, counts, findings, metadata }
    }
}
