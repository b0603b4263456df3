use serde::{Deserialize, Serialize};

/// Ordered so that `Severity::Critical < Severity::Warning < Severity::Info`
/// matches the report ordering rule in §4.2 directly via derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SensitiveData,
    DataQuality,
    SchemaGovernance,
    Semantic,
}

/// A policy descriptor (§3.2). Rule policies carry `rule_ref`, a restricted
/// identifier resolved against the fixed predicate vocabulary in
/// [`crate::rules`]; semantic policies carry `prompt_template` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub rule_ref: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub remediation: String,
    /// Semantic policies only: report `verdict=unknown` judgments as an
    /// info-severity finding instead of dropping them (§4.3).
    #[serde(default)]
    pub reportable_on_unknown: bool,
}

impl Policy {
    pub fn is_semantic(&self) -> bool {
        matches!(self.category, Category::Semantic)
    }
}
