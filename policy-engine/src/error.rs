use thiserror::Error;

/// Errors from loading or reloading the policy catalog (§4.1, §7).
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("duplicate policy id: {0}")]
    DuplicateId(String),

    #[error("policy file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy file {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown severity {0:?} on policy")]
    UnknownSeverity(String),

    #[error("policy {0} is missing remediation text")]
    MissingRemediation(String),

    #[error("unknown rule predicate reference: {0}")]
    UnknownPredicate(String),

    #[error("no such policy: {0}")]
    NotFound(String),
}

impl PolicyError {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::DuplicateId(_) => "policy_catalog_duplicate_id",
            PolicyError::Io(_) => "policy_catalog_io",
            PolicyError::Parse { .. } => "policy_catalog_parse",
            PolicyError::UnknownSeverity(_) => "policy_catalog_unknown_severity",
            PolicyError::MissingRemediation(_) => "policy_catalog_missing_remediation",
            PolicyError::UnknownPredicate(_) => "policy_catalog_unknown_predicate",
            PolicyError::NotFound(_) => "policy_not_found",
        }
    }
}
