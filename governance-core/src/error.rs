//! Unified error taxonomy (spec §7). Every surfaced error carries a stable
//! `code()`, a human message, and dataset name/version context where
//! applicable — mirroring the teacher's `contracts::evaluator::LoadError`
//! `thiserror` style, but widened into one enum per spec §9's "unify all
//! outcomes behind one result-carrying return" directive.

use thiserror::Error;

use policy_engine::PolicyError;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("invalid contract for dataset {dataset}: {detail}")]
    InvalidContract { dataset: String, detail: String },

    #[error("policy catalog error: {0}")]
    PolicyCatalog(#[from] PolicyError),

    #[error("history conflict on dataset {dataset} after {retries} retries")]
    HistoryConflict { dataset: String, retries: u32 },

    #[error("history store io error: {0}")]
    HistoryIo(String),

    #[error("deadline exceeded while validating dataset {dataset}")]
    DeadlineExceeded { dataset: String },
}

impl GovernanceError {
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::InvalidContract { .. } => "invalid_contract",
            GovernanceError::PolicyCatalog(_) => "policy_catalog_error",
            GovernanceError::HistoryConflict { .. } => "history_conflict",
            GovernanceError::HistoryIo(_) => "history_io",
            GovernanceError::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}
