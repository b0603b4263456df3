//! Risk-aware contract validation and content-addressed contract history:
//! the Contract Analyzer, Orchestrator, Contract Builder/Versioner/
//! Serializer, History Store, and Coordinator layered on top of
//! `policy_engine`'s Policy Catalog, Rule Evaluator, and Semantic Evaluator.

pub mod analyzer;
pub mod builder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod init;
pub mod orchestrator;
pub mod serializer;
pub mod versioner;

pub use analyzer::{AnalysisReport, RiskLevel};
pub use builder::RawContractInput;
pub use config::GovernanceConfig;
pub use coordinator::{Coordinator, CoordinatorResult, Outcome};
pub use error::GovernanceError;
pub use history::{CommitMeta, CommitRequest, HistoryStore};
pub use init::{ensure_initialized_at, ensure_initialized_once, InitReport};
pub use orchestrator::{Orchestrator, Strategy};
