//! LM-assisted semantic evaluation (§4.3). Bounded parallel fan-out over a
//! small worker pool, built the same way the rest of this codebase reaches
//! for `crossbeam-channel` + `std::thread` instead of an async runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSnapshot;
use crate::contract::Contract;
use crate::finding::Finding;
use crate::policy::Policy;

#[derive(Debug, Clone, Serialize)]
pub struct SemanticRequest {
    pub model_id: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    Violation,
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Judgment {
    pub verdict: Verdict,
    #[serde(default)]
    pub field_paths: Vec<String>,
    pub message: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SemanticError {
    #[error("semantic backend unavailable")]
    Unavailable,
    #[error("semantic backend call timed out")]
    Timeout,
    #[error("semantic backend returned an unparsable judgment: {0}")]
    BadResponse(String),
}

/// External language-model backend collaborator (§6.4). Implementations are
/// supplied by the embedding application; this workspace never implements a
/// real backend, only the contract for one — mirroring the teacher's
/// `LlmClient` trait boundary.
pub trait LmBackend: Send + Sync {
    fn probe(&self) -> bool;
    fn submit(&self, request: SemanticRequest, deadline: Instant) -> Result<Judgment, SemanticError>;
}

fn build_prompt(policy: &Policy, contract: &Contract) -> String {
    let template = policy.prompt_template.as_deref().unwrap_or("Evaluate the following contract.");
    format!(
        "{template}\n\ndataset: {}\nclassification: {:?}\nfield_count: {}\npii_fields: {:?}\ncompliance_tags: {:?}\n",
        contract.dataset_name,
        contract.governance.classification,
        contract.schema.len(),
        contract.pii_fields().iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        contract.governance.compliance_tags,
    )
}

fn unavailable_finding(policy_id: &str) -> Finding {
    Finding::semantic(policy_id, crate::policy::Severity::Info, vec![], "semantic-unavailable", "retry once the semantic backend recovers", 0.0)
}

/// Emitted when `run`'s collector deadline expires before a policy's worker
/// reports back, regardless of whether the backend itself ever honors the
/// `call_deadline` it was handed.
fn timeout_finding(policy_id: &str) -> Finding {
    Finding::semantic(policy_id, crate::policy::Severity::Info, vec![], "semantic-timeout", "retry once the semantic backend responds within its deadline", 0.0)
}

/// Process-wide semantic back-pressure (§5): a fixed pool of tokens shared
/// across every call to `run`, independent of the per-run fan-out. A worker
/// blocks on `acquire` before submitting to the backend, so excess requests
/// queue here rather than piling onto the backend.
struct InFlightLimiter {
    give_back: crossbeam_channel::Sender<()>,
    slots: crossbeam_channel::Receiver<()>,
}

impl InFlightLimiter {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        for _ in 0..capacity {
            tx.send(()).expect("prefilling a freshly created channel never blocks");
        }
        Self { give_back: tx, slots: rx }
    }

    fn acquire(&self) -> InFlightPermit<'_> {
        self.slots.recv().expect("limiter channel outlives every permit it issues");
        InFlightPermit { give_back: &self.give_back }
    }
}

struct InFlightPermit<'a> {
    give_back: &'a crossbeam_channel::Sender<()>,
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        let _ = self.give_back.send(());
    }
}

pub struct SemanticEvaluator {
    backend: Arc<dyn LmBackend>,
    fan_out: usize,
    per_call_timeout: Duration,
    available: AtomicBool,
    limiter: Arc<InFlightLimiter>,
}

pub struct SemanticRun {
    pub findings: Vec<Finding>,
    pub policies_executed: Vec<String>,
    pub unavailable: bool,
}

impl SemanticEvaluator {
    pub fn new(backend: Arc<dyn LmBackend>) -> Self {
        let available = backend.probe();
        Self {
            backend,
            fan_out: 4,
            per_call_timeout: Duration::from_secs(30),
            available: AtomicBool::new(available),
            limiter: Arc::new(InFlightLimiter::new(32)),
        }
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Caps process-wide concurrent semantic submissions (§5's default 32),
    /// independent of the per-run fan-out set by `with_fan_out`.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.limiter = Arc::new(InFlightLimiter::new(max_in_flight));
        self
    }

    /// Re-probes the backend; callers invoke this on a bounded cadence
    /// (§4.3 availability gate).
    pub fn refresh_availability(&self) {
        self.available.store(self.backend.probe(), Ordering::Relaxed);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Evaluates `policies` (assumed semantic-category) against `contract`
    /// with bounded fan-out, honoring `deadline` if given. Never returns an
    /// `Err` — unavailability and timeouts become info findings per policy.
    pub fn run(&self, contract: &Contract, policies: &[&Policy], deadline: Option<Instant>) -> SemanticRun {
        if !self.is_available() {
            return SemanticRun {
                findings: policies.iter().map(|p| unavailable_finding(&p.id)).collect(),
                policies_executed: vec![],
                unavailable: true,
            };
        }
        if policies.is_empty() {
            return SemanticRun { findings: vec![], policies_executed: vec![], unavailable: false };
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(String, SemanticRequest)>();
        let (res_tx, res_rx) = crossbeam_channel::unbounded::<(String, Result<Judgment, SemanticError>)>();

        for policy in policies {
            job_tx.send((policy.id.clone(), SemanticRequest {
                model_id: "semantic-evaluator-default".into(),
                prompt: build_prompt(policy, contract),
                max_tokens: 512,
                temperature: 0.0,
            })).expect("job channel send");
        }
        drop(job_tx);

        let workers = self.fan_out.min(policies.len());
        let call_timeout = self.per_call_timeout;

        // Detached, not `thread::scope`: a scope's closure blocks on every
        // spawned thread joining before it returns, which would defeat the
        // collector's own deadline below if a backend call never returns.
        // Workers that outlive the deadline keep running and simply find
        // `res_tx` (or its last clone) dropped when they eventually finish.
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            let backend = Arc::clone(&self.backend);
            let limiter = Arc::clone(&self.limiter);
            thread::Builder::new()
                .name("semantic-evaluator-worker".into())
                .spawn(move || {
                    while let Ok((id, req)) = job_rx.recv() {
                        let call_deadline = match deadline {
                            Some(d) => d.min(Instant::now() + call_timeout),
                            None => Instant::now() + call_timeout,
                        };
                        let _permit = limiter.acquire();
                        let result = backend.submit(req, call_deadline);
                        let _ = res_tx.send((id, result));
                    }
                })
                .expect("spawning a semantic-evaluator worker thread");
        }
        drop(res_tx);

        let mut findings = Vec::new();
        let mut executed = Vec::new();
        let mut remaining: std::collections::HashSet<String> =
            policies.iter().map(|p| p.id.clone()).collect();

        // Enforce `deadline` locally via `recv_deadline` rather than trusting
        // the backend to respect the deadline it was handed: a policy whose
        // worker never returns is reported as timed out the moment the
        // collector's own wait expires, instead of blocking this call forever.
        while !remaining.is_empty() {
            let collector_deadline = match deadline {
                Some(d) => d.min(Instant::now() + call_timeout),
                None => Instant::now() + call_timeout,
            };
            match res_rx.recv_deadline(collector_deadline) {
                Ok((policy_id, result)) => {
                    remaining.remove(&policy_id);
                    let policy = policies.iter().find(|p| p.id == policy_id);
                    match result {
                        Ok(judgment) => {
                            executed.push(policy_id.clone());
                            if let Some(f) = translate_judgment(
                                &policy_id,
                                policy.map(|p| p.reportable_on_unknown).unwrap_or(false),
                                &judgment,
                            ) {
                                findings.push(f);
                            }
                        }
                        Err(_) => findings.push(unavailable_finding(&policy_id)),
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    for policy_id in remaining.drain() {
                        findings.push(timeout_finding(&policy_id));
                    }
                    break;
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    for policy_id in remaining.drain() {
                        findings.push(timeout_finding(&policy_id));
                    }
                    break;
                }
            }
        }
        SemanticRun { findings, policies_executed: executed, unavailable: false }
    }
}

fn translate_judgment(policy_id: &str, reportable_on_unknown: bool, judgment: &Judgment) -> Option<Finding> {
    match judgment.verdict {
        Verdict::Ok => None,
        Verdict::Unknown if !reportable_on_unknown => None,
        Verdict::Unknown => Some(Finding::semantic(
            policy_id,
            crate::policy::Severity::Info,
            judgment.field_paths.clone(),
            judgment.message.clone(),
            String::new(),
            judgment.confidence,
        )),
        Verdict::Violation => Some(Finding::semantic(
            policy_id,
            crate::policy::Severity::Warning,
            judgment.field_paths.clone(),
            judgment.message.clone(),
            String::new(),
            judgment.confidence,
        )),
    }
}

/// Applies the severity each policy declares (rather than a hard-coded
/// warning) once the catalog entry is known, used by the orchestrator after
/// merging rule and semantic findings.
pub fn apply_policy_severity(findings: &mut [Finding], catalog: &CatalogSnapshot) {
    for f in findings.iter_mut() {
        if let Some(policy) = catalog.get(&f.policy_id) {
            f.severity = policy.severity;
            if f.remediation.is_empty() {
                f.remediation = policy.remediation.clone();
            }
        }
    }
}
