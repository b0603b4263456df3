//! Load bench for the orchestrate-then-commit path, generalizing the
//! teacher's `load_ingest.rs` ingest+commit+replay harness (percentile
//! latencies, a resource sampler thread, env-overridable N/M) into repeated
//! `Coordinator::create_or_update_contract` calls across many synthetic
//! datasets and parallel sessions.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use sysinfo::System;

use governance_core::config::GovernanceConfig;
use governance_core::coordinator::{Coordinator, Outcome};
use governance_core::init::ensure_initialized_at;
use governance_core::orchestrator::Strategy;
use governance_core::RawContractInput;
use policy_engine::semantic::{Judgment, SemanticError, SemanticRequest, Verdict};
use policy_engine::{
    Classification, Field, FieldType, Governance, LmBackend, Quality, SemanticEvaluator,
};

struct AlwaysUpBackend;
impl LmBackend for AlwaysUpBackend {
    fn probe(&self) -> bool {
        true
    }
    fn submit(&self, _request: SemanticRequest, _deadline: Instant) -> Result<Judgment, SemanticError> {
        Ok(Judgment { verdict: Verdict::Ok, field_paths: vec![], message: "fine".into(), confidence: 0.9 })
    }
}

#[derive(Clone, Debug)]
struct BenchCfg {
    contracts_per_session: usize, // N
    parallel_sessions: usize,     // M
    dataset_prefix: String,
}

#[derive(Debug, Clone, Default)]
struct Metrics {
    commit_latencies_ms: Vec<f64>,
    update_latencies_ms: Vec<f64>,
    errors: usize,
    creates: usize,
    updates: usize,
    max_rss_mb: f64,
    avg_cpu_percent: f64,
}

fn pct(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() as f64 - 1.0)).clamp(0.0, sorted.len() as f64 - 1.0);
    sorted[rank.round() as usize]
}

fn random_field_name(rng: &mut StdRng, idx: usize) -> String {
    let suffix: String = rng.sample_iter(&Alphanumeric).take(6).map(char::from).collect();
    format!("field_{idx}_{suffix}")
}

fn random_schema(rng: &mut StdRng) -> Vec<Field> {
    let count = rng.gen_range(3..9);
    (0..count)
        .map(|i| Field {
            name: random_field_name(rng, i),
            field_type: if i % 3 == 0 { FieldType::Int } else { FieldType::String },
            nullable: i % 2 == 0,
            required: i % 2 != 0,
            description: Some("synthetic bench field".into()),
            max_length: Some(64),
            pii: false,
            enum_values: None,
            unique: false,
        })
        .collect()
}

fn random_raw(rng: &mut StdRng, dataset_prefix: &str, session: usize, i: usize) -> RawContractInput {
    RawContractInput {
        dataset_name: format!("{dataset_prefix}_s{session}_c{i}"),
        owner_name: "Bench Owner".into(),
        owner_contact: "bench@example.com".into(),
        domain_tag: "bench".into(),
        stewards: vec![],
        schema: random_schema(rng),
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

fn sample_process_metrics(sys: &mut System) -> (f64, f64) {
    sys.refresh_processes();
    let pid = sysinfo::Pid::from_u32(std::process::id());
    if let Some(p) = sys.process(pid) {
        (p.memory() as f64 / (1024.0 * 1024.0), p.cpu_usage() as f64)
    } else {
        (0.0, 0.0)
    }
}

fn run_bench(cfg: BenchCfg) -> anyhow::Result<Metrics> {
    let tmp = tempfile::tempdir()?;
    let init = ensure_initialized_at(tmp.path())?;

    let coordinator = Arc::new(Coordinator::from_config(
        init.config.clone(),
        policy_engine::PolicyCatalog::load(&init.config.policies.path)?,
        Arc::new(AlwaysUpBackend),
    ));

    let metrics = Arc::new(Mutex::new(Metrics::default()));
    let start = Instant::now();

    let mut workers = Vec::new();
    for session in 0..cfg.parallel_sessions {
        let coordinator = Arc::clone(&coordinator);
        let mref = Arc::clone(&metrics);
        let prefix = cfg.dataset_prefix.clone();
        let n = cfg.contracts_per_session;
        workers.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(0xC0FFEE + session as u64);
            let mut commit_lat = Vec::with_capacity(n);
            let mut update_lat = Vec::with_capacity(n);
            let mut errors = 0usize;
            let mut creates = 0usize;
            let mut updates = 0usize;

            for i in 0..n {
                let raw = random_raw(&mut rng, &prefix, session, i);
                let t0 = Instant::now();
                let result = coordinator.create_or_update_contract(raw.clone(), Strategy::Adaptive, None, "bench");
                let t1 = Instant::now();
                match result {
                    Ok(r) if matches!(r.outcome, Outcome::Committed { .. }) => {
                        commit_lat.push((t1 - t0).as_secs_f64() * 1000.0);
                        creates += 1;
                    }
                    _ => {
                        errors += 1;
                        continue;
                    }
                }

                // A second, additive write against the same dataset — the
                // "update" half of each interaction, mirroring how the
                // teacher bench paired a commit with a replay.
                let mut raw_v2 = raw;
                raw_v2.schema.push(Field {
                    name: "added_field".into(),
                    field_type: FieldType::String,
                    nullable: true,
                    required: false,
                    description: Some("additive bench field".into()),
                    max_length: Some(32),
                    pii: false,
                    enum_values: None,
                    unique: false,
                });
                let t2 = Instant::now();
                let result = coordinator.create_or_update_contract(raw_v2, Strategy::Adaptive, None, "bench");
                let t3 = Instant::now();
                match result {
                    Ok(r) if matches!(r.outcome, Outcome::Committed { .. }) => {
                        update_lat.push((t3 - t2).as_secs_f64() * 1000.0);
                        updates += 1;
                    }
                    _ => errors += 1,
                }
            }

            let mut m = mref.lock().unwrap();
            m.commit_latencies_ms.extend(commit_lat);
            m.update_latencies_ms.extend(update_lat);
            m.errors += errors;
            m.creates += creates;
            m.updates += updates;
        }));
    }

    let sampler_running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let sampler_flag = Arc::clone(&sampler_running);
    let sampler = thread::spawn(move || {
        let mut sys = System::new_all();
        let mut max_rss = 0.0f64;
        let mut cpu_sum = 0.0f64;
        let mut cpu_count = 0usize;
        while sampler_flag.load(std::sync::atomic::Ordering::Relaxed) {
            let (rss, cpu) = sample_process_metrics(&mut sys);
            if rss > max_rss {
                max_rss = rss;
            }
            cpu_sum += cpu;
            cpu_count += 1;
            thread::sleep(Duration::from_millis(50));
        }
        let avg_cpu = if cpu_count == 0 { 0.0 } else { cpu_sum / cpu_count as f64 };
        (max_rss, avg_cpu)
    });

    for h in workers {
        let _ = h.join();
    }
    sampler_running.store(false, std::sync::atomic::Ordering::Relaxed);
    let (max_rss, avg_cpu) = sampler.join().unwrap_or((0.0, 0.0));

    let mut result = metrics.lock().unwrap().clone();
    result.max_rss_mb = max_rss;
    result.avg_cpu_percent = avg_cpu;
    result.commit_latencies_ms.sort_by(|a, b| a.partial_cmp(b).unwrap());
    result.update_latencies_ms.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let _ = start.elapsed();
    Ok(result)
}

fn main() -> anyhow::Result<()> {
    let n: usize = std::env::var("GOV_BENCH_N").ok().and_then(|s| s.parse().ok()).unwrap_or(200);
    let m: usize = std::env::var("GOV_BENCH_M").ok().and_then(|s| s.parse().ok()).unwrap_or(4);
    let cfg = BenchCfg { contracts_per_session: n, parallel_sessions: m, dataset_prefix: "bench_ds".to_string() };

    eprintln!("Running workload: create+update contracts — N={n} M={m}");
    let start = Instant::now();
    let metrics = run_bench(cfg)?;
    let dur_s = start.elapsed().as_secs_f64();

    let total_ops = (metrics.creates + metrics.updates) as f64;
    let throughput = if dur_s > 0.0 { total_ops / dur_s } else { 0.0 };

    let p50c = pct(&metrics.commit_latencies_ms, 0.50);
    let p95c = pct(&metrics.commit_latencies_ms, 0.95);
    let p99c = pct(&metrics.commit_latencies_ms, 0.99);
    let p50u = pct(&metrics.update_latencies_ms, 0.50);
    let p95u = pct(&metrics.update_latencies_ms, 0.95);
    let p99u = pct(&metrics.update_latencies_ms, 0.99);

    let error_rate = if total_ops > 0.0 { metrics.errors as f64 / total_ops * 100.0 } else { 0.0 };

    println!("--- governance-core orchestrate bench: create + update ---");
    println!("Throughput: {throughput:.1} contracts/sec");
    println!("Latency create ms: p50 {p50c:.1} p95 {p95c:.1} p99 {p99c:.1}");
    println!("Latency update ms: p50 {p50u:.1} p95 {p95u:.1} p99 {p99u:.1}");
    println!("Resource: max RSS {:.1} MB, avg CPU {:.1}%", metrics.max_rss_mb, metrics.avg_cpu_percent);
    println!("Errors: {} ({:.3}%)", metrics.errors, error_rate);

    Ok(())
}
