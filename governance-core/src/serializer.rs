//! Dual contract serialization (spec §4.6, §6.2): a stable, block-structured
//! human-readable text form and a canonical machine-readable form. Both are
//! pure functions of a `Contract`, so `serialize ∘ parse ∘ serialize` is
//! idempotent by construction — parsing reconstructs exactly the fields
//! each form carries, and the fingerprint is always recomputed rather than
//! trusted from the wire.
//!
//! The machine form follows the teacher's `contracts::store::canonical_hash`
//! recipe: round-trip through `serde_json::Value`, whose default (non
//! `preserve_order`) `Map` is a `BTreeMap`, so keys come out sorted with no
//! extra canonicalization pass needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use policy_engine::{Contract, Field, Governance, Quality, SubscriptionSla, Version};

#[derive(Debug, Serialize, Deserialize)]
struct DatasetBlock {
    name: String,
    version: String,
    owner_name: String,
    owner_contact: String,
    domain_tag: String,
    #[serde(default)]
    stewards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    versioning_strategy_note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HumanDoc {
    dataset: DatasetBlock,
    schema: Vec<Field>,
    governance: Governance,
    quality: Quality,
    #[serde(default)]
    subscriptions: Vec<SubscriptionSla>,
}

fn parse_version(s: &str) -> Result<Version, String> {
    let mut parts = s.splitn(3, '.');
    let major = parts.next().ok_or("missing major")?.parse().map_err(|_| "bad major")?;
    let minor = parts.next().ok_or("missing minor")?.parse().map_err(|_| "bad minor")?;
    let patch = parts.next().ok_or("missing patch")?.parse().map_err(|_| "bad patch")?;
    Ok(Version::new(major, minor, patch))
}

/// Renders the human-readable form (spec §6.2): fixed header comment, then
/// the five blocks in the fixed order `dataset`, `schema`, `governance`,
/// `quality`, `subscriptions` as TOML — which is both the teacher's own
/// on-disk format (`config.toml`) and trivially re-parseable.
pub fn render_human(contract: &Contract, generated_at: DateTime<Utc>) -> String {
    let header = format!(
        "# Data Contract\n# Dataset: {}\n# Version: {}\n# Generated: {}\n\n",
        contract.dataset_name,
        contract.version,
        generated_at.to_rfc3339(),
    );

    let doc = HumanDoc {
        dataset: DatasetBlock {
            name: contract.dataset_name.clone(),
            version: contract.version.to_string(),
            owner_name: contract.owner_name.clone(),
            owner_contact: contract.owner_contact.clone(),
            domain_tag: contract.domain_tag.clone(),
            stewards: contract.stewards.clone(),
            versioning_strategy_note: contract.versioning_strategy_note.clone(),
        },
        schema: contract.schema.clone(),
        governance: contract.governance.clone(),
        quality: contract.quality.clone(),
        subscriptions: contract.subscriptions.clone(),
    };

    let body = toml::to_string_pretty(&doc).expect("contract always serializes to toml");
    let mut out = header;
    out.push_str(&body);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Parses a human-readable form back into a `Contract`, recomputing the
/// fingerprint from the parsed schema rather than trusting any on-disk copy.
pub fn parse_human(text: &str) -> Result<Contract, String> {
    let body_start = text
        .lines()
        .position(|l| !l.starts_with('#') && !l.trim().is_empty())
        .ok_or("no TOML body found after header comment")?;
    let body: String = text.lines().skip(body_start).collect::<Vec<_>>().join("\n");
    let doc: HumanDoc = toml::from_str(&body).map_err(|e| format!("parse human contract: {e}"))?;
    let version = parse_version(&doc.dataset.version)?;

    let mut contract = Contract {
        dataset_name: doc.dataset.name,
        version,
        fingerprint: None,
        owner_name: doc.dataset.owner_name,
        owner_contact: doc.dataset.owner_contact,
        domain_tag: doc.dataset.domain_tag,
        stewards: doc.dataset.stewards,
        schema: doc.schema,
        governance: doc.governance,
        quality: doc.quality,
        subscriptions: doc.subscriptions,
        versioning_strategy_note: doc.dataset.versioning_strategy_note,
    };
    contract.fingerprint = Some(contract.compute_fingerprint());
    Ok(contract)
}

/// Renders the canonical machine-readable form: `serde_json::Value` with
/// sorted keys and no padding, matching the teacher's canonical-hash recipe.
pub fn render_machine(contract: &Contract) -> Vec<u8> {
    let value = serde_json::to_value(contract).expect("contract always serializes to json");
    serde_json::to_vec(&value).expect("canonical value always serializes")
}

pub fn parse_machine(bytes: &[u8]) -> Result<Contract, String> {
    let mut contract: Contract = serde_json::from_slice(bytes).map_err(|e| format!("parse machine contract: {e}"))?;
    contract.fingerprint = Some(contract.compute_fingerprint());
    Ok(contract)
}
