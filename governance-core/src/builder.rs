//! Contract Builder (spec §4.6, build half). Turns raw dataset metadata plus
//! a schema description into a normalized, fingerprinted candidate contract
//! with no version assigned yet — `versioner` assigns the version once a
//! predecessor (or its absence) is known.

use std::collections::BTreeSet;

use policy_engine::{Contract, Field, Governance, Quality, SubscriptionSla, Version};

use crate::error::GovernanceError;

/// Raw, not-yet-validated dataset metadata — the shape a `SchemaImporter`
/// collaborator (§6.5) or an API caller hands in. Same fields as `Contract`
/// minus the two identity fields the builder itself derives (`version`,
/// `fingerprint`).
#[derive(Debug, Clone)]
pub struct RawContractInput {
    pub dataset_name: String,
    pub owner_name: String,
    pub owner_contact: String,
    pub domain_tag: String,
    pub stewards: Vec<String>,
    pub schema: Vec<Field>,
    pub governance: Governance,
    pub quality: Quality,
    pub subscriptions: Vec<SubscriptionSla>,
    pub versioning_strategy_note: Option<String>,
    /// A caller-asserted target version (e.g. a subscription-approval flow
    /// re-submitting a specific bump). `None` lets the coordinator assign
    /// the version automatically from the predecessor diff (§4.6) — the
    /// common case. When present, SG006 validates the assertion against the
    /// predecessor instead of trusting it.
    pub declared_version: Option<Version>,
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

/// Normalizes whitespace-only cosmetic noise (owner identity, dataset name,
/// field descriptions) without touching field order — the order a caller
/// supplies is presentation order and is preserved verbatim; only
/// `Contract::canonical_schema_form` reorders, and only for fingerprinting.
fn normalize(mut raw: RawContractInput) -> RawContractInput {
    trim_in_place(&mut raw.dataset_name);
    trim_in_place(&mut raw.owner_name);
    trim_in_place(&mut raw.owner_contact);
    trim_in_place(&mut raw.domain_tag);
    for field in &mut raw.schema {
        trim_in_place(&mut field.name);
        if let Some(desc) = &mut field.description {
            trim_in_place(desc);
        }
    }
    raw
}

/// Builds a candidate contract from raw metadata. When `raw.declared_version`
/// is absent the returned contract carries a placeholder `1.0.0` version;
/// the coordinator runs it through `versioner::assign_version` against the
/// dataset's predecessor (or lack thereof) before it is fit to commit. When
/// present, the declared version is carried through as-is so SG006 can
/// validate it against the predecessor diff.
pub fn build(raw: RawContractInput) -> Result<Contract, GovernanceError> {
    let raw = normalize(raw);
    if raw.dataset_name.is_empty() {
        return Err(GovernanceError::InvalidContract {
            dataset: raw.dataset_name,
            detail: "dataset name is empty".to_string(),
        });
    }

    let mut seen = BTreeSet::new();
    for field in &raw.schema {
        if !seen.insert(field.name.clone()) {
            return Err(GovernanceError::InvalidContract {
                dataset: raw.dataset_name.clone(),
                detail: format!("duplicate field name: {}", field.name),
            });
        }
    }

    let mut contract = Contract {
        dataset_name: raw.dataset_name.clone(),
        version: raw.declared_version.unwrap_or_else(Version::initial),
        fingerprint: None,
        owner_name: raw.owner_name,
        owner_contact: raw.owner_contact,
        domain_tag: raw.domain_tag,
        stewards: raw.stewards,
        schema: raw.schema,
        governance: raw.governance,
        quality: raw.quality,
        subscriptions: raw.subscriptions,
        versioning_strategy_note: raw.versioning_strategy_note,
    };

    contract.validate_shape().map_err(|detail| GovernanceError::InvalidContract {
        dataset: contract.dataset_name.clone(),
        detail,
    })?;

    contract.fingerprint = Some(contract.compute_fingerprint());
    Ok(contract)
}
