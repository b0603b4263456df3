use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic version for a contract: `MAJOR.MINOR.PATCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub const fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    pub fn bump_major(self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    pub fn bump_minor(self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    pub fn bump_patch(self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Timestamp,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    /// Whether a schema-importer or API caller declared this field required,
    /// independent of `nullable` (§3.1's "required fields are not nullable"
    /// invariant is checked, not assumed: the two flags are sourced
    /// separately from raw external metadata, and SG002 flags a contract
    /// that sets both).
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub pii: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub unique: bool,
}

impl Field {
    /// True when this field is either explicitly marked required or is
    /// non-nullable; used by `Contract::required_fields` and the quality/
    /// schema-governance predicates that care whether a value is mandatory.
    /// This is deliberately permissive of the inconsistent case (`required`
    /// and `nullable` both true) — SG002 is what flags that, not this.
    pub fn required(&self) -> bool {
        self.required || !self.nullable
    }

    /// Looks like a primary-key column by naming convention, independent of
    /// any explicit uniqueness declaration.
    pub fn looks_like_primary_key(&self) -> bool {
        self.name.ends_with("_id") || self.unique
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl Classification {
    pub fn weight(self) -> u32 {
        match self {
            Classification::Public => 0,
            Classification::Internal => 5,
            Classification::Confidential => 10,
            Classification::Restricted => 15,
        }
    }

    pub fn min_accuracy_threshold(self) -> f64 {
        match self {
            Classification::Public => 0.80,
            Classification::Internal => 0.85,
            Classification::Confidential => 0.90,
            Classification::Restricted => 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Governance {
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub compliance_tags: BTreeSet<String>,
    #[serde(default)]
    pub encryption_required: bool,
    #[serde(default)]
    pub approved_use_cases: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_residency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking_change_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    pub completeness_threshold: f64,
    pub accuracy_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_horizon_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_target: Option<f64>,
    #[serde(default)]
    pub uniqueness_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_tier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSla {
    pub consumer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_availability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_staleness_secs: Option<u64>,
    #[serde(default)]
    pub approved_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_window: Option<String>,
}

/// Deterministic 256-bit digest over the canonical schema form (§3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        s.serialize_str(&hex)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            if i >= 32 {
                break;
            }
            let byte_str = std::str::from_utf8(chunk).map_err(serde::de::Error::custom)?;
            out[i] = u8::from_str_radix(byte_str, 16).map_err(serde::de::Error::custom)?;
        }
        Ok(out)
    }
}

/// A structured description of a dataset: schema, governance, SLAs (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub dataset_name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    pub owner_name: String,
    pub owner_contact: String,
    pub domain_tag: String,
    #[serde(default)]
    pub stewards: Vec<String>,
    pub schema: Vec<Field>,
    pub governance: Governance,
    pub quality: Quality,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSla>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning_strategy_note: Option<String>,
}

impl Contract {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.schema.iter().find(|f| f.name == name)
    }

    pub fn pii_fields(&self) -> Vec<&Field> {
        self.schema.iter().filter(|f| f.pii).collect()
    }

    pub fn has_pii(&self) -> bool {
        self.schema.iter().any(|f| f.pii)
    }

    pub fn required_fields(&self) -> Vec<&Field> {
        self.schema.iter().filter(|f| f.required()).collect()
    }

    pub fn compliance_tag_count(&self) -> usize {
        self.governance.compliance_tags.len()
    }

    pub fn primary_key_like_fields(&self) -> Vec<&Field> {
        self.schema.iter().filter(|f| f.looks_like_primary_key()).collect()
    }

    pub fn has_timestamp_field(&self) -> bool {
        self.schema.iter().any(|f| f.field_type == FieldType::Timestamp)
    }

    /// Canonical schema form for fingerprinting: fields sorted by name, each
    /// rendered as `name|type|nullable|max_length|pii|enum` (§3.5).
    pub fn canonical_schema_form(&self) -> String {
        let mut fields: Vec<&Field> = self.schema.iter().collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        fields
            .into_iter()
            .map(|f| {
                let enum_part = f
                    .enum_values
                    .as_ref()
                    .map(|v| v.join(","))
                    .unwrap_or_default();
                format!(
                    "{}|{:?}|{}|{}|{}|{}",
                    f.name,
                    f.field_type,
                    f.nullable,
                    f.max_length.map(|n| n.to_string()).unwrap_or_default(),
                    f.pii,
                    enum_part
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn compute_fingerprint(&self) -> Fingerprint {
        let form = self.canonical_schema_form();
        Fingerprint(*blake3::hash(form.as_bytes()).as_bytes())
    }

    /// Validates the field-uniqueness and required-not-nullable invariants of §3.1.
    pub fn validate_shape(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for f in &self.schema {
            if !seen.insert(f.name.as_str()) {
                return Err(format!("duplicate field name: {}", f.name));
            }
        }
        for sub in &self.subscriptions {
            for name in &sub.approved_fields {
                if self.field(name).is_none() {
                    return Err(format!(
                        "subscription for {} references unknown field {}",
                        sub.consumer, name
                    ));
                }
            }
        }
        Ok(())
    }
}
