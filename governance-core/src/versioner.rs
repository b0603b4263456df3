//! Version assignment (spec §4.6): looks up the predecessor via the history
//! store and classifies the change using the same `classify_change` the
//! rule evaluator's SG006 predicate relies on, so both agree on one
//! definition of "breaking" (spec §9 design note).

use policy_engine::rules::classify_change;
use policy_engine::{ChangeKind, Contract, Version};

/// Assigns the next version for `candidate` given its `predecessor` (the
/// latest committed version for the same dataset, or `None` for a brand new
/// dataset).
pub fn assign_version(candidate: &Contract, predecessor: Option<&Contract>) -> Version {
    let Some(prev) = predecessor else {
        return Version::initial();
    };
    match classify_change(prev, candidate) {
        ChangeKind::Breaking => prev.version.bump_major(),
        ChangeKind::Additive => prev.version.bump_minor(),
        ChangeKind::DocOnly => prev.version.bump_patch(),
        ChangeKind::None => prev.version,
    }
}
