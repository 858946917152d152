//! The IAM policy document rewritten by the binding mutator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::IamCondition;

/// Policy version requested on every read; version 3 is required for
/// conditional bindings to be visible.
pub const REQUESTED_POLICY_VERSION: i32 = 3;

/// One entry of an IAM policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamBinding {
    /// Role name, e.g. `roles/browser`.
    pub role: String,
    /// Tagged principal references.
    pub members: Vec<String>,
    /// Optional condition limiting the binding's effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<IamCondition>,
}

impl IamBinding {
    /// Creates an unconditional binding.
    #[must_use]
    pub fn new(role: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            role: role.into(),
            members,
            condition: None,
        }
    }

    /// Creates a conditional binding.
    #[must_use]
    pub fn with_condition(
        role: impl Into<String>,
        members: Vec<String>,
        condition: IamCondition,
    ) -> Self {
        Self {
            role: role.into(),
            members,
            condition: Some(condition),
        }
    }
}

/// A project's IAM policy, the single source of truth for grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamPolicy {
    /// Policy schema version.
    pub version: i32,
    /// Opaque concurrency token; a write must present the etag it read.
    pub etag: String,
    /// Policy entries.
    pub bindings: Vec<IamBinding>,
}

impl IamPolicy {
    /// Creates an empty version-3 policy with the given etag.
    #[must_use]
    pub fn new(etag: impl Into<String>) -> Self {
        Self {
            version: REQUESTED_POLICY_VERSION,
            etag: etag.into(),
            bindings: Vec::new(),
        }
    }
}

/// Compares two bindings structurally: role, member sets (order-insensitive),
/// and condition (title, expression, description). Set `compare_condition` to
/// `false` to ignore conditions; diagnostic tooling uses that mode, activation
/// never does.
#[must_use]
pub fn bindings_equal(left: &IamBinding, right: &IamBinding, compare_condition: bool) -> bool {
    if left.role != right.role {
        return false;
    }

    let left_members: BTreeSet<&str> = left.members.iter().map(String::as_str).collect();
    let right_members: BTreeSet<&str> = right.members.iter().map(String::as_str).collect();
    if left_members != right_members {
        return false;
    }

    !compare_condition || left.condition == right.condition
}
