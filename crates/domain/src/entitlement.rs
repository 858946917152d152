use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use elevara_core::{AppError, ProjectRoleBinding};

/// How an eligible role is turned into an active grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationType {
    /// Self-approved, just-in-time activation.
    Jit,
    /// Multi-party approval: a peer must approve.
    Mpa,
}

impl ActivationType {
    /// Returns a stable transport value for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jit => "jit",
            Self::Mpa => "mpa",
        }
    }
}

impl FromStr for ActivationType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "jit" => Ok(Self::Jit),
            "mpa" => Ok(Self::Mpa),
            _ => Err(AppError::InvalidArgument(format!(
                "unknown activation type '{value}'"
            ))),
        }
    }
}

impl Display for ActivationType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

/// Lifecycle state of an entitlement from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// Eligible but not currently active.
    Available,
    /// Covered by a currently valid temporary grant.
    Active,
    /// An approval request is in flight.
    ActivationPending,
}

impl EntitlementStatus {
    /// Returns a stable transport value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Active => "active",
            Self::ActivationPending => "activation_pending",
        }
    }
}

/// A potential or actual assignment of a role to a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entitlement {
    binding: ProjectRoleBinding,
    display_name: String,
    activation_type: ActivationType,
    status: EntitlementStatus,
}

impl Entitlement {
    /// Creates an entitlement for a project role binding.
    #[must_use]
    pub fn new(
        binding: ProjectRoleBinding,
        activation_type: ActivationType,
        status: EntitlementStatus,
    ) -> Self {
        let display_name = binding.role().to_owned();
        Self {
            binding,
            display_name,
            activation_type,
            status,
        }
    }

    /// Returns the identifying role binding.
    #[must_use]
    pub fn binding(&self) -> &ProjectRoleBinding {
        &self.binding
    }

    /// Returns the name shown to callers (the role name).
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the activation type.
    #[must_use]
    pub fn activation_type(&self) -> ActivationType {
        self.activation_type
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> EntitlementStatus {
        self.status
    }

    /// Returns a copy of this entitlement with a different status.
    #[must_use]
    pub fn with_status(&self, status: EntitlementStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

impl PartialOrd for Entitlement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entitlement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.status
            .cmp(&other.status)
            .then_with(|| self.display_name.cmp(&other.display_name))
            .then_with(|| self.binding.cmp(&other.binding))
    }
}

/// The result of an entitlement discovery query.
///
/// `available` and `active` may intersect by role binding; callers wanting a
/// single list use [`EntitlementSet::all_entitlements`], which promotes the
/// intersection to [`EntitlementStatus::Active`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitlementSet {
    available: BTreeSet<Entitlement>,
    active: BTreeSet<ProjectRoleBinding>,
    warnings: BTreeSet<String>,
}

impl EntitlementSet {
    /// Creates an entitlement set.
    #[must_use]
    pub fn new(
        available: BTreeSet<Entitlement>,
        active: BTreeSet<ProjectRoleBinding>,
        warnings: BTreeSet<String>,
    ) -> Self {
        Self {
            available,
            active,
            warnings,
        }
    }

    /// Returns the eligible entitlements, sorted by status then name.
    #[must_use]
    pub fn available(&self) -> &BTreeSet<Entitlement> {
        &self.available
    }

    /// Returns the role bindings covered by a currently valid grant.
    #[must_use]
    pub fn active(&self) -> &BTreeSet<ProjectRoleBinding> {
        &self.active
    }

    /// Returns non-critical warnings raised during discovery.
    #[must_use]
    pub fn warnings(&self) -> &BTreeSet<String> {
        &self.warnings
    }

    /// Returns the merged view: every available entitlement, with those that
    /// are also active promoted to [`EntitlementStatus::Active`], plus active
    /// grants that have no eligible counterpart.
    #[must_use]
    pub fn all_entitlements(&self) -> BTreeSet<Entitlement> {
        let mut merged: BTreeSet<Entitlement> = self
            .available
            .iter()
            .map(|entitlement| {
                if self.active.contains(entitlement.binding()) {
                    entitlement.with_status(EntitlementStatus::Active)
                } else {
                    entitlement.clone()
                }
            })
            .collect();

        for binding in &self.active {
            let is_known = self
                .available
                .iter()
                .any(|entitlement| entitlement.binding() == binding);
            if !is_known {
                merged.insert(Entitlement::new(
                    binding.clone(),
                    ActivationType::Jit,
                    EntitlementStatus::Active,
                ));
            }
        }

        merged
    }
}
