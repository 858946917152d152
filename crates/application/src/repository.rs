use std::collections::BTreeSet;

use async_trait::async_trait;

use elevara_core::{AppResult, ProjectId, ProjectRoleBinding, UserId};
use elevara_domain::{ActivationType, EntitlementSet, EntitlementStatus};

/// Repository deriving a user's entitlements from IAM policy state.
///
/// Two variants exist: one backed by the policy-analysis API and one backed
/// by effective-policy reads plus directory lookups. Both treat the IAM
/// policy as the single source of truth; nothing is persisted here.
#[async_trait]
pub trait ProjectRoleRepository: Send + Sync {
    /// Finds the projects on which the user holds any entitlement.
    async fn find_projects_with_entitlements(
        &self,
        user: &UserId,
    ) -> AppResult<BTreeSet<ProjectId>>;

    /// Finds the user's eligible and active role bindings on a project,
    /// restricted to the requested activation types and statuses.
    async fn find_entitlements(
        &self,
        user: &UserId,
        project: &ProjectId,
        types: &BTreeSet<ActivationType>,
        statuses: &BTreeSet<EntitlementStatus>,
    ) -> AppResult<EntitlementSet>;

    /// Finds the users who could approve a request for this binding.
    async fn find_entitlement_holders(
        &self,
        binding: &ProjectRoleBinding,
        activation_type: ActivationType,
    ) -> AppResult<BTreeSet<UserId>>;
}
