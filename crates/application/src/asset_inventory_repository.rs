//! Entitlement repository backed by effective-policy reads and directory
//! lookups, for deployments without the policy-analysis API.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;

use elevara_core::{
    AppError, AppResult, PrincipalSet, ProjectId, ProjectRoleBinding, ResourceId, UserId,
};
use elevara_domain::{
    evaluate_temporary_condition, is_activated, is_approval_marker, is_jit_marker, is_mpa_marker,
    ActivationType, Entitlement, EntitlementSet, EntitlementStatus, IamBinding,
};

use crate::executor::BoundedExecutor;
use crate::ports::{DirectoryGroups, PolicyAnalyzer};
use crate::repository::ProjectRoleRepository;

/// Additional attempts for transient group-member listing failures.
const GROUP_LOOKUP_RETRIES: usize = 2;

/// Options for [`AssetInventoryRepository`].
#[derive(Debug, Clone)]
pub struct AssetInventoryRepositoryOptions {
    /// Scope for effective-policy queries.
    pub scope: ResourceId,
}

/// Repository that derives entitlements from effective IAM policies
/// (project plus ancestry) and the user's direct group memberships.
pub struct AssetInventoryRepository {
    executor: BoundedExecutor,
    groups: Arc<dyn DirectoryGroups>,
    policy_analyzer: Arc<dyn PolicyAnalyzer>,
    options: AssetInventoryRepositoryOptions,
}

impl AssetInventoryRepository {
    /// Creates a repository over the directory and effective-policy ports.
    #[must_use]
    pub fn new(
        executor: BoundedExecutor,
        groups: Arc<dyn DirectoryGroups>,
        policy_analyzer: Arc<dyn PolicyAnalyzer>,
        options: AssetInventoryRepositoryOptions,
    ) -> Self {
        Self {
            executor,
            groups,
            policy_analyzer,
            options,
        }
    }

    /// Returns every binding of the project's effective policies that applies
    /// to the user, directly or through a group.
    async fn find_project_bindings(
        &self,
        user: &UserId,
        project: &ProjectId,
    ) -> AppResult<Vec<IamBinding>> {
        // Look up the effective policy set and the user's group memberships
        // in parallel.
        let memberships = self
            .executor
            .run(self.groups.list_direct_group_memberships(user));
        let effective_policies = self
            .executor
            .run(self.policy_analyzer.get_effective_iam_policies(&self.options.scope, project));

        let (memberships, effective_policies) =
            tokio::try_join!(memberships, effective_policies)?;

        let principal_set = PrincipalSet::new(user, &memberships);

        Ok(effective_policies
            .into_iter()
            .flat_map(|with_source| with_source.policy.bindings)
            .filter(|binding| principal_set.is_member(&binding.members))
            .collect())
    }

    async fn list_group_members_tolerantly(
        groups: Arc<dyn DirectoryGroups>,
        group_email: String,
    ) -> AppResult<Vec<UserId>> {
        let mut attempt = 0;
        loop {
            match groups.list_direct_group_members(&group_email).await {
                Ok(members) => return Ok(members),
                // External groups may deny member listing; that is okay.
                Err(AppError::AccessDenied(_)) => return Ok(Vec::new()),
                Err(error @ AppError::QuotaExceeded(_)) if attempt < GROUP_LOOKUP_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        group = %group_email,
                        attempt,
                        "retrying group member listing: {error}"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl ProjectRoleRepository for AssetInventoryRepository {
    async fn find_projects_with_entitlements(
        &self,
        _user: &UserId,
    ) -> AppResult<BTreeSet<ProjectId>> {
        // This variant cannot enumerate projects; deployments configure a
        // projects search query instead.
        Err(AppError::NotSupported(
            "use the available-projects query to determine projects".to_owned(),
        ))
    }

    async fn find_entitlements(
        &self,
        user: &UserId,
        project: &ProjectId,
        types: &BTreeSet<ActivationType>,
        statuses: &BTreeSet<EntitlementStatus>,
    ) -> AppResult<EntitlementSet> {
        let all_bindings = self.find_project_bindings(user, project).await?;

        let mut available: BTreeSet<Entitlement> = BTreeSet::new();
        if statuses.contains(&EntitlementStatus::Available) {
            let jit_eligible: BTreeSet<ProjectRoleBinding> =
                if types.contains(&ActivationType::Jit) {
                    all_bindings
                        .iter()
                        .filter(|binding| is_jit_marker(binding.condition.as_ref()))
                        .map(|binding| {
                            ProjectRoleBinding::for_project(project.clone(), binding.role.clone())
                        })
                        .collect()
                } else {
                    BTreeSet::new()
                };

            let mpa_eligible: BTreeSet<ProjectRoleBinding> =
                if types.contains(&ActivationType::Mpa) {
                    all_bindings
                        .iter()
                        .filter(|binding| is_mpa_marker(binding.condition.as_ref()))
                        .map(|binding| {
                            ProjectRoleBinding::for_project(project.clone(), binding.role.clone())
                        })
                        .collect()
                } else {
                    BTreeSet::new()
                };

            // When a role is both JIT- and MPA-eligible, JIT wins.
            for binding in &jit_eligible {
                available.insert(Entitlement::new(
                    binding.clone(),
                    ActivationType::Jit,
                    EntitlementStatus::Available,
                ));
            }
            for binding in mpa_eligible {
                if !jit_eligible.contains(&binding) {
                    available.insert(Entitlement::new(
                        binding,
                        ActivationType::Mpa,
                        EntitlementStatus::Available,
                    ));
                }
            }
        }

        let mut active: BTreeSet<ProjectRoleBinding> = BTreeSet::new();
        if statuses.contains(&EntitlementStatus::Active) {
            let now = Utc::now();
            active.extend(
                all_bindings
                    .iter()
                    .filter(|binding| is_activated(binding.condition.as_ref()))
                    .filter(|binding| {
                        binding.condition.as_ref().is_some_and(|condition| {
                            evaluate_temporary_condition(&condition.expression, now)
                                .unwrap_or(false)
                        })
                    })
                    .map(|binding| {
                        ProjectRoleBinding::for_project(project.clone(), binding.role.clone())
                    }),
            );
        }

        Ok(EntitlementSet::new(available, active, BTreeSet::new()))
    }

    async fn find_entitlement_holders(
        &self,
        binding: &ProjectRoleBinding,
        activation_type: ActivationType,
    ) -> AppResult<BTreeSet<UserId>> {
        let policies = self
            .policy_analyzer
            .get_effective_iam_policies(&self.options.scope, binding.project_id())
            .await?;

        let principals: BTreeSet<String> = policies
            .into_iter()
            .flat_map(|with_source| with_source.policy.bindings)
            .filter(|candidate| candidate.role == binding.role())
            .filter(|candidate| {
                is_approval_marker(candidate.condition.as_ref(), activation_type)
            })
            .flat_map(|candidate| candidate.members)
            .collect();

        let mut holders: BTreeSet<UserId> = BTreeSet::new();
        for principal in &principals {
            if let Some(email) = principal.strip_prefix("user:") {
                if let Ok(user) = UserId::new(email) {
                    holders.insert(user);
                }
            }
        }

        // Resolve group members concurrently.
        let lookups: Vec<_> = principals
            .iter()
            .filter_map(|principal| principal.strip_prefix("group:"))
            .map(|group_email| {
                self.executor.run(Self::list_group_members_tolerantly(
                    Arc::clone(&self.groups),
                    group_email.to_owned(),
                ))
            })
            .collect();

        for members in join_all(lookups).await {
            holders.extend(members?);
        }

        Ok(holders)
    }
}
