use std::collections::BTreeSet;

use async_trait::async_trait;

use elevara_core::{AppResult, ProjectId};
use elevara_domain::IamPolicy;

/// A tag attached to a resource, as resolved through inheritance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTag {
    /// Namespaced tag value, e.g. `my-org/env/prod`.
    pub namespaced_value: String,
}

/// Resource-manager collaborator.
///
/// Policy writes are etag-conditional: `set_iam_policy` must fail with
/// [`elevara_core::AppError::Conflict`] when the supplied policy's etag no
/// longer matches the stored one.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Reads a project's IAM policy at policy version 3.
    async fn get_iam_policy(&self, project: &ProjectId) -> AppResult<IamPolicy>;

    /// Writes a project's IAM policy, recording `reason` as the change
    /// justification.
    async fn set_iam_policy(
        &self,
        project: &ProjectId,
        policy: IamPolicy,
        reason: &str,
    ) -> AppResult<()>;

    /// Returns the effective tags of a resource.
    async fn get_project_effective_tags(
        &self,
        resource_full_name: &str,
    ) -> AppResult<Vec<ResourceTag>>;

    /// Searches projects with a resource-manager query string.
    async fn search_projects(&self, query: &str) -> AppResult<BTreeSet<ProjectId>>;
}
