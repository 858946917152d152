//! Catalog of project roles a user can browse, request, and have reviewed.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;

use elevara_core::{AppError, AppResult, ProjectId, ProjectRoleBinding, UserId};
use elevara_domain::{
    ActivationRequest, ActivationType, EntitlementSet, EntitlementStatus,
};

use crate::ports::ResourceManager;
use crate::repository::ProjectRoleRepository;

/// Policy options enforced by the catalog.
///
/// The discovery scope and the required-project-tag filter are not part of
/// these options: they are consulted during repository queries and therefore
/// configured on the repository variant,
/// [`crate::PolicyAnalyzerRepositoryOptions`] or
/// [`crate::AssetInventoryRepositoryOptions`].
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Longest duration a granted activation may have.
    pub activation_timeout: Duration,
    /// Longest time an approval token may stay redeemable.
    pub activation_request_timeout: Duration,
    /// Fewest reviewers an MPA request must name.
    pub min_reviewers: usize,
    /// Most reviewers an MPA request may name.
    pub max_reviewers: usize,
    /// Most roles a single JIT request may activate.
    pub max_jit_roles_per_self_approval: usize,
    /// Alternate project-discovery query run against resource-manager search
    /// instead of the repository. Required for repository variants that do
    /// not support project enumeration.
    pub available_projects_query: Option<String>,
}

impl CatalogOptions {
    /// Creates options with the platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            activation_timeout: Duration::hours(2),
            activation_request_timeout: Duration::hours(1),
            min_reviewers: 1,
            max_reviewers: 10,
            max_jit_roles_per_self_approval: 10,
            available_projects_query: None,
        }
    }

    /// Checks internal consistency of the configured bounds.
    pub fn validate(&self) -> AppResult<()> {
        if self.min_reviewers == 0 {
            return Err(AppError::InvalidArgument(
                "at least one reviewer must be required".to_owned(),
            ));
        }

        if self.max_reviewers < self.min_reviewers {
            return Err(AppError::InvalidArgument(
                "the reviewer maximum must not undercut the minimum".to_owned(),
            ));
        }

        if self.max_jit_roles_per_self_approval == 0 {
            return Err(AppError::InvalidArgument(
                "at least one role per self-approval must be allowed".to_owned(),
            ));
        }

        if self.activation_timeout < elevara_domain::MIN_ACTIVATION_DURATION {
            return Err(AppError::InvalidArgument(
                "the activation timeout is shorter than the minimum activation".to_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog service combining a repository with policy options.
pub struct ProjectRoleCatalog {
    repository: Arc<dyn ProjectRoleRepository>,
    resource_manager: Arc<dyn ResourceManager>,
    options: CatalogOptions,
}

impl ProjectRoleCatalog {
    /// Creates a catalog over a repository and resource-manager port,
    /// rejecting internally inconsistent options.
    pub fn new(
        repository: Arc<dyn ProjectRoleRepository>,
        resource_manager: Arc<dyn ResourceManager>,
        options: CatalogOptions,
    ) -> AppResult<Self> {
        options.validate()?;

        Ok(Self {
            repository,
            resource_manager,
            options,
        })
    }

    /// Returns the configured policy options.
    #[must_use]
    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }

    /// Lists the projects on which the user holds entitlements. When an
    /// override query is configured, projects are discovered through
    /// resource-manager search instead.
    pub async fn list_projects(&self, user: &UserId) -> AppResult<BTreeSet<ProjectId>> {
        match self.options.available_projects_query.as_deref() {
            Some(query) if !query.trim().is_empty() => {
                self.resource_manager.search_projects(query).await
            }
            _ => self.repository.find_projects_with_entitlements(user).await,
        }
    }

    /// Lists the user's eligible and active entitlements on a project.
    pub async fn list_entitlements(
        &self,
        user: &UserId,
        project: &ProjectId,
    ) -> AppResult<EntitlementSet> {
        self.repository
            .find_entitlements(
                user,
                project,
                &BTreeSet::from([ActivationType::Jit, ActivationType::Mpa]),
                &BTreeSet::from([EntitlementStatus::Available, EntitlementStatus::Active]),
            )
            .await
    }

    /// Lists the users who may review a request for this binding. The
    /// requesting user is never part of the result.
    pub async fn list_reviewers(
        &self,
        requesting_user: &UserId,
        binding: &ProjectRoleBinding,
    ) -> AppResult<BTreeSet<UserId>> {
        let mut holders = self
            .repository
            .find_entitlement_holders(binding, ActivationType::Mpa)
            .await?;

        holders.remove(requesting_user);
        Ok(holders)
    }

    /// Confirms that every role of the request is available to the user for
    /// the request's activation type.
    pub async fn verify_user_can_activate(
        &self,
        user: &UserId,
        request: &ActivationRequest,
    ) -> AppResult<()> {
        let entitlements = request.entitlements();
        let project = entitlements
            .iter()
            .map(|binding| binding.project_id())
            .next()
            .ok_or_else(|| {
                AppError::InvalidArgument("the request names no roles".to_owned())
            })?;

        let available = self
            .repository
            .find_entitlements(
                user,
                project,
                &BTreeSet::from([request.activation_type()]),
                &BTreeSet::from([EntitlementStatus::Available]),
            )
            .await?;

        for requested in entitlements {
            let is_available = available
                .available()
                .iter()
                .any(|entitlement| entitlement.binding() == requested);

            if !is_available {
                return Err(AppError::AccessDenied(format!(
                    "'{user}' is not allowed to activate '{requested}'"
                )));
            }
        }

        Ok(())
    }
}
