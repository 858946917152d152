use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppResult, ProjectId};

/// A role granted on a resource, without regard to members or conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleBinding {
    resource_full_name: String,
    role: String,
}

impl RoleBinding {
    /// Creates a role binding on a fully qualified resource name.
    #[must_use]
    pub fn new(resource_full_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            resource_full_name: resource_full_name.into(),
            role: role.into(),
        }
    }

    /// Creates a role binding on a project.
    #[must_use]
    pub fn on_project(project: &ProjectId, role: impl Into<String>) -> Self {
        Self::new(project.full_resource_name(), role)
    }

    /// Returns the fully qualified resource name.
    #[must_use]
    pub fn resource_full_name(&self) -> &str {
        &self.resource_full_name
    }

    /// Returns the role name.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }
}

impl Display for RoleBinding {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource_full_name, self.role)
    }
}

/// A role binding restricted to project resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectRoleBinding {
    project_id: ProjectId,
    binding: RoleBinding,
}

impl ProjectRoleBinding {
    /// Creates a project role binding, failing for non-project resources.
    pub fn new(binding: RoleBinding) -> AppResult<Self> {
        let project_id = ProjectId::from_full_resource_name(binding.resource_full_name())?;
        Ok(Self {
            project_id,
            binding,
        })
    }

    /// Creates a project role binding directly from a project and role.
    #[must_use]
    pub fn for_project(project: ProjectId, role: impl Into<String>) -> Self {
        let binding = RoleBinding::on_project(&project, role);
        Self {
            project_id: project,
            binding,
        }
    }

    /// Returns the project this binding applies to.
    #[must_use]
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Returns the underlying role binding.
    #[must_use]
    pub fn role_binding(&self) -> &RoleBinding {
        &self.binding
    }

    /// Returns the role name.
    #[must_use]
    pub fn role(&self) -> &str {
        self.binding.role()
    }
}

impl Display for ProjectRoleBinding {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.binding)
    }
}
