use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

const RESOURCE_NAME_PREFIX: &str = "//cloudresourcemanager.googleapis.com/";
const PROJECT_NAME_PREFIX: &str = "//cloudresourcemanager.googleapis.com/projects/";

/// Identifier of a project resource. Projects compare by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a project identifier from a short id.
    pub fn new(id: impl Into<String>) -> AppResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "project id must not be empty".to_owned(),
            ));
        }

        Ok(Self(id))
    }

    /// Returns the short project id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Returns the fully qualified resource name.
    #[must_use]
    pub fn full_resource_name(&self) -> String {
        format!("{PROJECT_NAME_PREFIX}{}", self.0)
    }

    /// Returns whether a fully qualified name denotes a project.
    #[must_use]
    pub fn is_project_full_resource_name(full_resource_name: &str) -> bool {
        full_resource_name.starts_with(PROJECT_NAME_PREFIX)
            && full_resource_name.len() > PROJECT_NAME_PREFIX.len()
    }

    /// Parses a project identifier from a fully qualified resource name.
    pub fn from_full_resource_name(full_resource_name: &str) -> AppResult<Self> {
        let id = full_resource_name
            .strip_prefix(PROJECT_NAME_PREFIX)
            .ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "'{full_resource_name}' is not a project resource name"
                ))
            })?;

        Self::new(id)
    }
}

impl Display for ProjectId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier of a folder resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderId(String);

impl FolderId {
    /// Creates a folder identifier from a short id.
    pub fn new(id: impl Into<String>) -> AppResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "folder id must not be empty".to_owned(),
            ));
        }

        Ok(Self(id))
    }

    /// Returns the short folder id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Returns the fully qualified resource name.
    #[must_use]
    pub fn full_resource_name(&self) -> String {
        format!("{RESOURCE_NAME_PREFIX}folders/{}", self.0)
    }
}

impl Display for FolderId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier of an organization resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganizationId(String);

impl OrganizationId {
    /// Creates an organization identifier from a short id.
    pub fn new(id: impl Into<String>) -> AppResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "organization id must not be empty".to_owned(),
            ));
        }

        Ok(Self(id))
    }

    /// Returns the short organization id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Returns the fully qualified resource name.
    #[must_use]
    pub fn full_resource_name(&self) -> String {
        format!("{RESOURCE_NAME_PREFIX}organizations/{}", self.0)
    }
}

impl Display for OrganizationId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A discovery scope: the root resource under which entitlements are found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceId {
    /// A single project.
    Project(ProjectId),
    /// A folder and all of its descendants.
    Folder(FolderId),
    /// An organization and all of its descendants.
    Organization(OrganizationId),
}

impl ResourceId {
    /// Returns the fully qualified resource name.
    #[must_use]
    pub fn full_resource_name(&self) -> String {
        match self {
            Self::Project(id) => id.full_resource_name(),
            Self::Folder(id) => id.full_resource_name(),
            Self::Organization(id) => id.full_resource_name(),
        }
    }

    /// Returns the short `<type>s/<id>` path used by analysis scopes.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Project(id) => format!("projects/{}", id.id()),
            Self::Folder(id) => format!("folders/{}", id.id()),
            Self::Organization(id) => format!("organizations/{}", id.id()),
        }
    }
}

impl Display for ResourceId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::{ProjectId, ResourceId};

    #[test]
    fn project_full_resource_name_round_trips() {
        let project = ProjectId::new("project-1").unwrap_or_else(|_| unreachable!());
        let full_name = project.full_resource_name();
        assert_eq!(
            full_name,
            "//cloudresourcemanager.googleapis.com/projects/project-1"
        );

        let parsed = ProjectId::from_full_resource_name(&full_name);
        assert_eq!(parsed.unwrap_or_else(|_| unreachable!()), project);
    }

    #[test]
    fn non_project_resource_names_are_rejected() {
        assert!(!ProjectId::is_project_full_resource_name(
            "//cloudresourcemanager.googleapis.com/folders/folder-1"
        ));
        assert!(ProjectId::from_full_resource_name(
            "//cloudresourcemanager.googleapis.com/folders/folder-1"
        )
        .is_err());
    }

    #[test]
    fn bare_project_prefix_is_not_a_project_name() {
        assert!(!ProjectId::is_project_full_resource_name(
            "//cloudresourcemanager.googleapis.com/projects/"
        ));
    }

    #[test]
    fn empty_project_id_is_rejected() {
        assert!(ProjectId::new("  ").is_err());
    }

    #[test]
    fn scope_path_matches_resource_type() {
        let scope = ResourceId::Organization(
            super::OrganizationId::new("123456").unwrap_or_else(|_| unreachable!()),
        );
        assert_eq!(scope.path(), "organizations/123456");
    }
}
