//! Shared primitives for all Rust crates in Elevara.

#![forbid(unsafe_code)]

mod error;
mod principal;
mod resource;
mod role_binding;

pub use error::{AppError, AppResult};
pub use principal::{GroupId, PrincipalRef, PrincipalSet, UserId};
pub use resource::{FolderId, OrganizationId, ProjectId, ResourceId};
pub use role_binding::{ProjectRoleBinding, RoleBinding};
