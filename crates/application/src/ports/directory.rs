use async_trait::async_trait;

use elevara_core::{AppResult, GroupId, UserId};

/// Directory collaborator resolving group memberships.
#[async_trait]
pub trait DirectoryGroups: Send + Sync {
    /// Lists the groups a user is a direct member of.
    async fn list_direct_group_memberships(&self, user: &UserId) -> AppResult<Vec<GroupId>>;

    /// Lists the direct members of a group.
    async fn list_direct_group_members(&self, group_email: &str) -> AppResult<Vec<UserId>>;
}
