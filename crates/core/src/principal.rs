use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

const USER_PREFIX: &str = "user:";
const GROUP_PREFIX: &str = "group:";

/// An end user, identified by their primary email address.
///
/// A directory-assigned id may be attached for display purposes, but two
/// users are equal whenever their emails are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserId {
    /// Optional directory-assigned identifier.
    pub id: Option<String>,
    /// Primary email address; the identity key.
    pub email: String,
}

impl UserId {
    /// Creates a user identity from an email address.
    pub fn new(email: impl Into<String>) -> AppResult<Self> {
        let email = email.into();
        if email.trim().is_empty() || !email.contains('@') {
            return Err(AppError::InvalidArgument(format!(
                "'{email}' is not a valid principal email"
            )));
        }

        Ok(Self { id: None, email })
    }

    /// Creates a user identity carrying a directory id.
    pub fn with_id(id: impl Into<String>, email: impl Into<String>) -> AppResult<Self> {
        let mut user = Self::new(email)?;
        user.id = Some(id.into());
        Ok(user)
    }
}

impl PartialEq for UserId {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
    }
}

impl Eq for UserId {}

impl Hash for UserId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.email.hash(state);
    }
}

impl PartialOrd for UserId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UserId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.email.cmp(&other.email)
    }
}

impl Display for UserId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.email)
    }
}

/// A directory group, identified by its email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    /// Creates a group identity from an email address.
    pub fn new(email: impl Into<String>) -> AppResult<Self> {
        let email = email.into();
        if email.trim().is_empty() || !email.contains('@') {
            return Err(AppError::InvalidArgument(format!(
                "'{email}' is not a valid group email"
            )));
        }

        Ok(Self(email))
    }

    /// Returns the group email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.0
    }
}

impl Display for GroupId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A tagged principal reference as it appears in IAM binding member lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalRef(String);

impl PrincipalRef {
    /// Creates a `user:` reference.
    #[must_use]
    pub fn user(user: &UserId) -> Self {
        Self(format!("{USER_PREFIX}{}", user.email))
    }

    /// Creates a `group:` reference.
    #[must_use]
    pub fn group(group: &GroupId) -> Self {
        Self(format!("{GROUP_PREFIX}{}", group.email()))
    }

    /// Wraps a raw member string as found in an IAM policy.
    #[must_use]
    pub fn from_member(member: impl Into<String>) -> Self {
        Self(member.into())
    }

    /// Returns the raw tagged string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the user email when this is a `user:` reference.
    #[must_use]
    pub fn user_email(&self) -> Option<&str> {
        self.0.strip_prefix(USER_PREFIX)
    }

    /// Returns the group email when this is a `group:` reference.
    #[must_use]
    pub fn group_email(&self) -> Option<&str> {
        self.0.strip_prefix(GROUP_PREFIX)
    }
}

impl Display for PrincipalRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// The set of principal references under which a user may hold a binding:
/// the user themselves plus every group they are a direct member of.
#[derive(Debug, Clone)]
pub struct PrincipalSet {
    references: BTreeSet<PrincipalRef>,
}

impl PrincipalSet {
    /// Builds the principal set for a user and their direct groups.
    #[must_use]
    pub fn new(user: &UserId, groups: &[GroupId]) -> Self {
        let mut references: BTreeSet<PrincipalRef> =
            groups.iter().map(PrincipalRef::group).collect();
        references.insert(PrincipalRef::user(user));

        Self { references }
    }

    /// Returns whether any of the given binding members matches this set.
    #[must_use]
    pub fn is_member(&self, members: &[String]) -> bool {
        members
            .iter()
            .any(|member| self.references.contains(&PrincipalRef::from_member(member.clone())))
    }

    /// Returns the tagged references in this set.
    #[must_use]
    pub fn references(&self) -> &BTreeSet<PrincipalRef> {
        &self.references
    }
}

#[cfg(test)]
mod tests {
    use super::{GroupId, PrincipalSet, UserId};

    fn user(email: &str) -> UserId {
        UserId::new(email).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn users_compare_by_email_alone() {
        let plain = user("alice@example.com");
        let with_id = UserId::with_id("1234", "alice@example.com");
        assert_eq!(plain, with_id.unwrap_or_else(|_| unreachable!()));
    }

    #[test]
    fn email_without_at_sign_is_rejected() {
        assert!(UserId::new("alice").is_err());
        assert!(GroupId::new("").is_err());
    }

    #[test]
    fn principal_set_contains_user_and_groups() {
        let group = GroupId::new("devs@example.com").unwrap_or_else(|_| unreachable!());
        let set = PrincipalSet::new(&user("alice@example.com"), &[group]);

        assert!(set.is_member(&["user:alice@example.com".to_owned()]));
        assert!(set.is_member(&[
            "user:bob@example.com".to_owned(),
            "group:devs@example.com".to_owned(),
        ]));
        assert!(!set.is_member(&["user:bob@example.com".to_owned()]));
        assert!(!set.is_member(&["serviceAccount:svc@example.iam.gserviceaccount.com".to_owned()]));
    }
}
