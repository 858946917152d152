//! Activation request and activation value objects.
//!
//! Requests are immutable once constructed and equal by id. MPA requests have
//! no server-side persistence; they live inside signed approval tokens.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use elevara_core::{AppError, AppResult, ProjectRoleBinding, UserId};

use crate::ActivationType;

/// Shortest activation a request may ask for.
pub const MIN_ACTIVATION_DURATION: Duration = Duration::minutes(1);

/// Opaque, URL-safe request identifier of the form `<type>-<random>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivationRequestId(String);

impl ActivationRequestId {
    /// Generates a fresh identifier for the given activation type.
    pub fn generate(activation_type: ActivationType) -> AppResult<Self> {
        let mut bytes = [0u8; 12];
        getrandom::fill(&mut bytes).map_err(|error| {
            AppError::Internal(format!("failed to generate request id: {error}"))
        })?;

        let hex = bytes
            .iter()
            .fold(String::with_capacity(24), |mut acc, byte| {
                let _ = write!(acc, "{byte:02x}");
                acc
            });

        Ok(Self(format!("{}-{hex}", activation_type.as_str())))
    }

    /// Wraps an identifier restored from a token.
    pub fn parse(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let is_tagged =
            value.starts_with("jit-") || value.starts_with("mpa-");
        if !is_tagged || value.len() <= 4 {
            return Err(AppError::InvalidArgument(format!(
                "'{value}' is not an activation request id"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ActivationRequestId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

fn check_window(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> AppResult<()> {
    if end_time <= start_time {
        return Err(AppError::InvalidArgument(
            "activation end time must lie after its start time".to_owned(),
        ));
    }

    if end_time - start_time < MIN_ACTIVATION_DURATION {
        return Err(AppError::InvalidArgument(format!(
            "activation duration must be at least {} seconds",
            MIN_ACTIVATION_DURATION.num_seconds()
        )));
    }

    Ok(())
}

fn check_justification(justification: &str) -> AppResult<()> {
    if justification.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "a justification is required".to_owned(),
        ));
    }

    Ok(())
}

/// A self-approved activation request covering one or more roles on a single
/// project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitActivationRequest {
    id: ActivationRequestId,
    requesting_user: UserId,
    entitlements: BTreeSet<ProjectRoleBinding>,
    justification: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl JitActivationRequest {
    /// Creates a JIT request, enforcing the structural invariants: non-empty
    /// entitlements, all on one project, a justification, and a window of at
    /// least one minute.
    pub fn new(
        requesting_user: UserId,
        entitlements: BTreeSet<ProjectRoleBinding>,
        justification: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> AppResult<Self> {
        let justification = justification.into();

        if entitlements.is_empty() {
            return Err(AppError::InvalidArgument(
                "at least one role is required".to_owned(),
            ));
        }

        let mut projects = entitlements.iter().map(ProjectRoleBinding::project_id);
        let first_project = projects.next().map(Clone::clone);
        if let Some(first_project) = first_project {
            if projects.any(|project| *project != first_project) {
                return Err(AppError::InvalidArgument(
                    "all roles of one request must belong to the same project".to_owned(),
                ));
            }
        }

        check_justification(&justification)?;
        check_window(start_time, end_time)?;

        Ok(Self {
            id: ActivationRequestId::generate(ActivationType::Jit)?,
            requesting_user,
            entitlements,
            justification,
            start_time,
            end_time,
        })
    }

    /// Returns the request identifier.
    #[must_use]
    pub fn id(&self) -> &ActivationRequestId {
        &self.id
    }
}

/// A peer-approved activation request covering exactly one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpaActivationRequest {
    id: ActivationRequestId,
    requesting_user: UserId,
    entitlement: ProjectRoleBinding,
    reviewers: BTreeSet<UserId>,
    justification: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl MpaActivationRequest {
    /// Creates an MPA request with a fresh id.
    pub fn new(
        requesting_user: UserId,
        entitlement: ProjectRoleBinding,
        reviewers: BTreeSet<UserId>,
        justification: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> AppResult<Self> {
        let id = ActivationRequestId::generate(ActivationType::Mpa)?;
        Self::with_id(
            id,
            requesting_user,
            entitlement,
            reviewers,
            justification,
            start_time,
            end_time,
        )
    }

    /// Restores an MPA request from a verified token, keeping its original id.
    pub fn with_id(
        id: ActivationRequestId,
        requesting_user: UserId,
        entitlement: ProjectRoleBinding,
        reviewers: BTreeSet<UserId>,
        justification: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> AppResult<Self> {
        let justification = justification.into();

        if reviewers.is_empty() {
            return Err(AppError::InvalidArgument(
                "at least one reviewer is required".to_owned(),
            ));
        }

        if reviewers.contains(&requesting_user) {
            return Err(AppError::InvalidArgument(
                "the requesting user cannot be their own reviewer".to_owned(),
            ));
        }

        check_justification(&justification)?;
        check_window(start_time, end_time)?;

        Ok(Self {
            id,
            requesting_user,
            entitlement,
            reviewers,
            justification,
            start_time,
            end_time,
        })
    }

    /// Returns the request identifier.
    #[must_use]
    pub fn id(&self) -> &ActivationRequestId {
        &self.id
    }

    /// Returns the single role binding this request covers.
    #[must_use]
    pub fn entitlement(&self) -> &ProjectRoleBinding {
        &self.entitlement
    }

    /// Returns the reviewers who may approve this request.
    #[must_use]
    pub fn reviewers(&self) -> &BTreeSet<UserId> {
        &self.reviewers
    }

    /// Returns the beneficiary.
    #[must_use]
    pub fn requesting_user(&self) -> &UserId {
        &self.requesting_user
    }

    /// Returns the justification supplied by the caller.
    #[must_use]
    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Returns the start of the requested window.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Returns the end of the requested window.
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }
}

/// An activation request of either type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActivationRequest {
    /// Self-approved request.
    Jit(JitActivationRequest),
    /// Peer-approved request.
    Mpa(MpaActivationRequest),
}

impl ActivationRequest {
    /// Returns the request identifier.
    #[must_use]
    pub fn id(&self) -> &ActivationRequestId {
        match self {
            Self::Jit(request) => &request.id,
            Self::Mpa(request) => &request.id,
        }
    }

    /// Returns the activation type.
    #[must_use]
    pub fn activation_type(&self) -> ActivationType {
        match self {
            Self::Jit(_) => ActivationType::Jit,
            Self::Mpa(_) => ActivationType::Mpa,
        }
    }

    /// Returns the beneficiary.
    #[must_use]
    pub fn requesting_user(&self) -> &UserId {
        match self {
            Self::Jit(request) => &request.requesting_user,
            Self::Mpa(request) => &request.requesting_user,
        }
    }

    /// Returns the requested role bindings.
    #[must_use]
    pub fn entitlements(&self) -> BTreeSet<&ProjectRoleBinding> {
        match self {
            Self::Jit(request) => request.entitlements.iter().collect(),
            Self::Mpa(request) => BTreeSet::from([&request.entitlement]),
        }
    }

    /// Returns the justification supplied by the caller.
    #[must_use]
    pub fn justification(&self) -> &str {
        match self {
            Self::Jit(request) => &request.justification,
            Self::Mpa(request) => &request.justification,
        }
    }

    /// Returns the start of the requested window.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        match self {
            Self::Jit(request) => request.start_time,
            Self::Mpa(request) => request.start_time,
        }
    }

    /// Returns the end of the requested window.
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        match self {
            Self::Jit(request) => request.end_time,
            Self::Mpa(request) => request.end_time,
        }
    }

    /// Returns the requested duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_time() - self.start_time()
    }
}

impl PartialEq for ActivationRequest {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ActivationRequest {}

impl Hash for ActivationRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// The record produced by a successful activation.
#[derive(Debug, Clone)]
pub struct Activation {
    request: ActivationRequest,
    activation_time: DateTime<Utc>,
}

impl Activation {
    /// Creates an activation record.
    #[must_use]
    pub fn new(request: ActivationRequest, activation_time: DateTime<Utc>) -> Self {
        Self {
            request,
            activation_time,
        }
    }

    /// Returns the activated request.
    #[must_use]
    pub fn request(&self) -> &ActivationRequest {
        &self.request
    }

    /// Returns when the activation was committed.
    #[must_use]
    pub fn activation_time(&self) -> DateTime<Utc> {
        self.activation_time
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};

    use elevara_core::{ProjectId, ProjectRoleBinding, UserId};

    use super::{ActivationRequestId, JitActivationRequest, MpaActivationRequest};
    use crate::ActivationType;

    fn user(email: &str) -> UserId {
        UserId::new(email).unwrap_or_else(|_| unreachable!())
    }

    fn binding(project: &str, role: &str) -> ProjectRoleBinding {
        let project = ProjectId::new(project).unwrap_or_else(|_| unreachable!());
        ProjectRoleBinding::for_project(project, role)
    }

    #[test]
    fn generated_ids_carry_the_type_prefix_and_are_unique() {
        let first = ActivationRequestId::generate(ActivationType::Jit);
        let second = ActivationRequestId::generate(ActivationType::Mpa);

        let first = first.unwrap_or_else(|_| unreachable!());
        let second = second.unwrap_or_else(|_| unreachable!());
        assert!(first.as_str().starts_with("jit-"));
        assert!(second.as_str().starts_with("mpa-"));
        assert_ne!(first.as_str(), second.as_str());
    }

    #[test]
    fn jit_request_rejects_roles_across_projects() {
        let start = Utc::now();
        let result = JitActivationRequest::new(
            user("alice@example.com"),
            BTreeSet::from([
                binding("project-1", "roles/browser"),
                binding("project-2", "roles/browser"),
            ]),
            "case-123",
            start,
            start + Duration::minutes(5),
        );

        assert!(result.is_err());
    }

    #[test]
    fn jit_request_rejects_empty_roles_and_blank_justification() {
        let start = Utc::now();

        assert!(JitActivationRequest::new(
            user("alice@example.com"),
            BTreeSet::new(),
            "case-123",
            start,
            start + Duration::minutes(5),
        )
        .is_err());

        assert!(JitActivationRequest::new(
            user("alice@example.com"),
            BTreeSet::from([binding("project-1", "roles/browser")]),
            "   ",
            start,
            start + Duration::minutes(5),
        )
        .is_err());
    }

    #[test]
    fn sub_minute_windows_are_rejected() {
        let start = Utc::now();
        let result = JitActivationRequest::new(
            user("alice@example.com"),
            BTreeSet::from([binding("project-1", "roles/browser")]),
            "case-123",
            start,
            start + Duration::seconds(30),
        );

        assert!(result.is_err());
    }

    #[test]
    fn mpa_request_rejects_self_review() {
        let start = Utc::now();
        let result = MpaActivationRequest::new(
            user("alice@example.com"),
            binding("project-1", "roles/browser"),
            BTreeSet::from([user("alice@example.com")]),
            "ticket-9",
            start,
            start + Duration::minutes(10),
        );

        assert!(result.is_err());
    }

    #[test]
    fn restored_request_keeps_its_id() {
        let id = ActivationRequestId::parse("mpa-00aa11bb22cc").unwrap_or_else(|_| unreachable!());
        let start = Utc::now();
        let restored = MpaActivationRequest::with_id(
            id.clone(),
            user("alice@example.com"),
            binding("project-1", "roles/browser"),
            BTreeSet::from([user("bob@example.com")]),
            "ticket-9",
            start,
            start + Duration::minutes(10),
        );

        assert_eq!(
            restored.unwrap_or_else(|_| unreachable!()).id(),
            &id
        );
    }

    #[test]
    fn untagged_ids_are_rejected() {
        assert!(ActivationRequestId::parse("request-1").is_err());
        assert!(ActivationRequestId::parse("jit-").is_err());
    }
}
