//! End-to-end orchestration of role activations.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use elevara_core::{AppError, AppResult, ProjectRoleBinding, UserId};
use elevara_domain::{
    Activation, ActivationRequest, JitActivationRequest, MpaActivationRequest,
    RegexJustificationPolicy, MIN_ACTIVATION_DURATION,
};

use crate::binding_mutator::{ApplyOptions, BindingMutator};
use crate::catalog::ProjectRoleCatalog;
use crate::notification::{NotificationEvent, NotificationService};
use crate::token_service::TokenService;

/// Grace allowed for requested start times lying slightly in the past,
/// compensating clock skew between caller and service.
const START_TIME_GRACE: Duration = Duration::minutes(1);

/// Orchestrates validation, IAM mutation, and notification for activations.
pub struct Activator {
    catalog: Arc<ProjectRoleCatalog>,
    justification_policy: Arc<RegexJustificationPolicy>,
    mutator: Arc<BindingMutator>,
    token_service: Arc<TokenService>,
    notifications: Arc<NotificationService>,
}

impl Activator {
    /// Creates an activator over its collaborating services.
    #[must_use]
    pub fn new(
        catalog: Arc<ProjectRoleCatalog>,
        justification_policy: Arc<RegexJustificationPolicy>,
        mutator: Arc<BindingMutator>,
        token_service: Arc<TokenService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            catalog,
            justification_policy,
            mutator,
            token_service,
            notifications,
        }
    }

    fn check_duration(&self, duration: Duration) -> AppResult<()> {
        if duration < MIN_ACTIVATION_DURATION {
            return Err(AppError::InvalidArgument(format!(
                "the activation must last at least {} seconds",
                MIN_ACTIVATION_DURATION.num_seconds()
            )));
        }

        let ceiling = self.catalog.options().activation_timeout;
        if duration > ceiling {
            return Err(AppError::InvalidArgument(format!(
                "the activation must not exceed {} minutes",
                ceiling.num_minutes()
            )));
        }

        Ok(())
    }

    fn check_start_time(&self, start_time: DateTime<Utc>, horizon: Duration) -> AppResult<()> {
        let now = Utc::now();
        if start_time < now - START_TIME_GRACE {
            return Err(AppError::InvalidArgument(
                "the activation start time lies in the past".to_owned(),
            ));
        }

        if start_time > now + horizon {
            return Err(AppError::InvalidArgument(format!(
                "the activation start time lies more than {} minutes ahead",
                horizon.num_minutes()
            )));
        }

        Ok(())
    }

    /// Builds a JIT self-approval request.
    pub fn create_jit_request(
        &self,
        requesting_user: UserId,
        entitlements: BTreeSet<ProjectRoleBinding>,
        justification: impl Into<String>,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> AppResult<ActivationRequest> {
        let options = self.catalog.options();
        if entitlements.len() > options.max_jit_roles_per_self_approval {
            return Err(AppError::InvalidArgument(format!(
                "a single request may activate at most {} roles",
                options.max_jit_roles_per_self_approval
            )));
        }

        self.check_duration(duration)?;
        self.check_start_time(start_time, options.activation_request_timeout)?;

        let request = JitActivationRequest::new(
            requesting_user,
            entitlements,
            justification,
            start_time,
            start_time + duration,
        )?;

        Ok(ActivationRequest::Jit(request))
    }

    /// Builds an MPA request, signs it, and notifies the reviewers.
    pub async fn create_mpa_request(
        &self,
        requesting_user: UserId,
        entitlement: ProjectRoleBinding,
        reviewers: BTreeSet<UserId>,
        justification: impl Into<String>,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> AppResult<ActivationRequest> {
        let options = self.catalog.options();
        if reviewers.len() < options.min_reviewers {
            return Err(AppError::InvalidArgument(format!(
                "at least {} reviewers are required",
                options.min_reviewers
            )));
        }

        if reviewers.len() > options.max_reviewers {
            return Err(AppError::InvalidArgument(format!(
                "at most {} reviewers may be named",
                options.max_reviewers
            )));
        }

        self.check_duration(duration)?;
        // The token expires with the request end, so the start horizon bounds
        // how long an approval link can stay redeemable.
        self.check_start_time(start_time, options.activation_request_timeout)?;

        if !self.notifications.can_deliver() {
            return Err(AppError::FeatureNotAvailable(
                "multi-party approval requires a notification channel".to_owned(),
            ));
        }

        let request = MpaActivationRequest::new(
            requesting_user,
            entitlement,
            reviewers,
            justification,
            start_time,
            start_time + duration,
        )?;

        let approval = self.token_service.sign(&request).await?;
        let approval_url = self.token_service.approval_url(&approval);

        self.notifications
            .send(&NotificationEvent::RequestActivation {
                request: request.clone(),
                approval_url,
                expires_at: approval.expires_at,
            })
            .await?;

        tracing::info!(
            request = %request.id(),
            beneficiary = %request.requesting_user(),
            reviewers = request.reviewers().len(),
            "created approval request"
        );

        Ok(ActivationRequest::Mpa(request))
    }

    async fn apply_request(
        &self,
        request: &ActivationRequest,
        options: ApplyOptions,
    ) -> AppResult<Activation> {
        self.catalog
            .verify_user_can_activate(request.requesting_user(), request)
            .await?;

        self.justification_policy
            .check(request.justification(), request.requesting_user())?;

        // Each role's apply is individually idempotent; a failure part-way
        // leaves earlier roles granted, which the platform's per-binding
        // atomicity makes acceptable.
        for entitlement in request.entitlements() {
            self.mutator
                .apply_temporary_binding(
                    entitlement.project_id(),
                    request.requesting_user(),
                    entitlement.role(),
                    request.start_time(),
                    request.end_time(),
                    request.justification(),
                    options,
                )
                .await?;
        }

        tracing::info!(
            request = %request.id(),
            beneficiary = %request.requesting_user(),
            roles = request.entitlements().len(),
            "activated request"
        );

        Ok(Activation::new(request.clone(), Utc::now()))
    }

    /// Activates a validated request: JIT self-approval, or an MPA request
    /// whose approval token has been verified.
    pub async fn activate(&self, request: &ActivationRequest) -> AppResult<Activation> {
        self.apply_request(
            request,
            ApplyOptions {
                purge_existing_temporary_bindings: true,
                fail_if_binding_exists: false,
            },
        )
        .await
    }

    /// Approves an MPA request on behalf of a reviewer and activates it.
    pub async fn approve(
        &self,
        approver: &UserId,
        request: &MpaActivationRequest,
    ) -> AppResult<Activation> {
        if approver == request.requesting_user() {
            return Err(AppError::AccessDenied(format!(
                "'{approver}' cannot approve their own request"
            )));
        }

        if !request.reviewers().contains(approver) {
            return Err(AppError::AccessDenied(format!(
                "'{approver}' is not a reviewer of this request"
            )));
        }

        let activation = self
            .apply_request(
                &ActivationRequest::Mpa(request.clone()),
                ApplyOptions {
                    purge_existing_temporary_bindings: true,
                    fail_if_binding_exists: true,
                },
            )
            .await?;

        self.notifications
            .send(&NotificationEvent::ActivationApproved {
                request: request.clone(),
                approver: approver.clone(),
                activation_time: activation.activation_time(),
            })
            .await?;

        tracing::info!(
            request = %request.id(),
            approver = %approver,
            "approved request"
        );

        Ok(activation)
    }
}
