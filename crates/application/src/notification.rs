//! Notification events emitted by the activation flow.
//!
//! The core only produces structured events; delivery (mail, pub/sub) is a
//! collaborator concern.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use elevara_core::{AppError, AppResult, UserId};
use elevara_domain::MpaActivationRequest;

/// A structured event for delivery collaborators.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// A new MPA request awaits review.
    RequestActivation {
        /// The pending request.
        request: MpaActivationRequest,
        /// Link a reviewer follows to approve.
        approval_url: String,
        /// When the approval link stops working.
        expires_at: DateTime<Utc>,
    },
    /// An MPA request was approved and activated.
    ActivationApproved {
        /// The approved request.
        request: MpaActivationRequest,
        /// The reviewer who approved.
        approver: UserId,
        /// When the activation was committed.
        activation_time: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Returns the users this event should reach: the reviewers for a
    /// pending request, everyone involved for an approval.
    #[must_use]
    pub fn recipients(&self) -> BTreeSet<UserId> {
        match self {
            Self::RequestActivation { request, .. } => request.reviewers().clone(),
            Self::ActivationApproved { request, .. } => {
                let mut recipients = request.reviewers().clone();
                recipients.insert(request.requesting_user().clone());
                recipients
            }
        }
    }

    /// Returns a one-line subject.
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Self::RequestActivation { request, .. } => format!(
                "{} requests access to project {}",
                request.requesting_user(),
                request.entitlement().project_id()
            ),
            Self::ActivationApproved { request, .. } => format!(
                "Access of {} to project {} was approved",
                request.requesting_user(),
                request.entitlement().project_id()
            ),
        }
    }
}

/// Delivery collaborator.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Returns whether this sink is configured to deliver anything.
    fn can_send(&self) -> bool;

    /// Delivers an event.
    async fn send(&self, event: &NotificationEvent) -> AppResult<()>;
}

/// Fans events out to every capable sink.
pub struct NotificationService {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl NotificationService {
    /// Creates a service over the configured sinks.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    /// Returns whether any sink can deliver.
    #[must_use]
    pub fn can_deliver(&self) -> bool {
        self.sinks.iter().any(|sink| sink.can_send())
    }

    /// Sends an event to all capable sinks.
    ///
    /// A pending request with no capable sink fails with
    /// [`AppError::FeatureNotAvailable`]: without reviewers being told, the
    /// request could never be approved. Other undeliverable events are only
    /// logged.
    pub async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        let capable: Vec<&Arc<dyn NotificationSink>> = self
            .sinks
            .iter()
            .filter(|sink| sink.can_send())
            .collect();

        if capable.is_empty() {
            if matches!(event, NotificationEvent::RequestActivation { .. }) {
                return Err(AppError::FeatureNotAvailable(
                    "multi-party approval requires a notification channel".to_owned(),
                ));
            }

            tracing::warn!(subject = %event.subject(), "no sink can deliver this event");
            return Ok(());
        }

        for sink in capable {
            sink.send(event).await?;
        }

        Ok(())
    }
}
