//! Console notification sink for development. Logs events to tracing output.

use async_trait::async_trait;
use tracing::info;

use elevara_application::{NotificationEvent, NotificationSink};
use elevara_core::AppResult;

/// Development sink that logs notifications instead of delivering them.
#[derive(Clone)]
pub struct ConsoleNotificationSink;

impl ConsoleNotificationSink {
    /// Creates a new console sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for ConsoleNotificationSink {
    fn can_send(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        let recipients: Vec<String> = event
            .recipients()
            .iter()
            .map(ToString::to_string)
            .collect();

        info!(
            subject = %event.subject(),
            recipients = recipients.join(", "),
            "--- NOTIFICATION (console) ---"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};

    use elevara_application::{NotificationEvent, NotificationSink};
    use elevara_core::{ProjectId, ProjectRoleBinding, UserId};
    use elevara_domain::MpaActivationRequest;

    use super::ConsoleNotificationSink;

    #[tokio::test]
    async fn console_sink_always_sends() {
        let sink = ConsoleNotificationSink::new();
        assert!(sink.can_send());

        let start = Utc::now();
        let request = MpaActivationRequest::new(
            UserId::new("alice@example.com").unwrap_or_else(|_| unreachable!()),
            ProjectRoleBinding::for_project(
                ProjectId::new("project-1").unwrap_or_else(|_| unreachable!()),
                "roles/browser",
            ),
            BTreeSet::from([UserId::new("bob@example.com").unwrap_or_else(|_| unreachable!())]),
            "ticket-9",
            start,
            start + Duration::minutes(10),
        )
        .unwrap_or_else(|_| unreachable!());

        let event = NotificationEvent::RequestActivation {
            request,
            approval_url: "https://elevara.example/approve?activation=x".to_owned(),
            expires_at: start + Duration::minutes(10),
        };

        assert!(sink.send(&event).await.is_ok());
    }
}
