//! SMTP notification sink using the `lettre` crate.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use elevara_application::{
    Diagnosable, DiagnosticResult, NotificationEvent, NotificationSink, SecretStore,
};
use elevara_core::{AppError, AppResult};

/// SMTP sink configuration.
#[derive(Clone)]
pub struct SmtpNotificationConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// SMTP username.
    pub username: String,
    /// SMTP password; preferred over the secret path when both are set.
    pub password: Option<String>,
    /// Secret-store path holding the SMTP password.
    pub password_secret_path: Option<String>,
    /// Sender address, e.g. `Elevara <no-reply@example.com>`.
    pub sender_address: String,
}

/// Production notification sink delivering events by mail.
#[derive(Clone)]
pub struct SmtpNotificationSink {
    sender_address: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotificationSink {
    /// Creates an SMTP sink, resolving the password through the secret store
    /// when the configuration names a secret path.
    pub async fn connect(
        config: SmtpNotificationConfig,
        secret_store: Arc<dyn SecretStore>,
    ) -> AppResult<Self> {
        let sender_address = config.sender_address.parse().map_err(|error| {
            AppError::InvalidArgument(format!("invalid SMTP sender address: {error}"))
        })?;

        let password = match (&config.password, &config.password_secret_path) {
            (Some(password), _) => password.clone(),
            (None, Some(secret_path)) => secret_store
                .get_secret(secret_path)
                .await?
                .ok_or_else(|| {
                    AppError::ResourceNotFound(format!(
                        "SMTP password secret '{secret_path}' does not exist"
                    ))
                })?,
            (None, None) => {
                return Err(AppError::InvalidArgument(
                    "an SMTP password or a password secret path is required".to_owned(),
                ))
            }
        };

        let credentials = Credentials::new(config.username, password);

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|error| {
                AppError::InvalidArgument(format!("failed to create SMTP transport: {error}"))
            })?
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();

        Ok(Self {
            sender_address,
            mailer,
        })
    }

    fn render_text(event: &NotificationEvent) -> String {
        match event {
            NotificationEvent::RequestActivation {
                request,
                approval_url,
                expires_at,
            } => format!(
                "{beneficiary} asks to activate {role} on project {project}.\n\n\
                 Justification: {justification}\n\
                 Requested window: {start} to {end}\n\n\
                 Review and approve here:\n{approval_url}\n\n\
                 This link expires at {expires_at}.",
                beneficiary = request.requesting_user(),
                role = request.entitlement().role(),
                project = request.entitlement().project_id(),
                justification = request.justification(),
                start = request.start_time(),
                end = request.end_time(),
            ),
            NotificationEvent::ActivationApproved {
                request,
                approver,
                activation_time,
            } => format!(
                "{approver} approved the request of {beneficiary} for {role} on \
                 project {project} at {activation_time}.\n\n\
                 The role is active until {end}.",
                beneficiary = request.requesting_user(),
                role = request.entitlement().role(),
                project = request.entitlement().project_id(),
                end = request.end_time(),
            ),
        }
    }
}

#[async_trait]
impl NotificationSink for SmtpNotificationSink {
    fn can_send(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        let subject = event.subject();
        if subject.contains('\r') || subject.contains('\n') {
            return Err(AppError::InvalidArgument(
                "notification subject must not contain newline characters".to_owned(),
            ));
        }

        let body = Self::render_text(event);

        for recipient in event.recipients() {
            let to_mailbox: Mailbox = recipient.email.parse().map_err(|error| {
                AppError::InvalidArgument(format!("invalid recipient address: {error}"))
            })?;

            let message = Message::builder()
                .from(self.sender_address.clone())
                .to(to_mailbox)
                .subject(subject.clone())
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(body.clone()),
                )
                .map_err(|error| {
                    AppError::Internal(format!("failed to build notification mail: {error}"))
                })?;

            self.mailer.send(message).await.map_err(|error| {
                AppError::Internal(format!("failed to send notification mail: {error}"))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl Diagnosable for SmtpNotificationSink {
    fn name(&self) -> String {
        "notification (smtp)".to_owned()
    }

    async fn run_diagnostic(&self) -> DiagnosticResult {
        match self.mailer.test_connection().await {
            Ok(true) => DiagnosticResult::success(self.name()),
            Ok(false) => DiagnosticResult::failure(self.name(), "SMTP connection refused"),
            Err(error) => DiagnosticResult::failure(self.name(), error.to_string()),
        }
    }
}
