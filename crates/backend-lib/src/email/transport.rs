//! Mail transports.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use parking_lot::Mutex;

use super::{EmailError, EmailTemplate};
use crate::config::EmailSettings;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A rendered message ready for delivery
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub template: EmailTemplate,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Delivers rendered messages
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// SMTP relay over implicit TLS
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings, app_name: &str) -> Result<Self, EmailError> {
        let address = if settings.from_address.is_empty() {
            &settings.smtp_username
        } else {
            &settings.from_address
        };
        let from: Mailbox = format!("{app_name} <{address}>")
            .parse()
            .map_err(|e| EmailError::Address(format!("invalid from address: {e}")))?;

        let transport = SmtpTransport::relay(&settings.smtp_host)
            .map_err(|e| EmailError::Transport(format!("failed to create SMTP transport: {e}")))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.smtp_username.clone(),
                settings.smtp_password.clone(),
            ))
            .pool_config(PoolConfig::new().max_size(4))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| EmailError::Address(format!("invalid recipient: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(email.text.clone(), email.html.clone()))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        // lettre's SmtpTransport blocks
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| EmailError::Transport(format!("send task failed: {e}")))?
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Logs messages instead of sending them; used when email is disabled
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        tracing::info!(
            to = %email.to,
            template = email.template.name(),
            subject = %email.subject,
            "email delivery disabled, message logged"
        );
        tracing::debug!(body = %email.text, "email body");
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    fail: Arc<Mutex<bool>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    /// Most recent message to `to` built from `template`
    pub fn last_to(&self, to: &str, template: EmailTemplate) -> Option<OutgoingEmail> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|e| e.to.eq_ignore_ascii_case(to) && e.template == template)
            .cloned()
    }

    /// Make subsequent deliveries fail
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock() = failing;
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        if *self.fail.lock() {
            return Err(EmailError::Transport("simulated delivery failure".to_string()));
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}
