//! Best-effort email dispatch.
//!
//! Delivery is attempted once. Failures are logged and reported to the
//! caller as a warning; they never undo the operation that triggered them.
mod templates;
mod transport;

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;

pub use templates::{EmailContext, EmailTemplate, RenderedEmail};
pub use transport::{LogMailer, Mailer, MemoryMailer, OutgoingEmail, SmtpMailer};

use crate::config::Settings;

#[derive(Debug, Clone, Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Could not build message: {0}")]
    Build(String),

    #[error("Delivery failed: {0}")]
    Transport(String),
}

/// Renders templates and hands them to a [`Mailer`]
#[derive(Clone)]
pub struct EmailDispatcher {
    mailer: Arc<dyn Mailer>,
    app_name: String,
    frontend_url: String,
    background: bool,
}

impl EmailDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, settings: &Settings) -> Self {
        Self {
            mailer,
            app_name: settings.app_name.clone(),
            frontend_url: settings.frontend_url.trim_end_matches('/').to_string(),
            background: settings.email.background,
        }
    }

    /// Mailer matching the settings: SMTP when enabled, logging otherwise
    pub fn mailer_from_settings(settings: &Settings) -> Result<Arc<dyn Mailer>, EmailError> {
        if settings.email.enabled {
            Ok(Arc::new(SmtpMailer::new(&settings.email, &settings.app_name)?))
        } else {
            Ok(Arc::new(LogMailer))
        }
    }

    /// Link the recipient follows; `path` is relative to the frontend URL
    pub fn link(&self, path: &str, uid: &str, token: &str) -> String {
        format!("{}/{path}?uid={uid}&token={token}", self.frontend_url)
    }

    pub fn context(&self, recipient_name: &str, action_url: String, expiry_hours: u64) -> EmailContext {
        EmailContext {
            app_name: self.app_name.clone(),
            recipient_name: recipient_name.to_string(),
            action_url,
            expiry_hours,
        }
    }

    /// Render and deliver, logging the outcome
    pub async fn send(&self, template: EmailTemplate, ctx: &EmailContext, to: &str) -> Result<(), EmailError> {
        deliver(self.mailer.as_ref(), template, ctx, to).await
    }

    /// Fire-and-forget delivery on a background task
    pub fn send_background(&self, template: EmailTemplate, ctx: EmailContext, to: String) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            // outcome already logged
            let _ = deliver(mailer.as_ref(), template, &ctx, &to).await;
        });
    }

    /// Send in the configured mode. Returns a warning when an inline send fails.
    pub async fn dispatch(&self, template: EmailTemplate, ctx: EmailContext, to: &str) -> Option<String> {
        if self.background {
            self.send_background(template, ctx, to.to_string());
            return None;
        }
        self.send(template, &ctx, to)
            .await
            .err()
            .map(|_| "The email could not be sent. Please try again later.".to_string())
    }
}

async fn deliver(mailer: &dyn Mailer, template: EmailTemplate, ctx: &EmailContext, to: &str) -> Result<(), EmailError> {
    let rendered = template.render(ctx);
    let email = OutgoingEmail {
        template,
        to: to.to_string(),
        subject: rendered.subject,
        html: rendered.html,
        text: rendered.text,
    };

    match mailer.deliver(&email).await {
        Ok(()) => {
            counter!(crate::metrics::EMAIL_SENT, "template" => template.name()).increment(1);
            tracing::info!(to, template = template.name(), "email sent");
            Ok(())
        },
        Err(e) => {
            counter!(crate::metrics::EMAIL_FAILED, "template" => template.name()).increment(1);
            tracing::error!(to, template = template.name(), error = %e, "email delivery failed");
            Err(e)
        },
    }
}
