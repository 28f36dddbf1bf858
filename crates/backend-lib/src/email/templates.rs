//! Email bodies.
use crate::validation::escape_html;

/// Available templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    VerifyEmail,
    PasswordReset,
}

/// Values substituted into a template
#[derive(Debug, Clone)]
pub struct EmailContext {
    pub app_name: String,
    pub recipient_name: String,
    pub action_url: String,
    /// Link lifetime in hours, shown to the reader
    pub expiry_hours: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::VerifyEmail => "verify_email",
            EmailTemplate::PasswordReset => "password_reset",
        }
    }

    pub fn render(&self, ctx: &EmailContext) -> RenderedEmail {
        match self {
            EmailTemplate::VerifyEmail => render_verify_email(ctx),
            EmailTemplate::PasswordReset => render_password_reset(ctx),
        }
    }
}

fn html_page(app_name: &str, heading: &str, paragraphs: &[String], button: (&str, &str), footer: &str) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>\n")).collect();
    format!(
        "<!DOCTYPE html>\n\
         <html><body style=\"font-family: Arial, sans-serif; color: #222;\">\n\
         <h2>{heading}</h2>\n\
         {body}\
         <p><a href=\"{href}\" style=\"background:#2d6cdf;color:#fff;padding:10px 18px;\
         border-radius:4px;text-decoration:none;\">{label}</a></p>\n\
         <p style=\"font-size:12px;color:#666;\">{footer}</p>\n\
         <p>{app_name}</p>\n\
         </body></html>\n",
        href = button.1,
        label = button.0,
    )
}

fn render_verify_email(ctx: &EmailContext) -> RenderedEmail {
    let app = escape_html(&ctx.app_name);
    let name = escape_html(&ctx.recipient_name);
    let url = escape_html(&ctx.action_url);

    let html = html_page(
        &app,
        "Verify your email address",
        &[
            format!("Hello {name},"),
            format!("Thanks for signing up to {app}. Please confirm your email address."),
            format!("This link expires in {} hours.", ctx.expiry_hours),
        ],
        ("Verify my email", &url),
        &format!("If the button does not work, copy this address into your browser: {url}"),
    );

    let text = format!(
        "Hello {recipient},\n\n\
         Please verify your email address by opening the link below:\n\n\
         {link}\n\n\
         This link expires in {hours} hours.\n\n\
         Thank you,\n\
         {app_name} Team\n",
        recipient = ctx.recipient_name,
        link = ctx.action_url,
        hours = ctx.expiry_hours,
        app_name = ctx.app_name,
    );

    RenderedEmail {
        subject: format!("{} - Verify your email address", ctx.app_name),
        html,
        text,
    }
}

fn render_password_reset(ctx: &EmailContext) -> RenderedEmail {
    let app = escape_html(&ctx.app_name);
    let name = escape_html(&ctx.recipient_name);
    let url = escape_html(&ctx.action_url);

    let html = html_page(
        &app,
        "Reset your password",
        &[
            format!("Hello {name},"),
            format!("A password reset was requested for your {app} account."),
            format!("This link expires in {} hours.", ctx.expiry_hours),
            "If you did not request this reset, you can ignore this email.".to_string(),
        ],
        ("Choose a new password", &url),
        &format!("If the button does not work, copy this address into your browser: {url}"),
    );

    let text = format!(
        "Hello {recipient},\n\n\
         A password reset was requested for your {app_name} account.\n\
         To choose a new password, open the link below:\n\n\
         {link}\n\n\
         This link expires in {hours} hours.\n\n\
         If you did not request this reset, please ignore this email.\n\n\
         {app_name} Team\n",
        recipient = ctx.recipient_name,
        link = ctx.action_url,
        hours = ctx.expiry_hours,
        app_name = ctx.app_name,
    );

    RenderedEmail {
        subject: format!("{} - Password reset", ctx.app_name),
        html,
        text,
    }
}
