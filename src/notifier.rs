//! Outbound email transport.
//!
//! The handlers and the reconciliation sweeps only need the `Notifier`
//! contract: deliver an HTML body to a recipient under a subject. The
//! production implementation speaks SMTPS to Gmail with an app password,
//! matching how the form relay is deployed.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

/// Errors surfaced by an email transport.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid email address '{address}': {message}")]
    Address { address: String, message: String },
    #[error("failed to build email message: {0}")]
    Message(String),
    #[error("smtp transport failure: {0}")]
    Transport(String),
}

/// Sends formatted emails given recipient, subject and HTML body.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_html(&self, to: &str, subject: &str, html_body: &str)
        -> Result<(), NotifyError>;
}

/// SMTP notifier over implicit TLS (SMTPS, port 465).
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Build a notifier authenticating as `user` with an app password.
    ///
    /// `relay_host` is the SMTPS relay (e.g. `smtp.gmail.com`); the
    /// sender address is the authenticated account itself.
    pub fn new(relay_host: &str, user: &str, app_password: &str) -> Result<Self, NotifyError> {
        let from = parse_mailbox(user)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay_host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .credentials(Credentials::new(user.to_string(), app_password.to_string()))
            .build();
        Ok(Self { transport, from })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        NotifyError::Address {
            address: address.to_string(),
            message: e.to_string(),
        }
    })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_html(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| NotifyError::Message(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        info!("Email sent to {}", to);
        Ok(())
    }
}
