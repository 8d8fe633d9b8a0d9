//! Run notifications over SMTP.
//!
//! [`EmailDelivery`] holds one `lettre` transport for the lifetime of
//! the process. When `SMTP_HOST` is unset [`EmailConfig::from_env`] yields
//! `None` and the server wires [`LogNotifier`] instead.

use async_trait::async_trait;
use brandlens_core::collaborators::Notifier;
use brandlens_core::error::ExternalError;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

const SERVICE: &str = "mail relay";

const DEFAULT_PORT: u16 = 587;
const DEFAULT_SENDER: &str = "Brandlens <noreply@brandlens.local>";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid mailbox: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),

    #[error("Could not assemble message: {0}")]
    Message(#[from] lettre::error::Error),
}

impl From<EmailError> for ExternalError {
    fn from(err: EmailError) -> Self {
        ExternalError::request(SERVICE, err.to_string())
    }
}

/// SMTP relay settings.
///
/// | Variable        | Default                               |
/// |-----------------|---------------------------------------|
/// | `SMTP_HOST`     | unset disables email                  |
/// | `SMTP_PORT`     | `587` (STARTTLS)                      |
/// | `SMTP_FROM`     | `Brandlens <noreply@brandlens.local>` |
/// | `SMTP_USER`     |                                       |
/// | `SMTP_PASSWORD` |                                       |
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub sender: String,
    pub credentials: Option<(String, String)>,
}

impl EmailConfig {
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let host = var("SMTP_HOST")?;
        let port = var("SMTP_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let sender = var("SMTP_FROM").unwrap_or_else(|| DEFAULT_SENDER.to_string());
        let credentials = var("SMTP_USER").zip(var("SMTP_PASSWORD"));

        Some(Self {
            host,
            port,
            sender,
            credentials,
        })
    }
}

/// [`Notifier`] backed by an SMTP relay.
pub struct EmailDelivery {
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailDelivery {
    /// Validate the sender and set up the relay transport. No connection is
    /// opened until the first message goes out.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let sender = config.sender.parse()?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let Some((user, password)) = config.credentials {
            builder = builder.credentials(Credentials::new(user, password));
        }

        Ok(Self {
            sender,
            transport: builder.build(),
        })
    }

    fn compose(&self, to: &str, subject: &str, body: &str) -> Result<Message, EmailError> {
        Ok(Message::builder()
            .from(self.sender.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?)
    }
}

#[async_trait]
impl Notifier for EmailDelivery {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), ExternalError> {
        let message = self.compose(address, subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(EmailError::from)?;

        tracing::info!(to = address, subject, "Run notification sent");
        Ok(())
    }
}

/// Logs notifications instead of mailing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), ExternalError> {
        tracing::info!(to = address, subject, body, "SMTP not configured, notification logged only");
        Ok(())
    }
}
