//! Outbound mail - trait seam plus the SMTP implementation
//!
//! The flush coordinator only sees `Arc<dyn Mailer>`; tests swap in a
//! recording double, the daemon wires in [`SmtpMailer`].

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// One fully addressed, rendered outgoing email.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug)]
pub enum SendError {
    /// A from/to/reply-to address did not parse.
    Address(lettre::address::AddressError),
    /// The message could not be assembled.
    Build(lettre::error::Error),
    /// The SMTP conversation failed.
    Transport(lettre::transport::smtp::Error),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Address(err) => write!(f, "invalid mail address: {}", err),
            SendError::Build(err) => write!(f, "could not build message: {}", err),
            SendError::Transport(err) => write!(f, "smtp delivery failed: {}", err),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendError::Address(err) => Some(err),
            SendError::Build(err) => Some(err),
            SendError::Transport(err) => Some(err),
        }
    }
}

/// Delivers rendered digests and alerts.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, outgoing: &Outgoing) -> Result<(), SendError>;
}

/// Mailer backed by an implicit-TLS SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
    ) -> Result<Self, SendError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(SendError::Transport)?
            .port(port);
        if let Some((user, password)) = credentials {
            builder = builder.credentials(Credentials::new(user, password));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, outgoing: &Outgoing) -> Result<(), SendError> {
        let from: Mailbox = outgoing.from.parse().map_err(SendError::Address)?;
        let to: Mailbox = outgoing.to.parse().map_err(SendError::Address)?;
        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(outgoing.subject.as_str())
            .header(ContentType::TEXT_PLAIN);
        if let Some(reply_to) = &outgoing.reply_to {
            builder = builder.reply_to(reply_to.parse().map_err(SendError::Address)?);
        }
        let message = builder
            .body(outgoing.body.clone())
            .map_err(SendError::Build)?;
        self.transport
            .send(message)
            .await
            .map_err(SendError::Transport)?;
        Ok(())
    }
}
