//! SMTP delivery client
//!
//! Sends generated bodies as plain-text mail over a relay, STARTTLS by
//! default. The transport is built once at startup and pooled by lettre.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SUBJECT: &str = "Your Subject";

/// SMTP delivery errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Transport security for the SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS
    StartTls,
    /// Implicit TLS from the first byte
    Tls,
    /// No encryption (local relays only)
    None,
}

impl TlsMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "starttls" => Some(TlsMode::StartTls),
            "tls" => Some(TlsMode::Tls),
            "none" => Some(TlsMode::None),
            _ => None,
        }
    }
}

impl Default for TlsMode {
    fn default() -> Self {
        TlsMode::StartTls
    }
}

/// Delivers a finished message body to one recipient
#[async_trait]
pub trait MessageDeliverer: Send + Sync {
    async fn deliver(&self, recipient: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Resolve the sender mailbox: explicit `from`, else the SMTP username
fn sender_mailbox(config: &SmtpConfig) -> Result<Mailbox, DeliveryError> {
    let from = if config.from.is_empty() {
        &config.username
    } else {
        &config.from
    };

    from.parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", from, e)))
}

/// Lettre-backed SMTP mailer
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    subject: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let sender = sender_mailbox(config)?;

        let mut builder = match config.tls {
            TlsMode::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
                    .map_err(|e| DeliveryError::Smtp(e.to_string()))?
            }
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
                .map_err(|e| DeliveryError::Smtp(e.to_string()))?,
            TlsMode::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
            }
        };

        builder = builder.port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
            subject: config.subject.clone(),
        })
    }
}

#[async_trait]
impl MessageDeliverer for SmtpMailer {
    async fn deliver(&self, recipient: &str, body: &str) -> Result<(), DeliveryError> {
        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", recipient, e)))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?;

        tracing::debug!(recipient = %recipient, "SMTP delivery accepted");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SmtpConfig {
        SmtpConfig {
            server: "smtp.example.com".to_string(),
            port: 587,
            username: "sender@example.com".to_string(),
            password: "secret".to_string(),
            from: String::new(),
            tls: TlsMode::StartTls,
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }

    #[test]
    fn test_tls_mode_from_str() {
        assert_eq!(TlsMode::from_str("starttls"), Some(TlsMode::StartTls));
        assert_eq!(TlsMode::from_str("TLS"), Some(TlsMode::Tls));
        assert_eq!(TlsMode::from_str("none"), Some(TlsMode::None));
        assert_eq!(TlsMode::from_str("ssl"), None);
    }

    #[test]
    fn test_sender_falls_back_to_username() {
        let config = test_config();
        let sender = sender_mailbox(&config).unwrap();
        assert_eq!(sender.email.to_string(), "sender@example.com");
    }

    #[test]
    fn test_explicit_from_overrides_username() {
        let mut config = test_config();
        config.from = "Campaigns <campaigns@example.com>".to_string();
        let sender = sender_mailbox(&config).unwrap();
        assert_eq!(sender.email.to_string(), "campaigns@example.com");
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let mut config = test_config();
        config.from = "not-an-address".to_string();
        let err = sender_mailbox(&config).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress(_)));
    }

    // The pooled transport wants a runtime even though nothing connects
    #[tokio::test]
    async fn test_mailer_builds_without_connecting() {
        let mailer = SmtpMailer::new(&test_config());
        assert!(mailer.is_ok());
    }
}
