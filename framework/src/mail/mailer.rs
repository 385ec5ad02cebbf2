//! Mailer trait with SMTP and console implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::{Email, MailError};
use crate::config::{load_dotenv, require_env, ConfigError, EnvConfig};

/// Async email sending trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS.
    #[default]
    Starttls,
    /// Implicit TLS, usually port 465.
    Tls,
    /// No encryption. Local relays only.
    None,
}

/// Configuration for [`SmtpMailer`].
#[derive(Clone, Deserialize)]
pub struct MailerConfig {
    #[serde(rename = "smtp_host", default = "default_host")]
    pub host: String,

    #[serde(rename = "smtp_port", default = "default_port")]
    pub port: u16,

    #[serde(rename = "smtp_username", default = "default_username")]
    pub username: String,

    #[serde(rename = "smtp_password", alias = "app_password")]
    pub password: String,

    /// Sender address for every message.
    #[serde(rename = "sender_email")]
    pub from: String,

    #[serde(rename = "smtp_tls", default)]
    pub tls: TlsMode,

    /// Connection timeout in seconds.
    #[serde(rename = "smtp_timeout", default = "default_timeout")]
    pub timeout: u64,
}

fn default_host() -> String {
    "live.smtp.mailtrap.io".to_string()
}

fn default_port() -> u16 {
    587
}

fn default_username() -> String {
    "smtp@mailtrap.io".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl std::fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MailerConfig {
    pub const REQUIRED: &'static [&'static str] = &["SENDER_EMAIL", "SMTP_PASSWORD|APP_PASSWORD"];

    /// Read `.env` and the environment, failing fast on missing keys.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        require_env(Self::REQUIRED)?;
        Self::from_env()
    }
}

/// SMTP-based mailer using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer from environment variables. See [`MailerConfig`].
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_config(MailerConfig::load()?)
    }

    pub fn from_config(config: MailerConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidSender(config.from.clone()))?;

        let builder = match config.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
        };

        let transport = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout)))
            .credentials(Credentials::new(config.username, config.password))
            .build();

        Ok(Self {
            transport: Arc::new(transport),
            from,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let from = match &email.from {
            Some(from) => from
                .parse()
                .map_err(|_| MailError::InvalidAddress(from.clone()))?,
            None => self.from.clone(),
        };

        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .singlepart(SinglePart::html(email.html.clone()))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        Ok(())
    }
}

/// Logs messages instead of sending them. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            bytes = email.html.len(),
            "dry run, not sending"
        );
        tracing::trace!(html = %email.html, "rendered body");
        Ok(())
    }
}
