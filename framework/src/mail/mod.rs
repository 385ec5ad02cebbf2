//! Templated HTML mail campaigns over SMTP.
//!
//! This module provides a thin abstraction over [lettre](https://lettre.rs) with
//! environment-based configuration, recipient list loaders, and askama templates.
//!
//! # Quick Start
//!
//! ```ignore
//! // 1. Initialize mailer from environment
//! let mailer = SmtpMailer::from_env()?;
//!
//! // 2. Load recipients
//! let recipients = recipients::load_tab_separated("schools.txt")?;
//!
//! // 3. Send, one message per recipient with a pause in between
//! let settings = CampaignSettings::load()?;
//! let report = send_campaign(&mailer, Campaign::SchoolOutreach, &recipients, &settings).await;
//! ```
//!
//! # Environment Variables
//!
//! [`SmtpMailer::from_env`] reads:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SENDER_EMAIL` | Yes | Sender address |
//! | `SMTP_PASSWORD` | Yes | Relay password or API token (`APP_PASSWORD` is accepted as an alias) |
//! | `SMTP_HOST` | No | Relay hostname (default: `live.smtp.mailtrap.io`) |
//! | `SMTP_PORT` | No | Port (default: 587) |
//! | `SMTP_USERNAME` | No | Login (default: `smtp@mailtrap.io`) |
//! | `SMTP_TLS` | No | `starttls` (default), `tls`, or `none` |
//! | `SMTP_TIMEOUT` | No | Connection timeout in seconds (default: 10) |
//!
//! [`CampaignSettings::load`] reads the optional `EMAIL_SUBJECT` and `THROTTLE_SECONDS`.

mod campaign;
mod mailer;
mod message;
pub mod recipients;

pub use campaign::{letter_date, send_campaign, Campaign, CampaignSettings, FailedSend, SendReport};
pub use mailer::{ConsoleMailer, Mailer, MailerConfig, SmtpMailer, TlsMode};
pub use message::{Email, EmailBuilder};
pub use recipients::{Recipient, RecipientError};

use crate::ErrorKind;

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum MailError {
    #[error(transparent)]
    #[error_kind(Config)]
    Config(#[from] crate::config::ConfigError),

    #[error("invalid sender address: {0}")]
    #[error_kind(Config)]
    InvalidSender(String),

    #[error("invalid email address: {0}")]
    #[error_kind(Send)]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    #[error_kind(Send)]
    Build(String),

    #[error("failed to render template: {0}")]
    #[error_kind(Send)]
    Render(#[from] askama::Error),

    #[error("SMTP error: {0}")]
    #[error_kind(Send)]
    Smtp(String),
}
