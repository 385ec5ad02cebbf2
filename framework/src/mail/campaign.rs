use std::time::Duration;

use askama::Template;
use serde::Deserialize;
use time::{Date, OffsetDateTime};

use super::{Email, MailError, Mailer, Recipient};
use crate::config::{load_dotenv, ConfigError, EnvConfig};

#[derive(Template)]
#[template(path = "school_outreach.html")]
struct SchoolOutreach<'a> {
    date: &'a str,
    year: i32,
    school_name: &'a str,
}

#[derive(Template)]
#[template(path = "info_session.html")]
struct InfoSession<'a> {
    date: &'a str,
    year: i32,
}

#[derive(Template)]
#[template(path = "info_session_link.html")]
struct InfoSessionLink<'a> {
    date: &'a str,
    year: i32,
    first_name: &'a str,
}

/// The letters this crate knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Campaign {
    /// Program introduction to schools, addressed by school name.
    SchoolOutreach,
    /// Invitation to the information session.
    InfoSession,
    /// Meeting link for registered invitees, addressed by first name.
    InfoSessionLink,
}

impl Campaign {
    pub fn default_subject(self) -> &'static str {
        match self {
            Campaign::SchoolOutreach => "STEMulate Research Program",
            Campaign::InfoSession => "Invitation to STEMulate information session",
            Campaign::InfoSessionLink => "Important Update: STEMulate Program",
        }
    }

    /// Pause between two consecutive sends.
    pub fn default_pacing(self) -> Duration {
        match self {
            Campaign::SchoolOutreach => Duration::from_secs(20),
            Campaign::InfoSession | Campaign::InfoSessionLink => Duration::from_secs(10),
        }
    }

    /// Render the HTML body for one recipient.
    pub fn render(self, recipient: &Recipient, today: Date) -> Result<String, MailError> {
        let date = letter_date(today);
        let year = today.year();
        let name = recipient.name.as_deref().unwrap_or_default();

        let html = match self {
            Campaign::SchoolOutreach => SchoolOutreach {
                date: &date,
                year,
                school_name: name,
            }
            .render()?,
            Campaign::InfoSession => InfoSession { date: &date, year }.render()?,
            Campaign::InfoSessionLink => InfoSessionLink {
                date: &date,
                year,
                first_name: name,
            }
            .render()?,
        };
        Ok(html)
    }
}

/// `June 5, 2025`
pub fn letter_date(date: Date) -> String {
    format!("{} {}, {}", date.month(), date.day(), date.year())
}

/// Optional overrides read from `EMAIL_SUBJECT` and `THROTTLE_SECONDS`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignSettings {
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub throttle_seconds: Option<u64>,
}

impl CampaignSettings {
    /// Read `.env` and the environment. Both settings are optional.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_env()
    }

    pub fn subject(&self, campaign: Campaign) -> String {
        self.email_subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .unwrap_or(campaign.default_subject())
            .to_string()
    }

    pub fn pacing(&self, campaign: Campaign) -> Duration {
        self.throttle_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| campaign.default_pacing())
    }
}

#[derive(Debug)]
pub struct FailedSend {
    pub email: String,
    pub error: MailError,
}

/// Outcome of a campaign. Every recipient lands in exactly one list.
#[derive(Debug, Default)]
pub struct SendReport {
    pub sent: Vec<String>,
    pub failed: Vec<FailedSend>,
}

impl SendReport {
    pub fn attempted(&self) -> usize {
        self.sent.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Send one message per recipient, in order, pausing between sends.
///
/// A failed recipient is logged and recorded; the campaign continues.
pub async fn send_campaign<M>(
    mailer: &M,
    campaign: Campaign,
    recipients: &[Recipient],
    settings: &CampaignSettings,
) -> SendReport
where
    M: Mailer + ?Sized,
{
    let subject = settings.subject(campaign);
    let pacing = settings.pacing(campaign);
    let today = OffsetDateTime::now_utc().date();
    let mut report = SendReport::default();

    tracing::info!(
        ?campaign,
        recipients = recipients.len(),
        pacing_secs = pacing.as_secs(),
        "starting campaign"
    );

    for (i, recipient) in recipients.iter().enumerate() {
        if i > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        let result = match campaign.render(recipient, today) {
            Ok(html) => match Email::builder()
                .to(&recipient.email)
                .subject(&subject)
                .html(html)
                .build()
            {
                Ok(email) => mailer.send(&email).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(to = %recipient.email, "sent");
                report.sent.push(recipient.email.clone());
            }
            Err(error) => {
                tracing::warn!(to = %recipient.email, %error, "send failed");
                report.failed.push(FailedSend {
                    email: recipient.email.clone(),
                    error,
                });
            }
        }
    }

    tracing::info!(
        sent = report.sent.len(),
        failed = report.failed.len(),
        "campaign finished"
    );
    report
}
