//! Outbound message type and builder.

use super::MailError;

/// One HTML message to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Overrides the mailer's default sender when set.
    pub from: Option<String>,
}

impl Email {
    pub fn builder() -> EmailBuilder {
        EmailBuilder::default()
    }
}

/// Builder for [`Email`].
#[derive(Debug, Default)]
pub struct EmailBuilder {
    to: Option<String>,
    subject: Option<String>,
    html: Option<String>,
    from: Option<String>,
}

impl EmailBuilder {
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Build the email, validating required fields.
    pub fn build(self) -> Result<Email, MailError> {
        let to = self
            .to
            .filter(|to| !to.trim().is_empty())
            .ok_or_else(|| MailError::Build("recipient required".into()))?;

        let subject = self
            .subject
            .ok_or_else(|| MailError::Build("subject required".into()))?;

        let html = self
            .html
            .ok_or_else(|| MailError::Build("html body required".into()))?;

        Ok(Email {
            to,
            subject,
            html,
            from: self.from,
        })
    }
}
