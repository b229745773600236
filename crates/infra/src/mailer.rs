//! Outbound email for activation and recovery links.

use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
    #[error("failed to deliver mail to {to}: {reason}")]
    Delivery { to: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    Activate,
    Recovery,
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::Activate => "Activate your account",
            EmailTemplate::Recovery => "Password recovery",
        }
    }
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub template: EmailTemplate,
    pub subject: String,
    pub body: String,
    /// The action link embedded in the body.
    pub url: String,
}

impl Email {
    pub fn render(template: EmailTemplate, to: &str, name: &str, url: &str) -> Self {
        let body = match template {
            EmailTemplate::Activate => format!(
                "Hello {name},\n\nan account was created for you. Set your password here:\n{url}\n"
            ),
            EmailTemplate::Recovery => format!(
                "Hello {name},\n\nuse the link below to set a new password:\n{url}\n\nIf you did not expect this email, ignore it.\n"
            ),
        };
        Self {
            to: to.to_string(),
            template,
            subject: template.subject().to_string(),
            body,
            url: url.to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            url = %email.url,
            "outgoing email"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory so tests can follow the links.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    sent: Mutex<Vec<Email>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent message sent to `to`.
    pub fn last_to(&self, to: &str) -> Option<Email> {
        self.sent().into_iter().rev().find(|e| e.to == to)
    }
}

#[async_trait::async_trait]
impl Mailer for InMemoryOutbox {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let mut sent = self.sent.lock().map_err(|_| MailError::Delivery {
            to: email.to.clone(),
            reason: "outbox lock poisoned".to_string(),
        })?;
        sent.push(email);
        Ok(())
    }
}
