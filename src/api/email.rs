//! Email delivery abstractions.
//!
//! Login codes are sent inline with the request: a failed send fails the login
//! call, there is no outbox or retry. Production uses [`SendGridSender`];
//! development defaults to [`LogEmailSender`], which only logs.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::{Instrument, info, info_span};

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Message carrying a freshly issued login code.
    #[must_use]
    pub fn login_code(to_email: &str, code: &str, ttl_seconds: i64) -> Self {
        let minutes = (ttl_seconds / 60).max(1);
        Self {
            to_email: to_email.to_string(),
            subject: "Your Rocco login code".to_string(),
            body: format!(
                "Your login code is {code}. It expires in {minutes} minutes.\n\n\
                 If you did not request this code you can ignore this email."
            ),
        }
    }
}

/// Email delivery collaborator.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message; an error fails the calling request.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

/// SendGrid v3 mail API sender.
#[derive(Debug)]
pub struct SendGridSender {
    client: Client,
    api_key: SecretString,
    from_email: String,
    url: String,
}

impl SendGridSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString, from_email: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(SEND_TIMEOUT)
            .build()
            .context("failed to build SendGrid client")?;
        Ok(Self {
            client,
            api_key,
            from_email: from_email.to_string(),
            url: SENDGRID_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    fn payload(&self, message: &EmailMessage) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": message.to_email }] }],
            "from": { "email": self.from_email },
            "subject": message.subject,
            "content": [{ "type": "text/plain", "value": message.body }],
        })
    }
}

#[async_trait]
impl EmailSender for SendGridSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let span = info_span!("email.send", provider = "sendgrid");
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.payload(message))
            .send()
            .instrument(span)
            .await
            .context("failed to reach SendGrid")?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(anyhow!("SendGrid rejected message: HTTP {status}"))
        }
    }
}
