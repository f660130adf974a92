//! Outgoing email
//!
//! A [`Mailer`] trait with a Resend HTTP implementation, plus the Tera
//! templates for the digest email.

mod templates;

pub use templates::{
    daily_subject, digest_date, unsubscribe_url, welcome_subject, EmailRenderer, RenderedEmail,
};

use crate::config::MailConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single message to one recipient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Trait for email delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message, returning the provider's message id
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;
}

/// Resend API client
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ResendResponse {
    #[serde(default)]
    id: String,
}

impl ResendMailer {
    /// Build a client when a mail credential is configured
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            client,
            api_key: api_key.to_string(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
        }))
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let body = ResendRequest {
            from: &email.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Mail {
                message: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Mail {
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: ResendResponse = response.json().await.map_err(|e| AppError::Mail {
            message: format!("invalid response body: {}", e),
        })?;

        Ok(parsed.id)
    }
}
