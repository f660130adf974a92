//! Newsletter subscriptions
//!
//! Subscribing validates and normalizes the address, creates or reactivates
//! the subscriber row and sends the first digest right away. Unsubscribing
//! flips the row's status and is idempotent.

use std::sync::{Arc, OnceLock};

use regex_lite::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::ContentStore;
use crate::digest::{DigestProduct, DigestSelection, DigestSender};
use crate::errors::{AppError, Result};
use crate::metrics;

pub const INVALID_EMAIL: &str = "请输入有效的邮箱地址";
pub const SUBSCRIBE_FAILED: &str = "订阅失败，请稍后重试";
pub const SUBSCRIBED: &str = "订阅成功！首期日报已发送到你的邮箱。";
pub const MISSING_EMAIL: &str = "缺少邮箱参数";
pub const UNSUBSCRIBE_FAILED: &str = "取消订阅失败";
pub const UNSUBSCRIBED: &str = "已成功取消订阅";

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

/// Trim, validate and lower-case an address
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim();
    email_pattern()
        .is_some_and(|pattern| pattern.is_match(email))
        .then(|| email.to_lowercase())
}

/// Result of a successful subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeOutcome {
    pub email: String,
    /// True when an unsubscribed row was reactivated
    pub reactivated: bool,
    pub featured_product: Option<DigestProduct>,
    pub other_products_count: usize,
    /// Whether the first digest was delivered
    pub welcome_sent: bool,
}

pub struct SubscriptionService {
    store: Arc<dyn ContentStore>,
    digest: Arc<DigestSender>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn ContentStore>, digest: Arc<DigestSender>) -> Self {
        Self { store, digest }
    }

    pub async fn subscribe(&self, raw_email: &str) -> Result<SubscribeOutcome> {
        let email = normalize_email(raw_email).ok_or_else(|| AppError::Validation {
            message: INVALID_EMAIL.to_string(),
            field: Some("email".to_string()),
        })?;

        let reactivated = match self.store.find_subscriber_by_email(&email).await? {
            Some(existing) if existing.is_active() => {
                metrics::record_subscription("subscribe", false);
                return Err(AppError::AlreadySubscribed { email });
            }
            Some(existing) => {
                self.store.reactivate_subscriber(existing.id).await?;
                true
            }
            None => {
                self.store
                    .insert_subscriber(&email)
                    .await
                    .map_err(|e| AppError::operation(SUBSCRIBE_FAILED, e))?;
                false
            }
        };

        let action = if reactivated { "resubscribe" } else { "subscribe" };
        metrics::record_subscription(action, true);
        info!(email = %email, reactivated, "Subscriber active");

        let selection = self.digest.select().await.unwrap_or_else(|e| {
            warn!(error = %e, "Digest selection failed, subscribing without first digest");
            DigestSelection::default()
        });

        let welcome_sent = match self.digest.send_welcome(&email, &selection).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(email = %email, error = %e, "Welcome digest failed");
                false
            }
        };

        Ok(SubscribeOutcome {
            email,
            reactivated,
            other_products_count: selection.others.len(),
            featured_product: selection.featured,
            welcome_sent,
        })
    }

    /// Mark the address unsubscribed. Unknown addresses succeed too.
    pub async fn unsubscribe(&self, raw_email: Option<&str>) -> Result<()> {
        let email = raw_email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::MissingField {
                field: "email".to_string(),
                message: MISSING_EMAIL.to_string(),
            })?
            .to_lowercase();

        let rows = self
            .store
            .mark_unsubscribed(&email)
            .await
            .map_err(|e| AppError::operation(UNSUBSCRIBE_FAILED, e));

        metrics::record_subscription("unsubscribe", rows.is_ok());
        let rows = rows?;

        info!(email = %email, rows, "Unsubscribed");
        Ok(())
    }
}
