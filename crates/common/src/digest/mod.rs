//! Daily digest
//!
//! Picks the products of the day and mails them to every active subscriber
//! in fixed-size batches. Recipients of one batch are sent concurrently;
//! batches run one after another with a fixed pause in between.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::DigestConfig;
use crate::db::models::Product;
use crate::db::{ContentStore, ProductStore};
use crate::errors::{AppError, Result};
use crate::mail::{daily_subject, welcome_subject, EmailRenderer, Mailer, OutgoingEmail};
use crate::metrics;

pub const NO_ACTIVE_SUBSCRIBERS: &str = "没有活跃订阅者";
pub const NO_PRODUCTS: &str = "没有可推送的产品";
pub const MAIL_NOT_CONFIGURED: &str = "未配置邮件服务";
pub const DIGEST_COMPLETE: &str = "日报发送完成";
pub const SUBSCRIBERS_UNAVAILABLE: &str = "获取订阅者失败";
pub const DIGEST_FAILED: &str = "日报发送失败";

/// The product fields shown in emails and in the subscribe response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestProduct {
    pub name: String,
    pub slug: String,
    pub tagline: Option<String>,
    pub category: Option<String>,
    pub logo_url: Option<String>,
    pub has_deep_dive: bool,
}

impl From<&Product> for DigestProduct {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            slug: product.slug.clone(),
            tagline: product.tagline.clone(),
            category: product.category.clone(),
            logo_url: product.logo_url.clone(),
            has_deep_dive: product.has_deep_dive(),
        }
    }
}

/// Featured product plus the other picks of the day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestSelection {
    pub featured: Option<DigestProduct>,
    pub others: Vec<DigestProduct>,
}

impl DigestSelection {
    pub fn is_empty(&self) -> bool {
        self.featured.is_none() && self.others.is_empty()
    }
}

/// Featured = latest-updated published deep dive. Others = newest published
/// products without the featured one, capped at `others_limit`.
pub async fn select_digest_products(
    store: &dyn ProductStore,
    config: &DigestConfig,
) -> Result<DigestSelection> {
    let featured = store.featured_deep_dive_product().await?;
    let recent = store.recent_published_products(config.recent_limit).await?;

    let featured_slug = featured.as_ref().map(|p| p.slug.as_str());
    let others = recent
        .iter()
        .filter(|p| Some(p.slug.as_str()) != featured_slug)
        .take(config.others_limit)
        .map(DigestProduct::from)
        .collect();

    Ok(DigestSelection {
        featured: featured.as_ref().map(DigestProduct::from),
        others,
    })
}

/// Outcome of one digest run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DigestReport {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    pub message: String,
    /// Recipients per batch, in send order
    #[serde(skip)]
    pub batches: Vec<usize>,
}

impl DigestReport {
    fn skipped(message: &str, total: usize) -> Self {
        Self {
            total,
            message: message.to_string(),
            ..Self::default()
        }
    }
}

/// Sends the daily digest and the one-off welcome digest
pub struct DigestSender {
    store: Arc<dyn ContentStore>,
    mailer: Option<Arc<dyn Mailer>>,
    renderer: Arc<EmailRenderer>,
    from: String,
    config: DigestConfig,
}

impl DigestSender {
    pub fn new(
        store: Arc<dyn ContentStore>,
        mailer: Option<Arc<dyn Mailer>>,
        renderer: Arc<EmailRenderer>,
        from: String,
        config: DigestConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            renderer,
            from,
            config,
        }
    }

    /// Whether a mail provider is configured
    pub fn mail_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    pub async fn select(&self) -> Result<DigestSelection> {
        select_digest_products(self.store.as_ref(), &self.config).await
    }

    /// Run the daily digest for all active subscribers
    pub async fn send_daily_digest(&self) -> Result<DigestReport> {
        let result = self.run_daily_digest().await;

        let outcome = match &result {
            Ok(report) if report.message == DIGEST_COMPLETE => "sent",
            Ok(_) => "skipped",
            Err(_) => "error",
        };
        metrics::record_digest_run(outcome);

        result
    }

    async fn run_daily_digest(&self) -> Result<DigestReport> {
        info!("Starting daily digest");

        let subscribers = self
            .store
            .active_subscribers()
            .await
            .map_err(|e| AppError::operation(SUBSCRIBERS_UNAVAILABLE, e))?;

        if subscribers.is_empty() {
            info!("No active subscribers");
            return Ok(DigestReport::skipped(NO_ACTIVE_SUBSCRIBERS, 0));
        }

        let total = subscribers.len();
        info!(subscribers = total, "Found active subscribers");

        let selection = self
            .select()
            .await
            .map_err(|e| AppError::operation(DIGEST_FAILED, e))?;

        if selection.is_empty() {
            info!("No products to send");
            return Ok(DigestReport::skipped(NO_PRODUCTS, total));
        }

        let Some(mailer) = self.mailer.as_deref() else {
            warn!("Mail provider not configured, skipping digest");
            return Ok(DigestReport::skipped(MAIL_NOT_CONFIGURED, total));
        };

        let (date, year) = self
            .renderer
            .today(Utc::now())
            .map_err(|e| AppError::operation(DIGEST_FAILED, e))?;
        let subject = daily_subject(&date);

        let mut report = DigestReport {
            total,
            message: DIGEST_COMPLETE.to_string(),
            ..DigestReport::default()
        };

        let batch_size = self.config.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);

        for (index, batch) in subscribers.chunks(batch_size).enumerate() {
            let sends = batch.iter().map(|subscriber| {
                self.send_one(mailer, &subscriber.email, &subject, &date, year, &selection)
            });

            for (email, result) in batch.iter().map(|s| &s.email).zip(join_all(sends).await) {
                match result {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        error!(email = %email, error = %e, "Digest delivery failed");
                        report.failed += 1;
                    }
                }
            }

            report.batches.push(batch.len());

            if index + 1 < batch_count {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
        }

        metrics::record_digest_emails("daily", report.sent, report.failed);
        info!(
            sent = report.sent,
            failed = report.failed,
            total = report.total,
            "Daily digest complete"
        );

        Ok(report)
    }

    /// Send the first digest to a new subscriber. Returns whether an email
    /// was attempted; delivery errors are returned to the caller.
    pub async fn send_welcome(&self, email: &str, selection: &DigestSelection) -> Result<bool> {
        let Some(mailer) = self.mailer.as_deref() else {
            return Ok(false);
        };

        if selection.is_empty() {
            return Ok(false);
        }

        let (date, year) = self.renderer.today(Utc::now())?;
        let result = self
            .send_one(mailer, email, &welcome_subject(&date), &date, year, selection)
            .await;

        let (sent, failed) = if result.is_ok() { (1, 0) } else { (0, 1) };
        metrics::record_digest_emails("welcome", sent, failed);

        result.map(|()| true)
    }

    async fn send_one(
        &self,
        mailer: &dyn Mailer,
        to: &str,
        subject: &str,
        date: &str,
        year: i32,
        selection: &DigestSelection,
    ) -> Result<()> {
        let body = self.renderer.render_digest(to, date, year, selection)?;

        let email = OutgoingEmail {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: body.html,
            text: body.text,
        };

        mailer.send(&email).await.map(|_| ())
    }
}
