//! In-memory test doubles
//!
//! Available to this crate's tests and, with the `testing` feature, to the
//! service crates' tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use uuid::Uuid;

use crate::db::models::{
    Product, ProductStatus, SourceArticle, Subscriber, SubscriberStatus,
};
use crate::db::{
    ContentStore, DeepDiveUpdate, NewProduct, NewSourceArticle, ProductStore,
    SourceArticleStore, SubscriberStore,
};
use crate::errors::{AppError, Result};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::mail::{Mailer, OutgoingEmail};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn epoch() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        .fixed_offset()
}

/// A published-or-not product with only the required fields set
pub fn sample_product(slug: &str, status: ProductStatus) -> Product {
    Product {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        name: slug.to_string(),
        tagline: Some(format!("{slug} tagline")),
        description: Some(format!("{slug} description")),
        logo_url: None,
        website_url: Some(format!("https://{slug}.example.com")),
        screenshot_url: None,
        category: Some("效率工具".to_string()),
        tags: Some(vec![]),
        ai_analysis: None,
        status: status.into(),
        podcast_audio_url: None,
        podcast_transcript: None,
        podcast_duration: None,
        has_deep_dive: None,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

/// Content store backed by vectors. Rows get strictly increasing timestamps
/// in insertion order so "newest first" is deterministic.
#[derive(Default)]
pub struct InMemoryStore {
    products: Mutex<Vec<Product>>,
    subscribers: Mutex<Vec<Subscriber>>,
    articles: Mutex<Vec<SourceArticle>>,
    clock: AtomicI64,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a database error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseConnection {
                message: "store unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn tick(&self) -> DateTime<FixedOffset> {
        let n = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        epoch() + Duration::seconds(n)
    }

    /// Insert a product as-is, stamping fresh timestamps
    pub fn put_product(&self, mut product: Product) -> Product {
        let now = self.tick();
        product.created_at = now;
        product.updated_at = now;
        lock(&self.products).push(product.clone());
        product
    }

    /// Insert an active subscriber
    pub fn put_subscriber(&self, email: &str) -> Subscriber {
        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            email: email.to_string(),
            status: SubscriberStatus::Active.into(),
            subscribed_at: self.tick(),
            unsubscribed_at: None,
        };
        lock(&self.subscribers).push(subscriber.clone());
        subscriber
    }

    pub fn products(&self) -> Vec<Product> {
        lock(&self.products).clone()
    }

    pub fn subscribers(&self) -> Vec<Subscriber> {
        lock(&self.subscribers).clone()
    }

    pub fn articles(&self) -> Vec<SourceArticle> {
        lock(&self.articles).clone()
    }

    pub fn product(&self, slug: &str) -> Option<Product> {
        lock(&self.products).iter().find(|p| p.slug == slug).cloned()
    }

    pub fn subscriber(&self, email: &str) -> Option<Subscriber> {
        lock(&self.subscribers).iter().find(|s| s.email == email).cloned()
    }

    fn newest_first(&self, keep: impl Fn(&Product) -> bool) -> Vec<Product> {
        let mut products: Vec<Product> =
            lock(&self.products).iter().filter(|p| keep(p)).cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        products
    }
}

fn contains_ci(field: &Option<String>, needle: &str) -> bool {
    field
        .as_deref()
        .is_some_and(|value| value.to_lowercase().contains(needle))
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn list_products(&self, status: Option<ProductStatus>) -> Result<Vec<Product>> {
        self.check()?;
        Ok(self.newest_first(|p| status.map_or(true, |s| p.status == s.as_str())))
    }

    async fn products_by_category(&self, category: &str) -> Result<Vec<Product>> {
        self.check()?;
        Ok(self.newest_first(|p| p.category.as_deref() == Some(category)))
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        self.check()?;
        Ok(self.product(slug))
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        self.check()?;
        let mut categories: Vec<String> = lock(&self.products)
            .iter()
            .filter_map(|p| p.category.clone())
            .filter(|c| !c.is_empty())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        categories.sort();
        Ok(categories)
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        self.check()?;
        let needle = query.trim().to_lowercase();
        Ok(self.newest_first(|p| {
            p.name.to_lowercase().contains(&needle)
                || contains_ci(&p.tagline, &needle)
                || contains_ci(&p.description, &needle)
        }))
    }

    async fn deep_dive_products(&self) -> Result<Vec<Product>> {
        self.check()?;
        Ok(self.newest_first(|p| p.has_deep_dive()))
    }

    async fn featured_deep_dive_product(&self) -> Result<Option<Product>> {
        self.check()?;
        Ok(lock(&self.products)
            .iter()
            .filter(|p| p.has_deep_dive() && p.is_published())
            .max_by_key(|p| p.updated_at)
            .cloned())
    }

    async fn recent_published_products(&self, limit: u64) -> Result<Vec<Product>> {
        self.check()?;
        let mut products = self.newest_first(|p| p.is_published());
        products.truncate(limit as usize);
        Ok(products)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        self.check()?;
        if self.product(&product.slug).is_some() {
            return Err(AppError::validation(format!(
                "duplicate key value violates unique constraint: slug {}",
                product.slug
            )));
        }

        let mut row = sample_product(&product.slug, ProductStatus::Draft);
        row.name = product.name;
        row.tagline = product.tagline;
        row.description = product.description;
        row.logo_url = product.logo_url;
        row.website_url = product.website_url;
        row.screenshot_url = product.screenshot_url;
        row.category = product.category;
        row.tags = Some(product.tags);
        row.ai_analysis = product.ai_analysis;

        Ok(self.put_product(row))
    }

    async fn update_deep_dive(&self, slug: &str, update: DeepDiveUpdate) -> Result<()> {
        self.check()?;
        let now = self.tick();
        let mut products = lock(&self.products);
        let product = products
            .iter_mut()
            .find(|p| p.slug == slug)
            .ok_or_else(|| AppError::ProductNotFound { slug: slug.to_string() })?;

        product.podcast_audio_url = Some(update.podcast_audio_url);
        product.podcast_transcript = Some(update.podcast_transcript);
        product.podcast_duration = Some(update.podcast_duration);
        product.has_deep_dive = Some(true);
        product.updated_at = now;
        Ok(())
    }

    async fn update_category(&self, id: Uuid, category: &str) -> Result<()> {
        self.check()?;
        let now = self.tick();
        let mut products = lock(&self.products);
        let product = products.iter_mut().find(|p| p.id == id).ok_or_else(|| {
            AppError::NotFound {
                resource_type: "product".to_string(),
                id: id.to_string(),
            }
        })?;

        product.category = Some(category.to_string());
        product.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for InMemoryStore {
    async fn find_subscriber_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        self.check()?;
        Ok(self.subscriber(email))
    }

    async fn insert_subscriber(&self, email: &str) -> Result<Subscriber> {
        self.check()?;
        if self.subscriber(email).is_some() {
            return Err(AppError::validation("duplicate subscriber email"));
        }
        Ok(self.put_subscriber(email))
    }

    async fn reactivate_subscriber(&self, id: Uuid) -> Result<()> {
        self.check()?;
        let now = self.tick();
        if let Some(subscriber) = lock(&self.subscribers).iter_mut().find(|s| s.id == id) {
            subscriber.status = SubscriberStatus::Active.into();
            subscriber.subscribed_at = now;
            subscriber.unsubscribed_at = None;
        }
        Ok(())
    }

    async fn mark_unsubscribed(&self, email: &str) -> Result<u64> {
        self.check()?;
        let now = self.tick();
        let mut rows = 0;
        for subscriber in lock(&self.subscribers).iter_mut().filter(|s| s.email == email) {
            subscriber.status = SubscriberStatus::Unsubscribed.into();
            subscriber.unsubscribed_at = Some(now);
            rows += 1;
        }
        Ok(rows)
    }

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        self.check()?;
        Ok(lock(&self.subscribers)
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SourceArticleStore for InMemoryStore {
    async fn insert_source_article(&self, article: NewSourceArticle) -> Result<SourceArticle> {
        self.check()?;
        let row = SourceArticle {
            id: Uuid::new_v4(),
            product_id: article.product_id,
            url: article.url,
            title: article.title,
            source_name: article.source_name,
            key_insight: article.key_insight,
            created_at: self.tick(),
        };
        lock(&self.articles).push(row.clone());
        Ok(row)
    }

    async fn source_articles_for(&self, product_id: Uuid) -> Result<Vec<SourceArticle>> {
        self.check()?;
        Ok(lock(&self.articles)
            .iter()
            .filter(|a| a.product_id == product_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

/// Mailer that records every message and fails for chosen recipients
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: HashSet<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::default(),
            failing: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Successfully delivered messages
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        if self.failing.contains(&email.to) {
            return Err(AppError::Mail {
                message: format!("rejected recipient {}", email.to),
            });
        }
        let mut sent = lock(&self.sent);
        sent.push(email.clone());
        Ok(format!("msg_{}", sent.len()))
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync;

/// Language model answering from a closure and recording requests
pub struct FnModel {
    respond: Arc<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FnModel {
    pub fn new(respond: impl Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Arc::new(respond),
            requests: Mutex::default(),
        }
    }

    /// Always answer with `content`
    pub fn fixed(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(move |_| Ok(content.clone()))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LanguageModel for FnModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let response = (self.respond)(&request);
        lock(&self.requests).push(request);
        response
    }

    fn model_name(&self) -> &str {
        "fn-model"
    }
}
