//! Store traits
//!
//! Services depend on these instead of the concrete [`Repository`](super::Repository)
//! so the digest, subscription and ingestion logic can run against an
//! in-memory store in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{Product, ProductStatus, SourceArticle, Subscriber};
use crate::errors::Result;

/// Fields of a product created by ingestion. New products start as drafts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub slug: String,
    pub name: String,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub screenshot_url: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub ai_analysis: Option<serde_json::Value>,
}

/// Deep-dive fields written in one row update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepDiveUpdate {
    pub podcast_audio_url: String,
    pub podcast_transcript: String,
    pub podcast_duration: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSourceArticle {
    pub product_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub source_name: Option<String>,
    pub key_insight: Option<String>,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// All products, newest first, optionally filtered by status
    async fn list_products(&self, status: Option<ProductStatus>) -> Result<Vec<Product>>;

    /// Products in one category, newest first
    async fn products_by_category(&self, category: &str) -> Result<Vec<Product>>;

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>>;

    /// Distinct non-null categories
    async fn list_categories(&self) -> Result<Vec<String>>;

    /// Products whose name, tagline or description contains `query`, case-insensitive
    async fn search_products(&self, query: &str) -> Result<Vec<Product>>;

    /// Products with a generated deep dive, newest first
    async fn deep_dive_products(&self) -> Result<Vec<Product>>;

    /// Most recently updated published product with a deep dive
    async fn featured_deep_dive_product(&self) -> Result<Option<Product>>;

    /// Newest published products
    async fn recent_published_products(&self, limit: u64) -> Result<Vec<Product>>;

    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    /// Write the podcast fields and set `has_deep_dive`
    async fn update_deep_dive(&self, slug: &str, update: DeepDiveUpdate) -> Result<()>;

    async fn update_category(&self, id: Uuid, category: &str) -> Result<()>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn find_subscriber_by_email(&self, email: &str) -> Result<Option<Subscriber>>;

    /// Insert an active subscriber
    async fn insert_subscriber(&self, email: &str) -> Result<Subscriber>;

    /// Flip an existing row back to active and restart its subscription date
    async fn reactivate_subscriber(&self, id: Uuid) -> Result<()>;

    /// Mark the matching address unsubscribed, returning affected rows
    async fn mark_unsubscribed(&self, email: &str) -> Result<u64>;

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>>;
}

#[async_trait]
pub trait SourceArticleStore: Send + Sync {
    async fn insert_source_article(&self, article: NewSourceArticle) -> Result<SourceArticle>;

    /// Articles for a product in insertion order
    async fn source_articles_for(&self, product_id: Uuid) -> Result<Vec<SourceArticle>>;
}

/// Everything a service needs from the content store
#[async_trait]
pub trait ContentStore: ProductStore + SubscriberStore + SourceArticleStore {
    async fn ping(&self) -> Result<()>;
}
