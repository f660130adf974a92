//! Repository pattern for database operations
//!
//! SeaORM implementation of the store traits.

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::store::{
    ContentStore, DeepDiveUpdate, NewProduct, NewSourceArticle, ProductStore,
    SourceArticleStore, SubscriberStore,
};
use crate::db::DbPool;
use crate::errors::{AppError, Result};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }
}

/// Substring pattern for `LIKE ... ESCAPE '\'`; wildcards in the query
/// match literally
fn like_pattern(query: &str) -> String {
    let mut pattern = String::from("%");
    for c in query.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// ========================================================================
// Product Operations
// ========================================================================

#[async_trait]
impl ProductStore for Repository {
    async fn list_products(&self, status: Option<ProductStatus>) -> Result<Vec<Product>> {
        let mut query = ProductEntity::find().order_by_desc(ProductColumn::CreatedAt);

        if let Some(status) = status {
            query = query.filter(ProductColumn::Status.eq(status.as_str()));
        }

        query.all(self.conn()).await.map_err(Into::into)
    }

    async fn products_by_category(&self, category: &str) -> Result<Vec<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::Category.eq(category))
            .order_by_desc(ProductColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::Slug.eq(slug))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        let categories: Vec<Option<String>> = ProductEntity::find()
            .select_only()
            .column(ProductColumn::Category)
            .filter(ProductColumn::Category.is_not_null())
            .distinct()
            .order_by_asc(ProductColumn::Category)
            .into_tuple()
            .all(self.conn())
            .await?;

        Ok(categories
            .into_iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .collect())
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        let pattern = like_pattern(query);
        let lower_like = |column: ProductColumn| {
            Expr::expr(Func::lower(Expr::col(column)))
                .like(LikeExpr::new(pattern.as_str()).escape('\\'))
        };

        ProductEntity::find()
            .filter(
                Condition::any()
                    .add(lower_like(ProductColumn::Name))
                    .add(lower_like(ProductColumn::Tagline))
                    .add(lower_like(ProductColumn::Description)),
            )
            .order_by_desc(ProductColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn deep_dive_products(&self) -> Result<Vec<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::HasDeepDive.eq(true))
            .order_by_desc(ProductColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn featured_deep_dive_product(&self) -> Result<Option<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::HasDeepDive.eq(true))
            .filter(ProductColumn::Status.eq(ProductStatus::Published.as_str()))
            .order_by_desc(ProductColumn::UpdatedAt)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn recent_published_products(&self, limit: u64) -> Result<Vec<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::Status.eq(ProductStatus::Published.as_str()))
            .order_by_desc(ProductColumn::CreatedAt)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let now = chrono::Utc::now();

        let model = ProductActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(product.slug),
            name: Set(product.name),
            tagline: Set(product.tagline),
            description: Set(product.description),
            logo_url: Set(product.logo_url),
            website_url: Set(product.website_url),
            screenshot_url: Set(product.screenshot_url),
            category: Set(product.category),
            tags: Set(Some(product.tags)),
            ai_analysis: Set(product.ai_analysis),
            status: Set(ProductStatus::Draft.into()),
            podcast_audio_url: Set(None),
            podcast_transcript: Set(None),
            podcast_duration: Set(None),
            has_deep_dive: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        model.insert(self.conn()).await.map_err(Into::into)
    }

    async fn update_deep_dive(&self, slug: &str, update: DeepDiveUpdate) -> Result<()> {
        let now = chrono::Utc::now();

        let result = ProductEntity::update_many()
            .col_expr(ProductColumn::PodcastAudioUrl, Expr::value(update.podcast_audio_url))
            .col_expr(ProductColumn::PodcastTranscript, Expr::value(update.podcast_transcript))
            .col_expr(ProductColumn::PodcastDuration, Expr::value(update.podcast_duration))
            .col_expr(ProductColumn::HasDeepDive, Expr::value(true))
            .col_expr(ProductColumn::UpdatedAt, Expr::value(now))
            .filter(ProductColumn::Slug.eq(slug))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::ProductNotFound { slug: slug.to_string() });
        }

        Ok(())
    }

    async fn update_category(&self, id: Uuid, category: &str) -> Result<()> {
        let now = chrono::Utc::now();

        let result = ProductEntity::update_many()
            .col_expr(ProductColumn::Category, Expr::value(category))
            .col_expr(ProductColumn::UpdatedAt, Expr::value(now))
            .filter(ProductColumn::Id.eq(id))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound {
                resource_type: "product".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }
}

// ========================================================================
// Subscriber Operations
// ========================================================================

#[async_trait]
impl SubscriberStore for Repository {
    async fn find_subscriber_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        SubscriberEntity::find()
            .filter(SubscriberColumn::Email.eq(email))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_subscriber(&self, email: &str) -> Result<Subscriber> {
        let subscriber = SubscriberActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            status: Set(SubscriberStatus::Active.into()),
            subscribed_at: Set(chrono::Utc::now().into()),
            unsubscribed_at: Set(None),
        };

        subscriber.insert(self.conn()).await.map_err(Into::into)
    }

    async fn reactivate_subscriber(&self, id: Uuid) -> Result<()> {
        let now = chrono::Utc::now();

        SubscriberEntity::update_many()
            .col_expr(SubscriberColumn::Status, Expr::value(SubscriberStatus::Active.as_str()))
            .col_expr(SubscriberColumn::SubscribedAt, Expr::value(now))
            .col_expr(
                SubscriberColumn::UnsubscribedAt,
                Expr::value(Option::<chrono::DateTime<chrono::Utc>>::None),
            )
            .filter(SubscriberColumn::Id.eq(id))
            .exec(self.conn())
            .await?;

        Ok(())
    }

    async fn mark_unsubscribed(&self, email: &str) -> Result<u64> {
        let now = chrono::Utc::now();

        let result = SubscriberEntity::update_many()
            .col_expr(
                SubscriberColumn::Status,
                Expr::value(SubscriberStatus::Unsubscribed.as_str()),
            )
            .col_expr(SubscriberColumn::UnsubscribedAt, Expr::value(now))
            .filter(SubscriberColumn::Email.eq(email))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        SubscriberEntity::find()
            .filter(SubscriberColumn::Status.eq(SubscriberStatus::Active.as_str()))
            .order_by_asc(SubscriberColumn::SubscribedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }
}

// ========================================================================
// Source Article Operations
// ========================================================================

#[async_trait]
impl SourceArticleStore for Repository {
    async fn insert_source_article(&self, article: NewSourceArticle) -> Result<SourceArticle> {
        let model = SourceArticleActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(article.product_id),
            url: Set(article.url),
            title: Set(article.title),
            source_name: Set(article.source_name),
            key_insight: Set(article.key_insight),
            created_at: Set(chrono::Utc::now().into()),
        };

        model.insert(self.conn()).await.map_err(Into::into)
    }

    async fn source_articles_for(&self, product_id: Uuid) -> Result<Vec<SourceArticle>> {
        SourceArticleEntity::find()
            .filter(SourceArticleColumn::ProductId.eq(product_id))
            .order_by_asc(SourceArticleColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl ContentStore for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_is_trimmed_and_lowercased() {
        assert_eq!(like_pattern("  Cursor "), "%cursor%");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("_"), r"%\_%");
        assert_eq!(like_pattern("100%"), r"%100\%%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }
}
