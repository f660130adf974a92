//! Catalog handlers backing the directory, product and deep-dive pages

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use srcent_common::{
    catalog::{render_transcript, seeded_shuffle, CategoryInfo, TranscriptBlock, SITE_CATEGORIES},
    db::models::{Product, ProductStatus, SourceArticle},
    errors::{AppError, Result},
};

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub status: Option<String>,
    /// Shuffle seed; a fresh one is drawn when absent
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct DirectoryResponse {
    pub products: Vec<Product>,
    pub total: usize,
    pub seed: u64,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    /// Categories in use
    pub categories: Vec<String>,
    /// The full site taxonomy with display labels
    pub taxonomy: &'static [CategoryInfo],
}

#[derive(Debug, Serialize)]
pub struct DeepDiveResponse {
    pub product: Product,
    pub available: bool,
    pub audio_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub transcript: Vec<TranscriptBlock>,
    pub sources: Vec<SourceArticle>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// GET /api/products
pub async fn directory(
    State(state): State<AppState>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<DirectoryResponse>> {
    let status = match non_empty(&query.status) {
        Some(raw) => Some(ProductStatus::parse(raw).ok_or_else(|| AppError::InvalidFormat {
            message: format!("unknown status '{}'", raw),
        })?),
        None => None,
    };
    let category = non_empty(&query.category);

    let mut products = match (non_empty(&query.q), category) {
        (Some(q), _) => state.store.search_products(q).await?,
        (None, Some(category)) => state.store.products_by_category(category).await?,
        (None, None) => state.store.list_products(status).await?,
    };

    products.retain(|p| {
        category.map_or(true, |c| p.category.as_deref() == Some(c))
            && status.map_or(true, |s| p.status == s.as_str())
    });

    let seed = query
        .seed
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().unsigned_abs());
    seeded_shuffle(&mut products, seed);

    Ok(Json(DirectoryResponse {
        total: products.len(),
        products,
        seed,
    }))
}

/// GET /api/categories
pub async fn categories(State(state): State<AppState>) -> Result<Json<CategoriesResponse>> {
    Ok(Json(CategoriesResponse {
        categories: state.store.list_categories().await?,
        taxonomy: SITE_CATEGORIES,
    }))
}

async fn find_product(state: &AppState, slug: &str) -> Result<Product> {
    state
        .store
        .find_product_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::ProductNotFound { slug: slug.to_string() })
}

/// GET /api/products/{slug}
pub async fn product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>> {
    Ok(Json(find_product(&state, &slug).await?))
}

/// GET /api/products/{slug}/deep-dive
pub async fn deep_dive(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<DeepDiveResponse>> {
    let product = find_product(&state, &slug).await?;
    let available = product.has_deep_dive();

    let sources = if available {
        state.store.source_articles_for(product.id).await?
    } else {
        Vec::new()
    };

    let transcript = product
        .podcast_transcript
        .as_deref()
        .filter(|_| available)
        .map(render_transcript)
        .unwrap_or_default();

    Ok(Json(DeepDiveResponse {
        available,
        audio_url: product.podcast_audio_url.clone().filter(|_| available),
        duration_secs: product.podcast_duration.filter(|_| available),
        transcript,
        sources,
        product,
    }))
}

/// GET /api/deep-dives
pub async fn deep_dives(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.store.deep_dive_products().await?))
}
