//! Subscribe and unsubscribe handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use srcent_common::{
    digest::DigestProduct,
    errors::{AppError, Result},
    subscription::{INVALID_EMAIL, SUBSCRIBED, UNSUBSCRIBED},
};

#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(length(min = 3, max = 320))]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
    pub featured_product: Option<DigestProduct>,
    pub other_products_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct EmailParam {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub message: String,
}

fn invalid_email() -> AppError {
    AppError::Validation {
        message: INVALID_EMAIL.to_string(),
        field: Some("email".to_string()),
    }
}

/// POST /api/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    body: std::result::Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<Json<SubscribeResponse>> {
    let Json(request) = body.map_err(|_| invalid_email())?;
    request.validate().map_err(|_| invalid_email())?;
    let email = request.email.ok_or_else(invalid_email)?;

    let outcome = state.subscriptions.subscribe(&email).await?;

    Ok(Json(SubscribeResponse {
        success: true,
        message: SUBSCRIBED.to_string(),
        featured_product: outcome.featured_product,
        other_products_count: outcome.other_products_count,
    }))
}

/// GET /api/unsubscribe?email= (one-click link from emails)
pub async fn unsubscribe_link(
    State(state): State<AppState>,
    Query(params): Query<EmailParam>,
) -> Result<Redirect> {
    state.subscriptions.unsubscribe(params.email.as_deref()).await?;

    let site = state.config.site.base_url.trim_end_matches('/');
    Ok(Redirect::temporary(&format!("{}/unsubscribe/success", site)))
}

/// POST /api/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    body: std::result::Result<Json<EmailParam>, JsonRejection>,
) -> Result<Json<UnsubscribeResponse>> {
    let email = body.ok().and_then(|Json(params)| params.email);
    state.subscriptions.unsubscribe(email.as_deref()).await?;

    Ok(Json(UnsubscribeResponse {
        success: true,
        message: UNSUBSCRIBED.to_string(),
    }))
}
