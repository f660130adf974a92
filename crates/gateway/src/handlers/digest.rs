//! Daily digest triggers

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use srcent_common::{
    auth,
    digest::DIGEST_FAILED,
    errors::{AppError, Result},
};

/// Digest run summary
#[derive(Debug, Serialize)]
pub struct DigestResponse {
    pub success: bool,
    pub message: String,
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct ManualTriggerQuery {
    pub key: Option<String>,
}

fn verify_cron(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    auth::verify_bearer(header, state.config.auth.cron_secret.as_deref())
}

/// Scheduled run, authenticated with the cron bearer secret
pub async fn scheduled(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DigestResponse>> {
    verify_cron(&state, &headers)?;
    run(&state).await
}

/// Manual run: the admin key, then the same bearer check as the scheduled run
pub async fn manual(
    State(state): State<AppState>,
    Query(query): Query<ManualTriggerQuery>,
    headers: HeaderMap,
) -> Result<Json<DigestResponse>> {
    auth::verify_admin_key(
        query.key.as_deref(),
        state.config.auth.admin_api_key.as_deref(),
    )?;
    verify_cron(&state, &headers)?;

    run(&state).await
}

async fn run(state: &AppState) -> Result<Json<DigestResponse>> {
    let report = state.digest.send_daily_digest().await.map_err(|e| match e {
        AppError::Operation { .. } => e,
        other => AppError::operation(DIGEST_FAILED, other),
    })?;

    Ok(Json(DigestResponse {
        success: true,
        message: report.message,
        sent: report.sent,
        failed: report.failed,
        total: report.total,
    }))
}
