//! Liveness and readiness probes

use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub store: StoreProbe,
    pub features: Features,
}

#[derive(Serialize)]
pub struct StoreProbe {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Optional integrations; none of them gate readiness
#[derive(Serialize)]
pub struct Features {
    pub mail: bool,
    pub cron_auth: bool,
    pub rate_limit: bool,
}

pub async fn health() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        version: srcent_common::VERSION,
    })
}

/// Ready once the content store answers a ping
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let start = Instant::now();
    let store = match state.store.ping().await {
        Ok(()) => StoreProbe {
            reachable: true,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => StoreProbe {
            reachable: false,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    let features = Features {
        mail: state.digest.mail_enabled(),
        cron_auth: state.config.auth.cron_secret.is_some(),
        rate_limit: state.config.rate_limit.enabled,
    };

    let (code, status) = if store.reachable {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (code, Json(Readiness { status, store, features }))
}
