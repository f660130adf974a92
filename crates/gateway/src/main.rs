//! Srcent API Gateway
//!
//! The HTTP entry point of the site backend.
//! Handles:
//! - Daily digest triggers (scheduler and manual)
//! - Newsletter subscribe / unsubscribe
//! - Read-only catalog endpoints for the directory and deep-dive pages
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use srcent_common::{
    config::AppConfig,
    db::{ContentStore, DbPool, Repository},
    digest::DigestSender,
    mail::{EmailRenderer, Mailer, ResendMailer},
    metrics,
    subscription::SubscriptionService,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ContentStore>,
    pub digest: Arc<DigestSender>,
    pub subscriptions: Arc<SubscriptionService>,
}

impl AppState {
    /// Wire the services over a store and an optional mail provider
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn ContentStore>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> anyhow::Result<Self> {
        let renderer = Arc::new(
            EmailRenderer::new(config.site.clone()).context("failed to load email templates")?,
        );

        let digest = Arc::new(DigestSender::new(
            store.clone(),
            mailer,
            renderer,
            config.mail.from.clone(),
            config.digest.clone(),
        ));

        let subscriptions = Arc::new(SubscriptionService::new(store.clone(), digest.clone()));

        Ok(Self {
            config,
            store,
            digest,
            subscriptions,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);

    // Initialize tracing
    telemetry::init_tracing(&config.observability);

    info!("Starting Srcent API Gateway v{}", srcent_common::VERSION);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }

    // Initialize database connection
    let pool = DbPool::new(&config.database).await?;
    let store: Arc<dyn ContentStore> = Arc::new(Repository::new(pool));

    let mailer = ResendMailer::from_config(&config.mail)?.map(|m| Arc::new(m) as Arc<dyn Mailer>);
    if mailer.is_none() {
        warn!("Mail provider not configured; digests will be skipped");
    }

    let state = AppState::new(config.clone(), store, mailer)?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_llm_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::LLM_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Public write endpoints, rate limited
    let mut public_writes = Router::new()
        .route("/api/subscribe", post(handlers::subscription::subscribe))
        .route(
            "/api/unsubscribe",
            get(handlers::subscription::unsubscribe_link)
                .post(handlers::subscription::unsubscribe),
        );

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = create_rate_limiter(limits.requests_per_second, limits.burst);
        public_writes = public_writes.route_layer(from_fn_with_state(limiter, rate_limit));
    }

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Digest triggers
        .route(
            "/api/cron/daily-digest",
            get(handlers::digest::scheduled).post(handlers::digest::manual),
        )

        // Catalog endpoints
        .route("/api/products", get(handlers::products::directory))
        .route("/api/products/{slug}", get(handlers::products::product))
        .route("/api/products/{slug}/deep-dive", get(handlers::products::deep_dive))
        .route("/api/categories", get(handlers::products::categories))
        .route("/api/deep-dives", get(handlers::products::deep_dives))

        .merge(public_writes)
        .layer(from_fn(middleware::metrics::track_requests))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use srcent_common::db::models::ProductStatus;
    use srcent_common::testing::{sample_product, InMemoryStore, RecordingMailer};
    use tower::ServiceExt;

    struct Harness {
        store: Arc<InMemoryStore>,
        mailer: Arc<RecordingMailer>,
        app: Router,
    }

    fn harness_with(config: AppConfig) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let mut featured = sample_product("cursor", ProductStatus::Published);
        featured.has_deep_dive = Some(true);
        featured.podcast_transcript = Some("# Cursor\n## 开场暴击\n正文".to_string());
        featured.podcast_audio_url = Some("https://cdn.example.com/cursor.mp3".to_string());
        featured.podcast_duration = Some(300);
        store.put_product(featured);
        store.put_product(sample_product("kimi", ProductStatus::Published));
        store.put_product(sample_product("draft-tool", ProductStatus::Draft));

        let mailer = Arc::new(RecordingMailer::new());
        let state = AppState::new(
            Arc::new(config),
            store.clone(),
            Some(mailer.clone() as Arc<dyn Mailer>),
        )
        .unwrap();

        Harness {
            store,
            mailer,
            app: create_router(state),
        }
    }

    fn harness() -> Harness {
        harness_with(AppConfig::default())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = send(&h.app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&h.app, get_req("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["store"]["reachable"], true);
        assert_eq!(body["features"]["mail"], true);
    }

    #[tokio::test]
    async fn test_cron_requires_bearer_when_secret_set() {
        let mut config = AppConfig::default();
        config.auth.cron_secret = Some("s3cret".to_string());
        let h = harness_with(config);

        let (status, body) = send(&h.app, get_req("/api/cron/daily-digest")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let request = Request::get("/api/cron/daily-digest")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "没有活跃订阅者");
        assert_eq!(body["sent"], 0);
    }

    #[tokio::test]
    async fn test_cron_sends_to_active_subscribers() {
        let h = harness();
        h.store.put_subscriber("a@example.com");
        h.store.put_subscriber("b@example.com");

        let (status, body) = send(&h.app, get_req("/api/cron/daily-digest")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "日报发送完成");
        assert_eq!(body["sent"], 2);
        assert_eq!(body["failed"], 0);
        assert_eq!(body["total"], 2);
        assert_eq!(h.mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_cron_store_failure_is_500() {
        let h = harness();
        h.store.set_failing(true);

        let (status, body) = send(&h.app, get_req("/api/cron/daily-digest")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "获取订阅者失败");
    }

    #[tokio::test]
    async fn test_manual_trigger_requires_admin_key() {
        let h = harness();
        let (status, _) = send(
            &h.app,
            Request::post("/api/cron/daily-digest?key=anything").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut config = AppConfig::default();
        config.auth.admin_api_key = Some("admin".to_string());
        let h = harness_with(config);
        let (status, body) = send(
            &h.app,
            Request::post("/api/cron/daily-digest?key=admin").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_manual_trigger_also_requires_cron_bearer() {
        let mut config = AppConfig::default();
        config.auth.admin_api_key = Some("admin".to_string());
        config.auth.cron_secret = Some("s3cret".to_string());
        let h = harness_with(config);

        let (status, body) = send(
            &h.app,
            Request::post("/api/cron/daily-digest?key=admin").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
        assert!(h.mailer.sent().is_empty());

        let request = Request::post("/api/cron/daily-digest?key=admin")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_subscribe_flow() {
        let h = harness();

        let (status, body) =
            send(&h.app, post_json("/api/subscribe", json!({ "email": "New@Example.com" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "订阅成功！首期日报已发送到你的邮箱。");
        assert_eq!(body["featuredProduct"]["slug"], "cursor");
        assert_eq!(body["otherProductsCount"], 1);
        assert!(h.store.subscriber("new@example.com").is_some());

        let (status, body) =
            send(&h.app, post_json("/api/subscribe", json!({ "email": "new@example.com" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "该邮箱已订阅");
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_input() {
        let h = harness();

        for body in [json!({ "email": "nope" }), json!({}), json!({ "email": 42 })] {
            let (status, body) = send(&h.app, post_json("/api/subscribe", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "请输入有效的邮箱地址");
        }
        assert!(h.store.subscribers().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_link_redirects() {
        let h = harness();
        h.store.put_subscriber("reader@example.com");

        let response = h
            .app
            .clone()
            .oneshot(get_req("/api/unsubscribe?email=Reader%40example.com"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://srcent.top/unsubscribe/success"
        );
        assert!(!h.store.subscriber("reader@example.com").unwrap().is_active());
    }

    #[tokio::test]
    async fn test_unsubscribe_requires_email() {
        let h = harness();

        let (status, body) = send(&h.app, get_req("/api/unsubscribe")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "缺少邮箱参数");

        let (status, body) = send(&h.app, post_json("/api/unsubscribe", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "缺少邮箱参数");

        let (status, body) = send(
            &h.app,
            post_json("/api/unsubscribe", json!({ "email": "unknown@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "已成功取消订阅");
    }

    #[tokio::test]
    async fn test_subscribe_is_rate_limited() {
        let mut config = AppConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let h = harness_with(config);

        let (first, _) =
            send(&h.app, post_json("/api/subscribe", json!({ "email": "a@example.com" }))).await;
        let (second, _) =
            send(&h.app, post_json("/api/subscribe", json!({ "email": "b@example.com" }))).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);

        // Read endpoints are not limited
        let (status, _) = send(&h.app, get_req("/api/categories")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_directory_shuffle_is_stable_per_seed() {
        let h = harness();

        let slugs = |body: &Value| -> Vec<String> {
            body["products"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p["slug"].as_str().unwrap().to_string())
                .collect()
        };

        let (_, first) = send(&h.app, get_req("/api/products?seed=12345")).await;
        let (_, second) = send(&h.app, get_req("/api/products?seed=12345")).await;

        assert_eq!(first["seed"], 12345);
        assert_eq!(first["total"], 3);
        assert_eq!(slugs(&first), slugs(&second));

        let (_, published) = send(&h.app, get_req("/api/products?status=published&seed=1")).await;
        assert_eq!(published["total"], 2);

        let (_, found) = send(&h.app, get_req("/api/products?q=KIMI")).await;
        assert_eq!(slugs(&found), vec!["kimi"]);

        let (status, _) = send(&h.app, get_req("/api/products?status=bogus")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_product_detail_and_deep_dive() {
        let h = harness();

        let (status, body) = send(&h.app, get_req("/api/products/cursor")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "cursor");

        let (status, _) = send(&h.app, get_req("/api/products/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&h.app, get_req("/api/products/cursor/deep-dive")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], true);
        assert_eq!(body["duration_secs"], 300);
        assert_eq!(body["transcript"][0], json!({ "type": "heading", "level": 1, "text": "Cursor" }));

        let (_, body) = send(&h.app, get_req("/api/products/kimi/deep-dive")).await;
        assert_eq!(body["available"], false);
        assert_eq!(body["transcript"], json!([]));

        let (_, body) = send(&h.app, get_req("/api/deep-dives")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }
}
