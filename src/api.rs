//! HTTP webhook receiver.
//!
//! The synchronous face of SofIA: verifies each inbound event, extracts
//! the message, enqueues a task, and answers immediately. POST always
//! gets a fast 200 once the signature checks out — Meta disables webhooks
//! that answer slowly or with repeated errors, so internal failures are
//! logged, never surfaced as 5xx.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sofia_channels::{extract, signature};
use sofia_core::{
    config::{Config, WebhookConfig},
    message::{Platform, Task},
    traits::TaskQueue,
};
use sofia_knowledge::KnowledgeStore;
use sofia_providers::cache::ResponseCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Shared state for the receiver handlers.
#[derive(Clone)]
pub struct ApiState {
    webhook: WebhookConfig,
    production: bool,
    broker_url: String,
    queue: Arc<dyn TaskQueue>,
    cache: Arc<ResponseCache>,
    knowledge: Arc<KnowledgeStore>,
    uptime: Instant,
}

impl ApiState {
    pub fn new(
        config: &Config,
        queue: Arc<dyn TaskQueue>,
        cache: Arc<ResponseCache>,
        knowledge: Arc<KnowledgeStore>,
    ) -> Self {
        Self {
            webhook: config.webhook.clone(),
            production: config.sofia.production,
            broker_url: config.broker.url.clone(),
            queue,
            cache,
            knowledge,
            uptime: Instant::now(),
        }
    }

    /// Verification token for a platform. Facebook and Instagram share
    /// one token, the way the Meta API shares it.
    fn verify_token(&self, platform: Platform) -> &str {
        match platform {
            Platform::Whatsapp => &self.webhook.verify_token_whatsapp,
            Platform::Facebook | Platform::Instagram => &self.webhook.verify_token_facebook,
        }
    }

    fn app_secret(&self, platform: Platform) -> &str {
        match platform {
            Platform::Whatsapp => &self.webhook.app_secret_whatsapp,
            Platform::Facebook | Platform::Instagram => &self.webhook.app_secret_facebook,
        }
    }
}

/// Constant-time string comparison to prevent timing attacks on token
/// validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// `GET /` — liveness probe.
async fn home() -> &'static str {
    "SofIA Multiplataforma da Dinâmica Sports está online!"
}

/// `GET /status` — queue/broker connectivity and worker presence.
async fn status(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "service": "webhook-receiver",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "queue": {
            "broker": if state.broker_url.is_empty() { "in-process" } else { state.broker_url.as_str() },
            "worker_attached": state.queue.is_open(),
        },
        "knowledge_degraded": state.knowledge.is_degraded(),
        "cache_entries": state.cache.len(),
    }))
}

/// `GET /webhook/{platform}` — Meta's ownership handshake: echo
/// `hub.challenge` iff the mode is `subscribe` and the token matches.
async fn webhook_verify(
    Path(platform): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<ApiState>,
) -> Response {
    let Ok(platform) = platform.parse::<Platform>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mode = params.get("hub.mode").cloned().unwrap_or_default();
    let token = params.get("hub.verify_token").cloned().unwrap_or_default();
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
    let expected = state.verify_token(platform);

    if mode == "subscribe" && !expected.is_empty() && constant_time_eq(&token, expected) {
        info!("webhook {platform} verified");
        return (StatusCode::OK, challenge).into_response();
    }

    warn!("webhook {platform} verification failed");
    (StatusCode::FORBIDDEN, "Token inválido").into_response()
}

/// `POST /webhook/{platform}` — receive an event, enqueue the work,
/// answer fast.
async fn webhook_event(
    Path(platform): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(platform) = platform.parse::<Platform>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let signature_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());
    if !signature::verify(
        &body,
        signature_header,
        state.app_secret(platform),
        state.production,
    ) {
        warn!("webhook {platform}: invalid signature, rejecting");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "invalid signature"})),
        )
            .into_response();
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));

    if let Some(message) = extract::extract(&payload, platform) {
        let task = Task::new(platform, message.sender_id, message.text);
        match state.queue.enqueue(&task).await {
            Ok(()) => info!(
                "webhook {platform}: task {} enqueued for {}",
                task.id, task.sender_id
            ),
            // The platform must still see a 200 — a retry storm from
            // Meta would only make a full queue worse.
            Err(e) => error!("webhook {platform}: enqueue failed, dropping event: {e}"),
        }
    }

    (StatusCode::OK, "OK").into_response()
}

/// `POST /admin/reload` — operator maintenance: clear the response cache
/// and re-read the knowledge document. Disabled unless an admin key is
/// configured.
async fn admin_reload(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if state.webhook.admin_key.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token, &state.webhook.admin_key));
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid token"})),
        )
            .into_response();
    }

    state.cache.clear();
    state.knowledge.reload();
    info!("admin: cache cleared, knowledge reloaded");
    (
        StatusCode::OK,
        Json(json!({
            "status": "reloaded",
            "knowledge_degraded": state.knowledge.is_degraded(),
        })),
    )
        .into_response()
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/status", get(status))
        .route("/webhook/{platform}", get(webhook_verify).post(webhook_event))
        .route("/admin/reload", post(admin_reload))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Start the receiver. Returns when the listener fails or the server
/// stops.
pub async fn serve(state: ApiState, host: String, port: u16) {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("receiver failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("webhook receiver listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("receiver error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{decode_task, InMemoryQueue};
    use axum::body::Body;
    use axum::http::Request;
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use sha2::Sha256;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.webhook.verify_token_whatsapp = "vt-wa".into();
        config.webhook.verify_token_facebook = "vt-fb".into();
        config.webhook.app_secret_whatsapp = "as-wa".into();
        config.webhook.app_secret_facebook = "as-fb".into();
        config
    }

    fn test_app(config: Config) -> (Router, mpsc::Receiver<String>, Arc<ResponseCache>) {
        let (queue, rx) = InMemoryQueue::channel(8);
        let cache = Arc::new(ResponseCache::new(8));
        let knowledge = Arc::new(KnowledgeStore::load("/nonexistent/knowledge.json"));
        let state = ApiState::new(&config, Arc::new(queue), cache.clone(), knowledge);
        (build_router(state), rx, cache)
    }

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_post(path: &str, body: &str, secret: &str) -> Request<Body> {
        Request::post(path)
            .header("Content-Type", "application/json")
            .header("X-Hub-Signature-256", sign(body.as_bytes(), secret))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(resp: axum::http::Response<Body>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let (app, _rx, _cache) = test_app(test_config());
        let resp = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("online"));
    }

    #[tokio::test]
    async fn test_status_reports_queue_and_worker() {
        let (app, _rx, _cache) = test_app(test_config());
        let resp = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["status"], "online");
        assert_eq!(json["queue"]["broker"], "in-process");
        assert_eq!(json["queue"]["worker_attached"], true);
        assert_eq!(json["knowledge_degraded"], true);
    }

    #[tokio::test]
    async fn test_get_verification_echoes_challenge() {
        let (app, _rx, _cache) = test_app(test_config());
        let resp = app
            .oneshot(
                Request::get(
                    "/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=vt-wa&hub.challenge=1158201444",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "1158201444");
    }

    #[tokio::test]
    async fn test_get_verification_rejects_wrong_token() {
        let (app, _rx, _cache) = test_app(test_config());
        let resp = app
            .oneshot(
                Request::get(
                    "/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=errado&hub.challenge=1",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_get_verification_rejects_wrong_mode() {
        let (app, _rx, _cache) = test_app(test_config());
        let resp = app
            .oneshot(
                Request::get(
                    "/webhook/whatsapp?hub.mode=unsubscribe&hub.verify_token=vt-wa&hub.challenge=1",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_facebook_and_instagram_share_verify_token() {
        let (app, _rx, _cache) = test_app(test_config());
        for platform in ["facebook", "instagram"] {
            let resp = app
                .clone()
                .oneshot(
                    Request::get(format!(
                        "/webhook/{platform}?hub.mode=subscribe&hub.verify_token=vt-fb&hub.challenge=42"
                    ))
                    .body(Body::empty())
                    .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_string(resp).await, "42");
        }
    }

    #[tokio::test]
    async fn test_unknown_platform_is_404() {
        let (app, _rx, _cache) = test_app(test_config());
        let resp = app
            .oneshot(
                Request::get("/webhook/telegram?hub.mode=subscribe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_valid_message_enqueues_task() {
        let (app, mut rx, _cache) = test_app(test_config());
        let body = r#"{"entry":[{"changes":[{"value":{"messages":[{"from":"5584999990000","type":"text","text":{"body":"qual o horário?"}}]}}]}]}"#;
        let resp = app
            .oneshot(signed_post("/webhook/whatsapp", body, "as-wa"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "OK");

        let task = decode_task(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(task.platform, Platform::Whatsapp);
        assert_eq!(task.sender_id, "5584999990000");
        assert_eq!(task.text, "qual o horário?");
    }

    #[tokio::test]
    async fn test_post_statuses_only_is_ok_but_enqueues_nothing() {
        let (app, mut rx, _cache) = test_app(test_config());
        let body = r#"{"entry":[{"changes":[{"value":{"statuses":[{"status":"read"}]}}]}]}"#;
        let resp = app
            .oneshot(signed_post("/webhook/whatsapp", body, "as-wa"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "OK");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_post_invalid_signature_is_403() {
        let (app, mut rx, _cache) = test_app(test_config());
        let body = r#"{"entry":[]}"#;
        let resp = app
            .oneshot(signed_post("/webhook/whatsapp", body, "segredo-errado"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert!(json["error"].is_string());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_post_garbage_body_still_answers_ok() {
        let (app, _rx, _cache) = test_app(test_config());
        let body = "not json at all";
        let resp = app
            .oneshot(signed_post("/webhook/whatsapp", body, "as-wa"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "OK");
    }

    #[tokio::test]
    async fn test_missing_secret_allows_unverified_outside_production() {
        let mut config = test_config();
        config.webhook.app_secret_whatsapp.clear();
        let (app, _rx, _cache) = test_app(config);
        let resp = app
            .oneshot(
                Request::post("/webhook/whatsapp")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"entry":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_secret_fails_closed_in_production() {
        let mut config = test_config();
        config.webhook.app_secret_whatsapp.clear();
        config.sofia.production = true;
        let (app, _rx, _cache) = test_app(config);
        let resp = app
            .oneshot(
                Request::post("/webhook/whatsapp")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"entry":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_reload_disabled_without_key() {
        let (app, _rx, _cache) = test_app(test_config());
        let resp = app
            .oneshot(Request::post("/admin/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_reload_requires_bearer_token() {
        let mut config = test_config();
        config.webhook.admin_key = "chave-admin".into();
        let (app, _rx, _cache) = test_app(config);

        let resp = app
            .clone()
            .oneshot(
                Request::post("/admin/reload")
                    .header("Authorization", "Bearer errada")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(
                Request::post("/admin/reload")
                    .header("Authorization", "Bearer chave-admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_reload_clears_cache() {
        let mut config = test_config();
        config.webhook.admin_key = "chave-admin".into();
        let (app, _rx, cache) = test_app(config);

        cache
            .get_or_generate("k", || async { Ok("v".to_string()) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        let resp = app
            .oneshot(
                Request::post("/admin/reload")
                    .header("Authorization", "Bearer chave-admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(cache.is_empty());
    }
}
