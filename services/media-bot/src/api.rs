//! HTTP ingress
//!
//! - `POST /v1/messages` hands an inbound chat message to the pipeline
//! - `GET /health` reports pool state (200 while open, 503 once closed)
//! - `GET /metrics` serves the Prometheus text exposition

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use browser_pool::AutomationResource;
use media_pipeline::{ChatRef, Processor};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tracing::{info, warn};

/// Shared application state accessible from all handlers
pub struct AppState<R: AutomationResource> {
    pub processor: Arc<Processor<R>>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

impl<R: AutomationResource> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            processor: self.processor.clone(),
            prometheus: self.prometheus.clone(),
            started_at: self.started_at,
        }
    }
}

/// An inbound chat message, one URL per line.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub account_id: i64,
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
}

/// Build the axum router with all routes and shared state.
pub fn build_router<R: AutomationResource>(state: AppState<R>, max_connections: usize) -> Router {
    Router::new()
        .route("/v1/messages", post(messages_handler::<R>))
        .route("/health", get(health_handler::<R>))
        .route("/metrics", get(metrics_handler::<R>))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Spawn one processing task per URL and answer immediately.
async fn messages_handler<R: AutomationResource>(
    State(state): State<AppState<R>>,
    Json(message): Json<InboundMessage>,
) -> Response {
    let request_id = format!("msg_{}", uuid::Uuid::new_v4().as_simple());

    if state.processor.pool().is_closed() {
        warn!(request_id, "message refused, pool is closed");
        crate::metrics::record_message("unavailable");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "service is shutting down");
    }

    let chat = ChatRef {
        chat_id: message.chat_id,
        message_id: message.message_id,
    };
    let handles = state
        .processor
        .handle_message(message.account_id, chat, &message.text);

    if handles.is_empty() {
        crate::metrics::record_message("no_urls");
        return error_response(StatusCode::BAD_REQUEST, "no URL found in message");
    }

    crate::metrics::record_message("accepted");
    info!(
        request_id,
        account_id = message.account_id,
        chat_id = message.chat_id,
        accepted = handles.len(),
        "message accepted"
    );
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "accepted": handles.len(),
            "request_id": request_id,
        })),
    )
        .into_response()
}

async fn health_handler<R: AutomationResource>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    let pool = state.processor.pool();
    let status_code = if pool.is_closed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let mut body = pool.health();
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "uptime_seconds".into(),
            state.started_at.elapsed().as_secs().into(),
        );
    }

    (
        status_code,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler<R: AutomationResource>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use browser_pool::{PoolConfig, ProxyDescriptor, ResourceFactory, ResourcePool};
    use media_adapter::AdapterRegistry;
    use media_pipeline::PipelineConfig;
    use quota::{FileQuotaStore, Plan, QuotaGuard};
    use tower::ServiceExt;

    use crate::messenger::FsMessenger;

    struct Idle;

    impl AutomationResource for Idle {
        async fn release(self) -> browser_pool::Result<()> {
            Ok(())
        }
    }

    struct IdleFactory;

    impl ResourceFactory for IdleFactory {
        type Resource = Idle;

        async fn create(
            &self,
            _slot: usize,
            _proxy: Option<&ProxyDescriptor>,
        ) -> browser_pool::Result<Idle> {
            Ok(Idle)
        }
    }

    /// State with a 2-slot pool and no adapters: accepted URLs fail inside
    /// their own tasks, which is irrelevant to the HTTP responses.
    async fn test_state(output: &std::path::Path) -> AppState<Idle> {
        let pool = ResourcePool::new(
            PoolConfig {
                size: 2,
                task_queue_size: 4,
                proxies: vec![],
            },
            &IdleFactory,
        )
        .await
        .unwrap();
        let store = FileQuotaStore::in_memory(vec![Plan {
            id: "free".into(),
            features: vec![],
        }]);
        let processor = Processor::new(
            Arc::new(pool),
            Arc::new(AdapterRegistry::new()),
            Arc::new(QuotaGuard::new(Arc::new(store), "free")),
            Arc::new(FsMessenger::new(output)),
            PipelineConfig::default(),
        )
        .unwrap();

        AppState {
            processor: Arc::new(processor),
            prometheus: metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
            started_at: Instant::now(),
        }
    }

    fn post_message(text: &str) -> Request<Body> {
        let body = serde_json::json!({
            "account_id": 1,
            "chat_id": 10,
            "message_id": 20,
            "text": text,
        });
        Request::builder()
            .uri("/v1/messages")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn message_with_urls_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()).await, 100);

        let response = app
            .oneshot(post_message(
                "look at these\nhttps://a.test/1\n  http://b.test/2  \nftp://c.test/3",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = json_body(response).await;
        assert_eq!(json["accepted"], 2);
        assert!(json["request_id"].as_str().unwrap().starts_with("msg_"));
    }

    #[tokio::test]
    async fn message_without_urls_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()).await, 100);

        let response = app.oneshot(post_message("no links here")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "no URL found in message");
    }

    #[tokio::test]
    async fn malformed_body_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()).await, 100);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/messages")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text": 5}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn health_reflects_pool_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let pool = state.processor.pool().clone();
        let app = build_router(state, 100);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["size"], 2);
        assert!(json["uptime_seconds"].is_u64());

        pool.close().await.unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "closed");

        let response = app.oneshot(post_message("https://a.test/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()).await, 100);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4; charset=utf-8"
        );
    }
}
