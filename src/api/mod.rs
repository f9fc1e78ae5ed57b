//! HTTP protocol adapter.
//!
//! ```text
//! /
//! ├── /.well-known/terraform.json  - service discovery
//! ├── /ping                        - liveness (GET and HEAD)
//! └── /v1/modules/*                - module registry protocol
//! ```

pub mod error;
pub mod modules;
pub mod types;

use axum::{
    Json, Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use log::info;
use serde_json::{Value, json};
use std::time::{Duration, Instant};

use crate::scope::RequestScope;
use crate::service::ModuleService;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    service: ModuleService,
    request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(service: ModuleService, request_timeout: Option<Duration>) -> Self {
        Self {
            service,
            request_timeout,
        }
    }

    pub fn service(&self) -> &ModuleService {
        &self.service
    }

    /// A fresh scope for one request, starting its deadline now.
    pub fn scope(&self) -> RequestScope {
        RequestScope::for_request(self.request_timeout)
    }
}

/// Build the complete router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/terraform.json", get(discovery))
        .route("/ping", get(ping))
        .merge(modules::router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn discovery() -> Json<Value> {
    Json(json!({ "modules.v1": modules::BASE_PATH }))
}

/// Axum answers HEAD through the GET route with the body stripped.
async fn ping() -> String {
    format!("OK{}", crate::VERSION)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} {} {}ms",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FilesystemStorage, MemoryStorage};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let service = ModuleService::new(Arc::new(MemoryStorage::new()));
        router(AppState::new(service, None))
    }

    async fn send(method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        send_to(app(), method, uri).await
    }

    async fn send_to(app: Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_discovery() {
        let (status, body) = send(Method::GET, "/.well-known/terraform.json").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "modules.v1": "/v1/modules/" }));
    }

    #[tokio::test]
    async fn test_ping() {
        let (status, body) = send(Method::GET, "/ping").await;
        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8(body).unwrap();
        assert_eq!(body, format!("OK{}", crate::VERSION));
        let version = body.strip_prefix("OK").unwrap();
        assert!(!version.is_empty());
        assert!(!version.contains(char::is_whitespace), "{:?}", version);

        let (status, body) = send(Method::HEAD, "/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_found() {
        let (status, body) = send(Method::GET, "/v1/modules/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "errors": ["not found"] }));
    }

    #[tokio::test]
    async fn test_bad_query_is_rejected() {
        let (status, body) = send(Method::GET, "/v1/modules/ns?offset=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_coordinate_is_rejected() {
        let (status, _) = send(Method::GET, "/v1/modules/ns/vpc/aws/../download").await;
        assert_ne!(status, StatusCode::OK);

        let (status, _) = send(Method::GET, "/v1/modules/ns/vpc/aws/%2E%2E").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_traversal_listing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("secret").join("team");
        std::fs::create_dir_all(&secret).unwrap();
        std::fs::write(secret.join("db-password.tgz"), "hunter2").unwrap();

        let storage = FilesystemStorage::open(dir.path().join("root")).unwrap();
        let app = router(AppState::new(ModuleService::new(Arc::new(storage)), None));

        for uri in [
            "/v1/modules/%2E%2E",
            "/v1/modules/%2E",
            "/v1/modules/%2E%2E/secret",
            "/v1/modules/%2E%2E/secret/team",
            "/v1/modules/%2E%2E/secret/team/versions",
            "/v1/modules/%2E%2E/secret/team/download",
            "/v1/modules/?provider=..",
        ] {
            let (status, body) = send_to(app.clone(), Method::GET, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(!String::from_utf8(body).unwrap().contains("db-password"));
        }
    }
}
