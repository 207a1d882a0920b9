//! Common test utilities for in-process API testing with a mock storefront.
//!
//! The fixture builds the real router and job registry, but every job
//! drives a `MockStorefront` created by a `MockSurfaceFactory` instead of a
//! browser.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use turnstile_core::{
    testing::{MockSurfaceFactory, StorefrontScript},
    BackoffPolicy, Config, OrchestratorConfig, ServerConfig, ServiceConfig, WebDriverConfig,
};
use turnstile_server::api::{create_router, WsBroadcaster};
use turnstile_server::state::AppState;

/// Re-export fixtures for test convenience
pub use turnstile_core::testing::fixtures;

/// In-process server wired to a mock surface factory.
pub struct TestFixture {
    pub router: Router,
    pub state: Arc<AppState>,
    pub factory: MockSurfaceFactory,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub max_concurrent_jobs: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
        }
    }
}

impl TestFixture {
    /// Fixture whose jobs all see `script`.
    pub fn new(script: StorefrontScript) -> Self {
        Self::with_factory(MockSurfaceFactory::new(script), TestConfig::default())
    }

    pub fn with_config(script: StorefrontScript, test_config: TestConfig) -> Self {
        Self::with_factory(MockSurfaceFactory::new(script), test_config)
    }

    pub fn with_factory(factory: MockSurfaceFactory, test_config: TestConfig) -> Self {
        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
                max_concurrent_jobs: test_config.max_concurrent_jobs,
                ..Default::default()
            },
            webdriver: WebDriverConfig {
                keep_open_on_success: false,
                ..Default::default()
            },
            orchestrator: OrchestratorConfig {
                reload_settle_ms: 0,
                ..Default::default()
            },
            service: ServiceConfig {
                backoff: BackoffPolicy::Fixed { delay_ms: 10 },
            },
            ..Default::default()
        };

        let state = Arc::new(AppState::new(
            config,
            Arc::new(factory.clone()),
            WsBroadcaster::default(),
        ));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            state,
            factory,
        }
    }

    /// A storefront where Floor can be bought on the first attempt.
    pub fn buyable() -> StorefrontScript {
        StorefrontScript::new()
            .entry("Floor R$ 150")
            .login_redirect(fixtures::PAYMENT_URL)
    }

    /// A storefront where Floor never comes back.
    pub fn sold_out() -> StorefrontScript {
        StorefrontScript::new().entry("Floor ESGOTADO")
    }

    /// Valid job body for `sections`.
    pub fn purchase_body(sections: &[&str]) -> Value {
        serde_json::json!({
            "url": fixtures::ENTRY_URL,
            "username": "fan@example.com",
            "password": "hunter2",
            "sections": sections,
            "number_of_tickets": 2
        })
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch the raw text body of a GET request.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll a job until its status is no longer "running".
    pub async fn wait_for_finish(&self, id: &str) -> Value {
        let path = format!("/api/v1/purchases/{}", id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            assert_eq!(response.status, StatusCode::OK);
            if response.body["status"] != "running" {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} did not finish in time", id);
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
