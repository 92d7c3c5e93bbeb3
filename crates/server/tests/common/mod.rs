//! Common test utilities for router-level testing with a mock transcoder.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a real `Mixer` whose external engine is a `MockTranscoder`,
//! so full mix lifecycles run without ffmpeg.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mixloop_core::{
    load::{ActiveUnitsLoad, LoadMonitor},
    testing::MockTranscoder,
    Config, Mixer, ProcessorConfig, ProgressBroadcaster, ServerConfig,
};
use mixloop_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use mixloop_core::testing::fixtures;

/// Boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "mixloop-test-boundary";

/// Test fixture for router-level testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.get("/api/v1/health").await;
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock transcoder - inspect requests, inject failures
    pub transcoder: Arc<MockTranscoder>,
    /// Progress broadcaster shared with the mixer
    pub broadcaster: ProgressBroadcaster,
    /// Temporary directory holding scratch, uploads and outputs
    pub temp_dir: TempDir,
    /// Effective configuration
    pub config: Config,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response, for binary bodies
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestFixture {
    /// Create a new test fixture with a batch threshold of 4 inputs.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let processing = ProcessorConfig::default()
            .with_temp_dir(temp_dir.path().join("scratch"))
            .with_upload_dir(temp_dir.path().join("uploads"))
            .with_output_dir(temp_dir.path().join("output"))
            .with_batch_threshold(4);

        let config = Config {
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            processing: processing.clone(),
            ..Default::default()
        };

        let transcoder = Arc::new(MockTranscoder::new());
        transcoder.set_delay(Duration::from_millis(5)).await;

        // Enough cores that the load monitor never throttles.
        let monitor = Arc::new(LoadMonitor::with_source(
            processing.load_monitor(),
            ActiveUnitsLoad::new(64),
        ));
        let broadcaster = ProgressBroadcaster::new();
        let mixer = Mixer::with_monitor(
            processing,
            transcoder.clone(),
            broadcaster.clone(),
            monitor,
        );

        let state = Arc::new(AppState::new(config.clone(), mixer));
        let router = create_router(state);

        Self {
            router,
            transcoder,
            broadcaster,
            temp_dir,
            config,
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.config.processing.upload_dir.clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.processing.output_dir.clone()
    }

    /// Send a GET request to the test router.
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

    /// Send a multipart POST and return the raw response.
    pub async fn post_multipart(&self, path: &str, body: Vec<u8>) -> RawResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send_raw(request).await
    }

    /// Send a GET request and return the raw response.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send_raw(request).await
    }

    async fn send_raw(&self, request: Request<Body>) -> RawResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            headers,
            bytes,
        }
    }

    /// Send a request to the test router.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let raw = self.send_raw(request_builder.body(body).unwrap()).await;
        let body: Value = if raw.bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw.bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status: raw.status,
            body,
        }
    }
}

/// A part of a multipart form.
pub enum Part<'a> {
    /// A text field
    Text(&'a str, &'a str),
    /// A file field: (field name, file name, contents)
    File(&'a str, &'a str, &'a [u8]),
}

/// Encode a `multipart/form-data` body delimited by [`BOUNDARY`].
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: audio/mpeg\r\n\r\n");
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
