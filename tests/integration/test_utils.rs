//! Test utilities for integration tests.
//!
//! This module provides an in-memory broker that records every session and
//! message, token minting against a static HS256 key, and a multipart body
//! builder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde::Serialize;
use tempfile::TempDir;
use tower::ServiceExt;

use task_gateway::{
    create_router, AppState, AuthSettings, BrokerConnector, BrokerError, BrokerSession, KeyCache,
    LocalStorage, QueuePublisher, RouterConfig, StaticKeySource, TokenVerifier,
};

pub const TEST_SECRET: &[u8] = b"integration-test-signing-secret";
pub const TEST_KID: &str = "test-key-1";
pub const TEST_ISSUER: &str = "https://issuer.test/";
pub const TEST_AUDIENCE: &str = "https://gateway.test";

const BOUNDARY: &str = "gateway-test-boundary";

// =============================================================================
// Mock Broker
// =============================================================================

/// A message as the broker received it.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub queue: String,
    pub queue_durable: bool,
    pub persistent: bool,
    pub body: serde_json::Value,
}

#[derive(Debug, Default)]
struct BrokerLog {
    sessions_opened: usize,
    sessions_closed: usize,
    queues: HashMap<String, bool>,
    published: Vec<PublishedMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrokerMode {
    Healthy,
    Unreachable,
    RejectPublish,
}

/// In-memory broker recording sessions, declarations and messages.
///
/// Queue declarations behave like AMQP: redeclaring with the same durability
/// is a no-op, a different durability is a conflict.
#[derive(Clone)]
pub struct MockBroker {
    mode: BrokerMode,
    log: Arc<Mutex<BrokerLog>>,
}

impl MockBroker {
    pub fn new(mode: BrokerMode) -> Self {
        Self {
            mode,
            log: Arc::new(Mutex::new(BrokerLog::default())),
        }
    }

    /// Pre-declare a queue as if another producer had created it.
    pub fn with_queue(self, queue: &str, durable: bool) -> Self {
        self.log
            .lock()
            .unwrap()
            .queues
            .insert(queue.to_string(), durable);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.log.lock().unwrap().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.log.lock().unwrap().sessions_closed
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.log.lock().unwrap().published.clone()
    }

    pub fn published_to(&self, queue: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.queue == queue)
            .collect()
    }
}

pub struct MockSession {
    broker: MockBroker,
    closed: bool,
}

#[async_trait]
impl BrokerConnector for MockBroker {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession, BrokerError> {
        if self.mode == BrokerMode::Unreachable {
            return Err(BrokerError::Connect("connection refused".to_string()));
        }
        self.log.lock().unwrap().sessions_opened += 1;
        Ok(MockSession {
            broker: self.clone(),
            closed: false,
        })
    }
}

#[async_trait]
impl BrokerSession for MockSession {
    async fn declare_queue(&mut self, queue: &str, durable: bool) -> Result<(), BrokerError> {
        let mut log = self.broker.log.lock().unwrap();
        match log.queues.get(queue) {
            Some(&existing) if existing != durable => Err(BrokerError::DeclareConflict {
                queue: queue.to_string(),
                message: "PRECONDITION_FAILED - inequivalent arg 'durable'".to_string(),
            }),
            _ => {
                log.queues.insert(queue.to_string(), durable);
                Ok(())
            }
        }
    }

    async fn publish(
        &mut self,
        queue: &str,
        body: &[u8],
        persistent: bool,
    ) -> Result<(), BrokerError> {
        if self.broker.mode == BrokerMode::RejectPublish {
            return Err(BrokerError::Nacked {
                queue: queue.to_string(),
            });
        }

        let mut log = self.broker.log.lock().unwrap();
        let queue_durable = log.queues.get(queue).copied().unwrap_or(false);
        log.published.push(PublishedMessage {
            queue: queue.to_string(),
            queue_durable,
            persistent,
            body: serde_json::from_slice(body).expect("message body is JSON"),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.broker.log.lock().unwrap().sessions_closed += 1;
        }
        Ok(())
    }
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Serialize)]
pub struct TestClaims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: u64,
}

impl TestClaims {
    pub fn valid(sub: &str) -> Self {
        Self {
            sub: sub.to_string(),
            aud: TEST_AUDIENCE.to_string(),
            iss: TEST_ISSUER.to_string(),
            exp: jsonwebtoken::get_current_timestamp() + 600,
        }
    }
}

/// Sign claims with the test key.
pub fn sign(claims: &TestClaims, kid: Option<&str>, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

/// A valid token for `sub`.
pub fn token_for(sub: &str) -> String {
    sign(&TestClaims::valid(sub), Some(TEST_KID), TEST_SECRET)
}

/// A token for `sub` that expired an hour ago.
pub fn expired_token_for(sub: &str) -> String {
    let mut claims = TestClaims::valid(sub);
    claims.exp = jsonwebtoken::get_current_timestamp() - 3600;
    sign(&claims, Some(TEST_KID), TEST_SECRET)
}

pub fn test_verifier() -> TokenVerifier {
    let source =
        StaticKeySource::new().with_key(Some(TEST_KID), DecodingKey::from_secret(TEST_SECRET));
    let settings = AuthSettings::new(TEST_ISSUER, TEST_AUDIENCE, Algorithm::HS256).with_leeway(0);
    TokenVerifier::new(KeyCache::new(source), &settings)
}

// =============================================================================
// Gateway Harness
// =============================================================================

/// A router wired to a mock broker and a temporary storage directory.
pub struct TestGateway {
    pub router: Router,
    pub broker: MockBroker,
    pub storage_dir: TempDir,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::build(MockBroker::new(BrokerMode::Healthy), RouterConfig::new())
    }

    pub fn with_broker(broker: MockBroker) -> Self {
        Self::build(broker, RouterConfig::new())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self::build(MockBroker::new(BrokerMode::Healthy), config)
    }

    fn build(broker: MockBroker, config: RouterConfig) -> Self {
        let storage_dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            QueuePublisher::new(broker.clone()),
            LocalStorage::new(storage_dir.path()),
            test_verifier(),
        );
        let router = create_router(state, config.with_tracing(false));

        Self {
            router,
            broker,
            storage_dir,
        }
    }

    /// Send a request and decode the JSON response body.
    ///
    /// Every error the gateway returns goes through the classifier, so any
    /// non-empty body that is not JSON fails the test.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|e| {
                panic!(
                    "response body is not JSON ({}): {}",
                    e,
                    String::from_utf8_lossy(&body)
                )
            })
        };
        (status, json)
    }

    /// Files currently in the storage directory.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.storage_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One part of a multipart body.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(filename: &'a str, content: &'a [u8]) -> Self {
        Self {
            name: "file",
            filename: Some(filename),
            content,
        }
    }

    pub fn text(name: &'a str, content: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content: content.as_bytes(),
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// `POST /upload` with the given parts and optional bearer token.
pub fn upload_request(token: Option<&str>, parts: &[Part<'_>]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

/// `GET /test-queue` with an optional bearer token.
pub fn probe_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/test-queue");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}
