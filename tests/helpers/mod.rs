//! Test helper utilities
//!
//! Shared infrastructure for mailforge integration tests: an in-memory
//! database, scripted generator and mailer fakes, and a request wrapper
//! around the full router.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tower::util::ServiceExt; // for `oneshot` method

use mailforge::db::create_schema;
use mailforge::dispatch::{Dispatcher, WorkerContext};
use mailforge::models::SubstitutionData;
use mailforge::services::generator::fill_template;
use mailforge::services::{ContentGenerator, DeliveryError, GenerationError, MessageDeliverer};
use mailforge::{build_router, AppState};

/// Content generator fake: renders the template locally instead of calling
/// an API, failing for any address listed at construction
pub struct ScriptedGenerator {
    fail_for: HashSet<String>,
}

impl ScriptedGenerator {
    /// Generator that succeeds for every recipient
    pub fn succeeding() -> Self {
        Self {
            fail_for: HashSet::new(),
        }
    }

    /// Generator that fails for the listed addresses
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            fail_for: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        data: &SubstitutionData,
    ) -> Result<String, GenerationError> {
        // CSV admission keeps the address in the email column
        if let Some(Value::String(email)) = data.get("email") {
            if self.fail_for.contains(email) {
                return Err(GenerationError::EmptyResponse);
            }
        }
        Ok(fill_template(prompt, data))
    }
}

/// Delivery fake: records accepted messages in order, rejecting any address
/// listed at construction
#[derive(Default)]
pub struct ScriptedMailer {
    reject: HashSet<String>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedMailer {
    /// Mailer that accepts every message
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Mailer that rejects the listed addresses
    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            reject: addresses.iter().map(|a| a.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Accepted messages so far, as (recipient, body) pairs in delivery order
    pub async fn deliveries(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessageDeliverer for ScriptedMailer {
    async fn deliver(&self, recipient: &str, body: &str) -> Result<(), DeliveryError> {
        if self.reject.contains(recipient) {
            return Err(DeliveryError::Smtp("mailbox unavailable".to_string()));
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), body.to_string()));
        Ok(())
    }
}

/// Full application under test, plus the handles tests assert against
pub struct TestApp {
    pub app: Router,
    pub db: SqlitePool,
    pub dispatcher: Arc<Dispatcher>,
    pub mailer: Arc<ScriptedMailer>,
}

impl TestApp {
    /// Make one request, returning status and parsed JSON body
    ///
    /// Non-JSON bodies (extractor rejections) come back as `Value::Null`.
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Should get response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, body)
    }

    /// GET a path
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.request(request).await
    }

    /// POST a JSON body
    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// POST a CSV body
    pub async fn post_csv(&self, uri: &str, csv: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "text/csv")
            .body(Body::from(csv.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// Stop the dispatcher, draining everything enqueued before this call
    pub async fn drain(&self) {
        self.dispatcher
            .stop()
            .await
            .expect("Should stop dispatcher");
    }
}

/// Create an in-memory database with the schema applied
///
/// A single connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Should connect to in-memory database");
    create_schema(&pool).await.expect("Should create schema");
    pool
}

/// Create a test app wired to the given fakes
pub async fn setup_app(generator: ScriptedGenerator, mailer: ScriptedMailer) -> TestApp {
    let db = setup_test_db().await;
    let mailer = Arc::new(mailer);

    let dispatcher = Arc::new(Dispatcher::start(WorkerContext {
        db: db.clone(),
        generator: Arc::new(generator),
        mailer: Arc::clone(&mailer) as Arc<dyn MessageDeliverer>,
    }));

    let app = build_router(AppState::new(db.clone(), Arc::clone(&dispatcher)));

    TestApp {
        app,
        db,
        dispatcher,
        mailer,
    }
}
