#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use dsa_coach_api::{
    config::{Config, StorageBackend},
    create_router,
    error::GenerationFailure,
    services::{
        generation::{GeneratedText, GenerationPort, GenerationRequest},
        store::{DocumentStore, MemoryStore},
        AppState,
    },
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tower::ServiceExt;
use uuid::Uuid;

/// Deterministic generator that counts calls and can be switched to fail.
#[derive(Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationPort for CountingGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedText, GenerationFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(GenerationFailure::Upstream(503));
        }
        let text = match request {
            GenerationRequest::Hint(prompt) => format!(
                "Hint {} ({}) after {} earlier hints, call {}",
                prompt.level,
                prompt.kind.as_str(),
                prompt.previous_hints.len(),
                n
            ),
            GenerationRequest::Variation(prompt) => {
                format!("{} variations of {}", prompt.count, prompt.problem.title)
            }
            GenerationRequest::Review(prompt) => format!("Review of {} code", prompt.language),
        };
        GeneratedText::sanitize(&text)
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

pub struct TestApp {
    pub router: Router,
    pub generator: Arc<CountingGenerator>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.normalize();
    config
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let generator = Arc::new(CountingGenerator::default());
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let app_state = Arc::new(AppState::with_parts(
        test_config(),
        store,
        generator.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        generator,
    }
}

pub fn unique_user() -> String {
    format!("user-{}", Uuid::new_v4())
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

/// Registers a problem with a unique statement and returns its id.
pub async fn register_problem(app: &Router, topics: &[&str]) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/problems",
        Some(json!({
            "title": "Two Sum",
            "statement": format!("Return indices of two numbers adding up to target. Case {}", Uuid::new_v4()),
            "topics": topics,
            "difficulty": "easy"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}

pub fn hints_uri(user_id: &str, problem_id: &str) -> String {
    format!("/api/v1/users/{}/problems/{}/hints", user_id, problem_id)
}

pub async fn request_hint(app: &Router, user_id: &str, problem_id: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", &hints_uri(user_id, problem_id), Some(body)).await
}
