#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use brandlens_api::config::ServerConfig;
use brandlens_api::router::build_app_router;
use brandlens_api::state::AppState;
use brandlens_core::analysis::{AiModel, PipelineStage};
use brandlens_core::collaborators::{AnalysisProvider, Brand, Dispatcher, Notifier};
use brandlens_core::dispatch::{DispatchMessage, SIGNATURE_HEADER};
use brandlens_core::error::ExternalError;
use brandlens_core::normalize::ProviderOutput;
use brandlens_core::signing::sign_payload;
use brandlens_core::types::DbId;
use brandlens_db::repositories::{BrandRepo, UserRepo};
use brandlens_pipeline::store::{PgDirectory, PgJobStore, PgLockStore};
use brandlens_pipeline::{Collaborators, Pipeline, PipelineConfig};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

pub const SIGNING_SECRET: &str = "test-signing-secret";
pub const CRON_SECRET: &str = "test-cron-secret";
pub const SERVICE_TOKEN: &str = "test-service-token";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        cron_secret: Some(CRON_SECRET.to_string()),
        dispatch_signing_secret: SIGNING_SECRET.to_string(),
        internal_api_token: Some(SERVICE_TOKEN.to_string()),
        run_retention_days: 30,
    }
}

// ---------------------------------------------------------------------------
// Collaborator fakes
// ---------------------------------------------------------------------------

pub struct FixedProvider;

#[async_trait]
impl AnalysisProvider for FixedProvider {
    async fn analyze(
        &self,
        _brand: &Brand,
        _model: AiModel,
        _stage: PipelineStage,
    ) -> Result<ProviderOutput, ExternalError> {
        Ok(ProviderOutput {
            raw: json!({"visibility_score": 75, "mention_rate": 30}),
            response_time_ms: 400,
        })
    }
}

/// Holds dispatched messages so tests can deliver them to the webhook.
#[derive(Default)]
pub struct QueueDispatcher {
    queue: Mutex<Vec<DispatchMessage>>,
}

impl QueueDispatcher {
    pub fn pop(&self) -> Option<DispatchMessage> {
        let mut queue = self.queue.lock().unwrap();
        (!queue.is_empty()).then(|| queue.remove(0))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(&self, message: &DispatchMessage) -> Result<(), ExternalError> {
        self.queue.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    subjects: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, _address: &str, subject: &str, _body: &str) -> Result<(), ExternalError> {
        self.subjects.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
    pub dispatcher: Arc<QueueDispatcher>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Build the production router over Postgres stores and in-memory
/// dispatcher, provider and notifier.
pub fn build_test_app(pool: PgPool) -> TestApp {
    let config = test_config();
    let dispatcher = Arc::new(QueueDispatcher::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let pipeline = Pipeline::new(
        Collaborators {
            store: Arc::new(PgJobStore::new(pool.clone())),
            locks: Arc::new(PgLockStore::new(pool.clone())),
            provider: Arc::new(FixedProvider),
            dispatcher: dispatcher.clone(),
            notifier: notifier.clone(),
            directory: Arc::new(PgDirectory::new(pool.clone())),
        },
        PipelineConfig::default(),
    );

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        pipeline,
    };

    TestApp {
        router: build_app_router(state, &config),
        pool,
        dispatcher,
        notifier,
    }
}

/// Insert a user and a brand they own.
pub async fn seed(pool: &PgPool) -> (DbId, DbId) {
    let user = UserRepo::create(pool, "owner@acme.test", Some("Owner"))
        .await
        .unwrap();
    let brand = BrandRepo::create(pool, user.id, "Acme", Some("acme.test"))
        .await
        .unwrap();
    (brand.id, user.id)
}

/// Pretend nothing has happened to any run for `minutes`.
pub async fn backdate_runs(pool: &PgPool, minutes: i32) {
    sqlx::query(
        "UPDATE analysis_runs \
         SET started_at = NOW() - make_interval(mins => $1), \
             last_progress_at = CASE WHEN last_progress_at IS NULL THEN NULL \
                                     ELSE NOW() - make_interval(mins => $1) END",
    )
    .bind(minutes)
    .execute(pool)
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    /// POST `body` with a bearer token.
    pub async fn post_bearer(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// POST raw bytes signed with `secret`.
    pub async fn post_signed(&self, uri: &str, body: Vec<u8>, secret: &str) -> Response<Body> {
        let signature = sign_payload(secret, &body);
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Start a run through the API and return its id.
    pub async fn start_run(&self, brand_id: DbId, user_id: DbId, models: &[&str]) -> String {
        let response = self
            .post_bearer(
                &format!("/api/v1/brands/{brand_id}/analysis/runs"),
                Some(SERVICE_TOKEN),
                json!({"user_id": user_id, "models": models, "stages": ["TOFU"]}),
            )
            .await;
        assert_eq!(response.status(), 201);
        body_json(response).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Deliver the next queued dispatch to the webhook, as the dispatcher would.
    pub async fn deliver_next(&self) -> Option<Value> {
        let message = self.dispatcher.pop()?;
        let response = self
            .post_signed(
                "/webhooks/analysis/dispatch",
                serde_json::to_vec(&message).unwrap(),
                SIGNING_SECRET,
            )
            .await;
        assert_eq!(response.status(), 200);
        Some(body_json(response).await)
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
