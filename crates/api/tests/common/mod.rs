//! Shared harness for API integration tests.
//!
//! The router comes from `build_router`, as in `main.rs`. The
//! cloud provider is a fake that hands out sequential ids on loopback, and
//! the pipeline probes a port nothing listens on, so spawned runs fail fast
//! without touching the network.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use creator_api::config::ServerConfig;
use creator_api::router::build_router;
use creator_api::state::AppState;
use creator_cloud::{MachineProvider, ProviderError, ProvisionedMachine};
use creator_core::types::DbId;
use creator_events::LogHub;
use creator_pipeline::{
    ConfigurationRunner, PgProvisionStore, ProbePolicy, ProvisionPipeline, ProvisionStore,
    ReadinessProber, RunnerConfig,
};

// ---------------------------------------------------------------------------
// Fake provider
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeProvider {
    next_id: AtomicI64,
    pub deleted: Mutex<Vec<DbId>>,
}

impl FakeProvider {
    pub fn new(first_id: DbId) -> Self {
        Self {
            next_id: AtomicI64::new(first_id),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MachineProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_machine(&self, name: &str) -> Result<ProvisionedMachine, ProviderError> {
        Ok(ProvisionedMachine {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            address: "127.0.0.1".to_string(),
        })
    }

    async fn delete_machine(&self, id: DbId) -> Result<(), ProviderError> {
        self.deleted.lock().await.push(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

/// Probe policy that gives up after one quick failed attempt.
fn failing_probe(port: u16) -> ProbePolicy {
    ProbePolicy {
        warmup: Duration::ZERO,
        interval: Duration::from_millis(10),
        attempts: 1,
        connect_timeout: Duration::from_millis(200),
        port,
    }
}

/// A port nothing listens on.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub struct TestApp {
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
}

impl TestApp {
    pub fn new(pool: PgPool) -> Self {
        let hub = Arc::new(LogHub::new());
        let store: Arc<dyn ProvisionStore> = Arc::new(PgProvisionStore::new(pool.clone()));
        let port = closed_port();
        let runner = ConfigurationRunner::new(RunnerConfig {
            program: "true".into(),
            playbook: "playbook.yml".into(),
            working_dir: std::env::temp_dir(),
            private_key_path: PathBuf::from("/nonexistent/key"),
            extra_args: Vec::new(),
            stall_threshold: Duration::from_secs(30),
        });
        let pipeline = Arc::new(ProvisionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            ReadinessProber::new(failing_probe(port), failing_probe(port)),
            runner,
        ));
        let provider = Arc::new(FakeProvider::new(1000));

        let state = AppState {
            pool,
            config: Arc::new(test_config()),
            hub,
            store,
            provider: provider.clone(),
            pipeline,
            shutdown: CancellationToken::new(),
        };
        Self { state, provider }
    }

    /// Full router with the production middleware stack.
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &test_config())
    }

    /// Serve the router on an ephemeral port; returns its address.
    pub async fn spawn_server(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = self.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn delete(app: Router, uri: &str) -> Response {
    app.oneshot(Request::delete(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET /api/v1/machines/{id}` until its status is terminal.
pub async fn wait_for_terminal(app: &Router, id: DbId) -> serde_json::Value {
    for _ in 0..100 {
        let json = body_json(get(app.clone(), &format!("/api/v1/machines/{id}")).await).await;
        let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
        if status == "ready" || status == "failed" {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("machine {id} never reached a terminal status");
}
