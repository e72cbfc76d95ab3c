//! Stress Analyzer API Server
//!
//! REST API for account management, stress analysis and history views.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use inference_engine::{InferenceEngine, ModelSource};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use storage::HistoryLog;
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use user_auth::{AuthController, CredentialStore, Session};
use uuid::Uuid;

pub mod config;
pub mod error;
mod routes;
pub mod workflow;

pub use config::{AppConfig, LogConfig};
pub use error::ApiError;
pub use workflow::{analyze, AnalysisOutcome, WorkflowError};

/// Largest accepted classifier upload
pub const MAX_MODEL_BYTES: usize = 64 * 1024 * 1024;

/// Shared handle passed to every handler
pub type SharedState = Arc<RwLock<AppState>>;

/// Application state shared across handlers
pub struct AppState {
    /// Login controller over the credential store
    pub auth: AuthController,
    /// Prediction history
    pub history: HistoryLog,
    /// Active model
    pub engine: InferenceEngine,
    /// Bearer token -> session
    pub sessions: HashMap<Uuid, Session>,
    pub config: AppConfig,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Prometheus renderer, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Open the stores and load the model under `config.data_dir`
    pub fn open(config: AppConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let store = CredentialStore::open(config.users_path())?;
        let history = HistoryLog::open(config.history_path())?;
        let engine = InferenceEngine::load(config.engine_config())?;
        if let ModelSource::SyntheticFallback { reason } = engine.source() {
            warn!("Predictions are not informative until a model is uploaded: {}", reason);
        }

        Ok(Self {
            auth: AuthController::new(Arc::new(store)),
            history,
            engine,
            sessions: HashMap::new(),
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics: None,
        })
    }

    /// Attach a Prometheus handle for `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Session for the request's bearer token; logged out if absent or unknown
    pub fn session(&self, headers: &HeaderMap) -> Session {
        bearer_token(headers)
            .and_then(|token| self.sessions.get(&token).cloned())
            .unwrap_or_default()
    }
}

/// Parse `Authorization: Bearer <uuid>`
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<Uuid> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    Uuid::parse_str(token.trim()).ok()
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub model: ModelHealth,
    pub history: ComponentHealth,
}

/// Active model details
#[derive(Debug, Serialize)]
pub struct ModelHealth {
    pub source: ModelSource,
    pub classifier: &'static str,
    pub n_features: usize,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub records: Option<usize>,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/auth/register", post(routes::auth::register))
        .route("/api/v1/auth/login", post(routes::auth::login))
        .route("/api/v1/auth/logout", post(routes::auth::logout))
        .route("/api/v1/session", get(routes::auth::current_session))
        .route("/api/v1/features", get(routes::analyze::get_features))
        .route("/api/v1/analyze", post(routes::analyze::post_analyze))
        .route("/api/v1/history", get(routes::history::get_history))
        .route("/api/v1/history/export", get(routes::history::export_history))
        .route("/api/v1/admin/users", get(routes::admin::list_users))
        .route("/api/v1/admin/users/export", get(routes::admin::export_users))
        .route("/api/v1/admin/users/:username/promote", post(routes::admin::promote_user))
        .route(
            "/api/v1/admin/model",
            put(routes::admin::upload_model).layer(DefaultBodyLimit::max(MAX_MODEL_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let history = match state.history.count() {
        Ok(records) => ComponentHealth {
            status: "ok".to_string(),
            records: Some(records),
        },
        Err(e) => {
            warn!("History log unreadable: {}", e);
            ComponentHealth {
                status: "error".to_string(),
                records: None,
            }
        }
    };

    let status = if history.records.is_none() {
        "unhealthy"
    } else if state.engine.is_fallback() {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            model: ModelHealth {
                source: state.engine.source().clone(),
                classifier: state.engine.artifact().classifier.kind(),
                n_features: state.engine.n_features(),
            },
            history,
        },
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.read().await;
    let body = state.metrics.as_ref().map(PrometheusHandle::render).unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = FmtSubscriber::builder().with_env_filter(filter).with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Run the server
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let addr = config.bind_addr.clone();

    let state = Arc::new(RwLock::new(AppState::open(config)?.with_metrics(handle)));
    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
