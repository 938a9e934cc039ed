mod chaos;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use joke_catalog_core::{parse_joke_id, CatalogError, DeletedJoke, Joke, JokeStore, Page, PageRequest};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::chaos::{
    inject_random_errors, ChaosConfig, InjectedFailure, RandomErrorInjector, DEFAULT_FAILURE_RATE,
};

const JOKE_NOT_FOUND: &str = "Joke not found";
const INVALID_JOKE_ID: &str = "Invalid joke id";
const INVALID_PAGINATION: &str = "Invalid pagination parameters";
const JOKE_DELETED: &str = "Joke deleted successfully";

#[derive(Debug, Clone)]
struct ServiceState {
    store: Arc<RwLock<JokeStore>>,
    chaos: Arc<RandomErrorInjector>,
    telemetry: Arc<ServiceTelemetry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceError {
    status_code: u16,
    error: String,
}

#[derive(Debug, Clone)]
struct ServiceFailure {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
struct JokeListResponse {
    count: usize,
    jokes: Vec<Joke>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    status_code: u16,
    message: &'static str,
    deleted_joke: DeletedJoke,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PaginationQuery {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    canonical_count: usize,
    extended_count: usize,
    random_errors: RandomErrorsHealth,
    telemetry: ServiceTelemetrySnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RandomErrorsHealth {
    enabled: bool,
    failure_rate: f64,
}

#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
struct ServiceTelemetry {
    requests_total: AtomicU64,
    requests_success_total: AtomicU64,
    requests_failure_total: AtomicU64,
    not_found_total: AtomicU64,
    invalid_request_total: AtomicU64,
    internal_error_total: AtomicU64,
    deleted_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_field_names)]
struct ServiceTelemetrySnapshot {
    requests_total: u64,
    requests_success_total: u64,
    requests_failure_total: u64,
    not_found_total: u64,
    invalid_request_total: u64,
    internal_error_total: u64,
    deleted_total: u64,
    injected_failure_total: u64,
}

#[derive(Debug, Parser)]
#[command(name = "joke-catalog-service")]
#[command(about = "In-memory joke catalog HTTP API")]
struct Args {
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,
    /// Answer a share of requests with a random error status.
    #[arg(long)]
    random_errors: bool,
    #[arg(long, default_value_t = DEFAULT_FAILURE_RATE)]
    error_rate: f64,
}

impl ServiceFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, JOKE_NOT_FOUND)
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }
}

impl From<CatalogError> for ServiceFailure {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => Self::not_found(),
            CatalogError::InvalidId(_) => Self::new(StatusCode::BAD_REQUEST, INVALID_JOKE_ID),
            CatalogError::InvalidPagination(_) => {
                Self::new(StatusCode::BAD_REQUEST, INVALID_PAGINATION)
            }
        }
    }
}

impl IntoResponse for ServiceFailure {
    fn into_response(self) -> Response {
        let payload = ServiceError { status_code: self.status.as_u16(), error: self.message };
        (self.status, Json(payload)).into_response()
    }
}

impl ServiceState {
    fn new(store: JokeStore, chaos: ChaosConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            chaos: Arc::new(RandomErrorInjector::new(chaos)),
            telemetry: Arc::new(ServiceTelemetry::default()),
        }
    }

    fn read_store(&self) -> Result<RwLockReadGuard<'_, JokeStore>, ServiceFailure> {
        self.store.read().map_err(|_| {
            tracing::error!("joke store lock poisoned");
            ServiceFailure::internal()
        })
    }

    fn write_store(&self) -> Result<RwLockWriteGuard<'_, JokeStore>, ServiceFailure> {
        self.store.write().map_err(|_| {
            tracing::error!("joke store lock poisoned");
            ServiceFailure::internal()
        })
    }
}

impl ServiceTelemetry {
    /// Injected failures count toward the request totals only, never toward
    /// the per-kind counters.
    fn record(&self, status: StatusCode, injected: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if status.is_success() {
            self.requests_success_total.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.requests_failure_total.fetch_add(1, Ordering::Relaxed);
        if injected {
            return;
        }
        match status {
            StatusCode::NOT_FOUND => {
                self.not_found_total.fetch_add(1, Ordering::Relaxed);
            }
            StatusCode::BAD_REQUEST => {
                self.invalid_request_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.internal_error_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self, injected_failure_total: u64) -> ServiceTelemetrySnapshot {
        ServiceTelemetrySnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success_total: self.requests_success_total.load(Ordering::Relaxed),
            requests_failure_total: self.requests_failure_total.load(Ordering::Relaxed),
            not_found_total: self.not_found_total.load(Ordering::Relaxed),
            invalid_request_total: self.invalid_request_total.load(Ordering::Relaxed),
            internal_error_total: self.internal_error_total.load(Ordering::Relaxed),
            deleted_total: self.deleted_total.load(Ordering::Relaxed),
            injected_failure_total,
        }
    }
}

async fn record_telemetry(
    State(telemetry): State<Arc<ServiceTelemetry>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let injected = response.extensions().get::<InjectedFailure>().is_some();
    telemetry.record(response.status(), injected);
    response
}

fn app(state: ServiceState) -> Router {
    let chaos = state.chaos.clone();
    let telemetry = state.telemetry.clone();
    Router::new()
        .route("/api/health", get(health))
        .route("/api/jokes", get(list_jokes))
        .route("/api/jokes/random", get(random_joke).delete(delete_joke))
        .route("/api/jokes/:id", get(get_joke).delete(delete_joke))
        .route("/api/jokesPaginated", get(paginated_jokes))
        .with_state(state)
        .layer(middleware::from_fn_with_state(chaos, inject_random_errors))
        .layer(middleware::from_fn_with_state(telemetry, record_telemetry))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("joke_catalog_service=info,tower_http=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let chaos = ChaosConfig { enabled: args.random_errors, failure_rate: args.error_rate };
    let state = ServiceState::new(JokeStore::seeded(), chaos);
    let effective = state.chaos.config();

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        random_errors = effective.enabled,
        error_rate = effective.failure_rate,
        "joke catalog listening"
    );
    axum::serve(listener, app(state)).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("joke catalog stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn health(State(state): State<ServiceState>) -> Result<Json<HealthResponse>, ServiceFailure> {
    let store = state.read_store()?;
    let config = state.chaos.config();
    Ok(Json(HealthResponse {
        status: "ok",
        canonical_count: store.canonical().len(),
        extended_count: store.extended().len(),
        random_errors: RandomErrorsHealth {
            enabled: config.enabled,
            failure_rate: config.failure_rate,
        },
        telemetry: state.telemetry.snapshot(state.chaos.injected_total()),
    }))
}

async fn list_jokes(
    State(state): State<ServiceState>,
) -> Result<Json<JokeListResponse>, ServiceFailure> {
    let store = state.read_store()?;
    let jokes = store.canonical().to_vec();
    Ok(Json(JokeListResponse { count: jokes.len(), jokes }))
}

async fn random_joke(State(state): State<ServiceState>) -> Result<Json<Joke>, ServiceFailure> {
    let store = state.read_store()?;
    let joke = store.random(&mut rand::thread_rng()).cloned().ok_or_else(ServiceFailure::not_found)?;
    Ok(Json(joke))
}

async fn get_joke(
    State(state): State<ServiceState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Joke>, ServiceFailure> {
    let id = parse_joke_id(&raw_id)?;
    let store = state.read_store()?;
    let joke = store.get(id)?.clone();
    Ok(Json(joke))
}

async fn paginated_jokes(
    State(state): State<ServiceState>,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> Result<Json<Page>, ServiceFailure> {
    let Query(query) = query.map_err(|rejection| {
        tracing::debug!("rejected pagination query: {rejection}");
        ServiceFailure::new(StatusCode::BAD_REQUEST, INVALID_PAGINATION)
    })?;
    let request = PageRequest::from_query(query.page.as_deref(), query.limit.as_deref())?;
    let store = state.read_store()?;
    Ok(Json(store.paginate(request)))
}

async fn delete_joke(
    State(state): State<ServiceState>,
    Path(raw_id): Path<String>,
) -> Result<Json<DeleteResponse>, ServiceFailure> {
    let id = parse_joke_id(&raw_id)?;
    let removed = state.write_store()?.delete_by_id(id)?;
    state.telemetry.deleted_total.fetch_add(1, Ordering::Relaxed);
    tracing::info!(id = removed.id, kind = %removed.kind(), "joke deleted");

    Ok(Json(DeleteResponse {
        status_code: StatusCode::OK.as_u16(),
        message: JOKE_DELETED,
        deleted_joke: DeletedJoke::from(removed),
    }))
}
