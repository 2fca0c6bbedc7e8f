use std::any::Any;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use uuid::Uuid;

use super::error::ApiError;
use super::stream::{parse_limit, read_stream, write_stream, DEFAULT_READ_LIMIT};
use crate::config::ServerConfig;
use crate::queue::{QueueError, QueueStats, SharedQueueService};
use crate::session::{Session, SessionTracker};

/// Shared handles every handler works against.
#[derive(Clone)]
pub struct AppState {
    pub queues: SharedQueueService,
    pub sessions: SessionTracker,
    pub default_read_limit: u64,
}

impl AppState {
    pub fn new(queues: SharedQueueService) -> Self {
        Self {
            queues,
            sessions: SessionTracker::new(),
            default_read_limit: DEFAULT_READ_LIMIT,
        }
    }

    pub fn with_read_limit(mut self, default_read_limit: u64) -> Self {
        self.default_read_limit = default_read_limit;
        self
    }
}

pub struct WebServer {
    pub http_addr: String,
    pub state: AppState,
}

impl WebServer {
    pub fn new(config: &ServerConfig, queues: SharedQueueService) -> Self {
        Self {
            http_addr: config.http_addr.clone(),
            state: AppState::new(queues).with_read_limit(config.default_read_limit),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let app = build_router(self.state.clone());

        let listener = TcpListener::bind(&self.http_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.http_addr))?;
        info!("🚀 Server listening on http://{}", listener.local_addr()?);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("🛑 Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/v1/clients", get(list_clients).fallback(method_not_allowed))
        .route(
            "/v1/queues",
            get(list_queues)
                .post(create_queue)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/queues/:queue_id",
            get(get_queue_action)
                .post(post_queue_action)
                .delete(delete_queue)
                .fallback(method_not_allowed),
        )
        .route("/release", get(release).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(state);

    with_middleware(routes)
}

pub(crate) fn with_middleware(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(access_log())
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(CorsLayer::permissive()),
    )
}

/// One INFO line per request with method, path, status and latency.
fn access_log() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Panic(detail).into_response()
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::RouteNotFound(uri.to_string())
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method.to_string())
}

async fn release() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Address the client connected from, preferring `X-Forwarded-For`.
pub struct ClientOrigin(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(origin) = forwarded {
            return Ok(ClientOrigin(origin.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientOrigin(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueAction {
    Read,
    Write,
}

/// Split `name:action` into its parts. Unknown suffixes stay in the name.
fn parse_target(target: &str) -> (&str, Option<QueueAction>) {
    match target.rsplit_once(':') {
        Some((name, "read")) => (name, Some(QueueAction::Read)),
        Some((name, "write")) => (name, Some(QueueAction::Write)),
        _ => (target, None),
    }
}

async fn list_clients(State(state): State<AppState>) -> Json<BTreeMap<Uuid, Session>> {
    Json(state.sessions.list())
}

async fn list_queues(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.queues.list_queues().await?))
}

#[derive(Debug, Deserialize)]
struct CreateQueueInput {
    name: String,
}

async fn create_queue(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let input: CreateQueueInput =
        serde_json::from_slice(&body).map_err(QueueError::from_decode)?;
    state.queues.create_queue(&input.name).await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Serialize)]
struct QueueInfo {
    name: String,
    #[serde(flatten)]
    stats: QueueStats,
}

async fn get_queue_action(
    State(state): State<AppState>,
    Path(target): Path<String>,
    method: Method,
    origin: ClientOrigin,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    match parse_target(&target) {
        (name, None) => retrieve_queue(&state, name).await,
        (name, Some(QueueAction::Read)) => read_queue(&state, name, origin, &headers).await,
        (_, Some(QueueAction::Write)) => Err(ApiError::MethodNotAllowed(method.to_string())),
    }
}

async fn post_queue_action(
    State(state): State<AppState>,
    Path(target): Path<String>,
    method: Method,
    origin: ClientOrigin,
    body: Body,
) -> Result<StatusCode, ApiError> {
    match parse_target(&target) {
        (name, Some(QueueAction::Write)) => write_queue(&state, name, origin, body).await,
        _ => Err(ApiError::MethodNotAllowed(method.to_string())),
    }
}

async fn retrieve_queue(state: &AppState, name: &str) -> Result<Response, ApiError> {
    let queue = state.queues.get_queue(name).await?;
    let info = QueueInfo {
        name: name.to_string(),
        stats: queue.stats(),
    };
    Ok(Json(info).into_response())
}

async fn delete_queue(
    State(state): State<AppState>,
    Path(target): Path<String>,
    method: Method,
) -> Result<StatusCode, ApiError> {
    match parse_target(&target) {
        (name, None) => {
            state.queues.delete_queue(name).await?;
            Ok(StatusCode::OK)
        }
        _ => Err(ApiError::MethodNotAllowed(method.to_string())),
    }
}

async fn read_queue(
    state: &AppState,
    name: &str,
    ClientOrigin(origin): ClientOrigin,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let session = state.sessions.register(name, &origin);
    let queue = state.queues.get_queue(name).await?;

    let limit = parse_limit(
        headers.get("limit").and_then(|v| v.to_str().ok()),
        state.default_read_limit,
    );
    info!("Tailing queue {} (limit {}) for {}", name, limit, origin);

    let body = if limit == 0 {
        Body::empty()
    } else {
        Body::from_stream(read_stream(queue, limit, session))
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .body(body)
        .map_err(|e| QueueError::Internal(e.to_string()))?)
}

async fn write_queue(
    state: &AppState,
    name: &str,
    ClientOrigin(origin): ClientOrigin,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let session = state.sessions.register(name, &origin);
    let queue = state.queues.get_queue(name).await?;

    let written = write_stream(queue.as_ref(), body.into_data_stream(), &session).await?;
    info!("Accepted {} messages on queue {} from {}", written, name, origin);

    Ok(StatusCode::OK)
}
