//! HTTP host runtime: proxies a site through the worker and exposes the
//! worker's lifecycle, push and sync events as admin endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use url::Url;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::host::LoggingHost;
use crate::http::{Request, Response};
use crate::network::ReqwestNetwork;
use crate::store::{CacheStore, DiskCacheStore, MemoryCacheStore};
use crate::sync::{FileSyncQueue, SyncQueue};
use crate::worker::ServiceWorker;

/// Headers owned by the connection, never forwarded.
const HOP_BY_HOP: [&str; 5] = [
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "transfer-encoding",
];

#[derive(Clone)]
struct AppState {
    worker: Arc<ServiceWorker>,
    upstream: Arc<Url>,
}

struct ApiError(StatusCode, String);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::Push(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidState { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> AxumResponse {
        (self.0, axum::Json(ErrorBody { error: self.1 })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct ClickRequest {
    #[serde(default)]
    action: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct SyncRequest {
    tag: String,
}

#[derive(Serialize)]
struct QueuedResponse {
    id: String,
}

type ApiResult<T> = std::result::Result<axum::Json<T>, ApiError>;

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.worker.info())
}

async fn caches(State(state): State<AppState>) -> ApiResult<Vec<crate::worker::CacheInfo>> {
    Ok(axum::Json(state.worker.cache_report().await?))
}

async fn message(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> ApiResult<Option<crate::message::MessageReply>> {
    Ok(axum::Json(state.worker.message(&payload).await?))
}

async fn push(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Option<crate::push::Notification>> {
    Ok(axum::Json(state.worker.push(Some(body.as_ref())).await?))
}

async fn notification_click(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<ClickRequest>,
) -> ApiResult<crate::push::ClickOutcome> {
    let outcome = state
        .worker
        .notification_click(&payload.action, payload.url.as_deref())
        .await?;
    Ok(axum::Json(outcome))
}

async fn sync(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<SyncRequest>,
) -> ApiResult<Option<crate::sync::SyncReport>> {
    Ok(axum::Json(state.worker.sync(&payload.tag).await?))
}

async fn queue_sync(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> ApiResult<QueuedResponse> {
    let id = state.worker.queue_sync(&payload).await?;
    Ok(axum::Json(QueuedResponse { id }))
}

async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AxumResponse {
    match to_worker_request(&state.upstream, &method, &uri, &headers, body) {
        Ok(request) => into_http_response(state.worker.fetch(&request).await),
        Err(e) => ApiError(StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

fn to_worker_request(
    upstream: &Url,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Request> {
    // Set path and query on a copy of the upstream; joining would treat a
    // `//host/...` path as scheme-relative and leave the origin.
    let mut url = upstream.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    if url.origin() != upstream.origin() {
        return Err(Error::Config(format!("request escapes upstream: {uri}")));
    }
    let mut request = Request::new(method.as_str(), url).with_body(body);
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    Ok(request)
}

fn into_http_response(response: Response) -> AxumResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    (status, headers, Body::from(response.body)).into_response()
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/_sw/status", get(status))
        .route("/_sw/caches", get(caches))
        .route("/_sw/message", post(message))
        .route("/_sw/push", post(push))
        .route("/_sw/notification-click", post(notification_click))
        .route("/_sw/sync", post(sync))
        .route("/_sw/sync/pending", post(queue_sync))
        .fallback(proxy)
        .layer(cors)
        .with_state(state)
}

/// Sends `CLEAN_CACHE` to the worker every `every` until cancelled.
fn spawn_cleanup(
    worker: Arc<ServiceWorker>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; activation just cleaned up.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let clean = serde_json::json!({ "type": "CLEAN_CACHE" });
                    if let Err(e) = worker.message(&clean).await {
                        log::warn!("Scheduled cache cleanup failed: {e}");
                    }
                }
            }
        }
    })
}

async fn build_worker(config: &AppConfig) -> Result<ServiceWorker> {
    let worker_config = config.worker.clone().with_scope(&config.server.upstream);

    let store: Arc<dyn CacheStore> = match &config.server.cache_dir {
        Some(dir) => {
            log::info!("Caching to {}", dir.display());
            Arc::new(DiskCacheStore::new(dir))
        }
        None => Arc::new(MemoryCacheStore::new()),
    };

    let timeout = Duration::from_secs(config.server.request_timeout_secs);
    let network = ReqwestNetwork::with_timeout(timeout)
        .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;

    tokio::fs::create_dir_all(&config.server.state_dir).await?;
    let queue: Arc<dyn SyncQueue> = Arc::new(FileSyncQueue::new(
        config.server.state_dir.join("sync-queue.toml"),
    ));

    ServiceWorker::new(
        &worker_config,
        store,
        Arc::new(network),
        Arc::new(LoggingHost::default()),
        queue,
    )
}

/// Starts the worker and serves until Ctrl-C.
///
/// The worker is installed and activated before the listener opens; an
/// install failure aborts startup.
///
/// # Errors
///
/// Returns an error if the worker cannot start or the server cannot bind.
pub async fn run(config: AppConfig) -> Result<()> {
    let upstream = Url::parse(&config.server.upstream)?;
    let worker = Arc::new(build_worker(&config).await?);
    let state = worker.start().await?;
    log::info!("Worker {} is {state}", config.worker.cache_name());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("listen address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Serving {upstream} on http://{addr}");

    let token = CancellationToken::new();
    let every = Duration::from_secs(config.server.cleanup_interval_secs.max(1));
    let cleanup = spawn_cleanup(worker.clone(), every, token.clone());

    let app = router(AppState {
        worker: worker.clone(),
        upstream: Arc::new(upstream),
    });
    let shutdown = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {e}");
            }
            log::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    token.cancel();
    if let Err(e) = cleanup.await {
        log::warn!("Cleanup task ended abnormally: {e}");
    }
    worker.settle().await;
    Ok(())
}
