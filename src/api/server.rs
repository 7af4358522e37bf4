//! HTTP server implementation for the catalog API

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use super::{handlers, models::ErrorBody};
use crate::cache::CatalogCache;
use crate::config::Config;
use crate::enrichment::EnrichmentGateway;
use crate::error::CatalogError;
use crate::store::RecordStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub cache: Arc<CatalogCache>,
    pub gateway: Arc<EnrichmentGateway>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<RecordStore>, gateway: Arc<EnrichmentGateway>) -> Self {
        let cache = Arc::new(CatalogCache::new(config.server.shuffle_interval()));
        Self {
            store,
            cache,
            gateway,
            config: Arc::new(config),
        }
    }

    /// Load the collections and set up enrichment from configuration
    pub async fn open(config: Config) -> crate::error::Result<Self> {
        let store = Arc::new(RecordStore::open(config.storage.clone()).await);
        let gateway = Arc::new(EnrichmentGateway::from_config(&config.enrichment)?);
        Ok(Self::new(config, store, gateway))
    }
}

#[derive(Debug, Deserialize)]
pub struct SkipQuery {
    skip: Option<String>,
}

/// Build the router with every route and middleware layer
pub fn build_router(state: AppState) -> Router {
    // Configure CORS to allow any addon client
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/reload", post(reload_handler))
        .route("/:ns/manifest.json", get(manifest_handler))
        .route("/:ns/catalog/:type/:id", get(catalog_handler))
        .route("/:ns/catalog/:type/:id/:extra", get(catalog_extra_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // Outermost, so CORS preflight answers get the JSON content type too
                .layer(middleware::map_response(force_json_content_type))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Bind and serve until the listener fails
pub async fn start_http_server(state: AppState) -> Result<()> {
    let address = format!("{}:{}", state.config.server.host, state.config.server.port);
    info!("🚀 Starting HTTP server on {}", address);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("🌐 Catalog server listening on http://{}", address);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically re-read storage
///
/// Cached shuffles are only rebuilt when the files changed, since an unchanged
/// reload keeps the snapshot version.
pub fn spawn_reload_task(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let before = state.store.snapshot().await.version;
            let snapshot = state.store.reload().await;
            if snapshot.version == before {
                debug!("⏰ Scheduled reload: collections unchanged");
                continue;
            }
            let counts = snapshot.counts();
            info!(
                "⏰ Scheduled reload: recent {}, short {}, long {}",
                counts.recent, counts.short, counts.long
            );
        }
    })
}

async fn force_json_content_type<B>(mut response: Response<B>) -> Response<B> {
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(e: CatalogError) -> Response {
    let status = match &e {
        CatalogError::UnknownCatalog(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", e);
    }
    (status, Json(ErrorBody::new(e.to_string()))).into_response()
}

/// Index handler
async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(handlers::service_info(&state).await)
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(handlers::health_check())
}

/// Reload handler
async fn reload_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(handlers::reload(&state).await)
}

/// Manifest handler
async fn manifest_handler(State(state): State<AppState>, Path(ns): Path<String>) -> Response {
    match handlers::resolve_namespace(&ns) {
        Ok(kind) => Json(handlers::manifest(&state.config, kind)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Catalog handler, skip taken from the query string
async fn catalog_handler(
    State(state): State<AppState>,
    Path((ns, content_type, id)): Path<(String, String, String)>,
    Query(query): Query<SkipQuery>,
) -> Response {
    let skip = handlers::parse_skip(query.skip.as_deref());
    match handlers::catalog(&state, &ns, &content_type, &id, skip).await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Catalog handler, skip taken from the extra path segment
async fn catalog_extra_handler(
    State(state): State<AppState>,
    Path((ns, content_type, id, extra)): Path<(String, String, String, String)>,
) -> Response {
    let skip = handlers::skip_from_extra(&extra);
    match handlers::catalog(&state, &ns, &content_type, &id, skip).await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn not_found_handler() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Not found"))).into_response()
}
