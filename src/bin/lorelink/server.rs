//! HTTP API over the suggestion service and link store.
//!
//! Routes:
//! - `POST /entities/:id/suggest?mode=preview|apply&variant=link|tag`
//! - `POST /entities/:id/resync`
//! - `GET /entities/:id/backlinks`
//! - `GET /entities/:id/links`
//! - `GET /entities/:id/tagged`
//! - `POST /links/resolve` with `{"ids": [...]}`
//! - `POST /worlds/:world/preview` with `{"text": "...", "exclude": id?, "variant": "link"|"tag"}`

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lorelink::{
    db::SqliteStore,
    graph::SyncReport,
    properties::{Backlink, EntityId, OutgoingLink, ResolvedTarget, WorldId},
    store::LinkStore,
    suggest::{ReferenceSuggestionService, RewriteResult, SuggestionMode, SuggestionVariant},
    LinkGraphError,
};
use serde::Deserialize;
use std::{future::Future, net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;

type SharedService = Arc<ReferenceSuggestionService<SqliteStore>>;

/// Error wrapper carrying the library error's status code to the client.
pub struct ApiError(LinkGraphError);

impl From<LinkGraphError> for ApiError {
    fn from(err: LinkGraphError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!("[ApiServer] {}", self.0);
        } else {
            tracing::debug!("[ApiServer] {}", self.0);
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
            "detail": self.0,
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SuggestParams {
    mode: SuggestionMode,
    variant: SuggestionVariant,
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    ids: Vec<EntityId>,
}

#[derive(Debug, Deserialize)]
struct DraftRequest {
    text: String,
    #[serde(default)]
    exclude: Option<EntityId>,
    #[serde(default)]
    variant: SuggestionVariant,
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/entities/:id/suggest", post(suggest_handler))
        .route("/entities/:id/resync", post(resync_handler))
        .route("/entities/:id/backlinks", get(backlinks_handler))
        .route("/entities/:id/links", get(links_handler))
        .route("/entities/:id/tagged", get(tagged_handler))
        .route("/links/resolve", post(resolve_handler))
        .route("/worlds/:world/preview", post(draft_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serves the API on `addr` until `shutdown_signal` resolves.
pub async fn serve(
    service: SharedService,
    addr: SocketAddr,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("lorelink API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(service).into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("lorelink API shut down");
    Ok(())
}

async fn suggest_handler(
    State(service): State<SharedService>,
    Path(id): Path<EntityId>,
    Query(params): Query<SuggestParams>,
) -> ApiResult<RewriteResult> {
    let result = service.suggest(id, params.variant, params.mode).await?;
    Ok(Json(result))
}

async fn resync_handler(
    State(service): State<SharedService>,
    Path(id): Path<EntityId>,
) -> ApiResult<SyncReport> {
    Ok(Json(service.resync(id).await?))
}

async fn backlinks_handler(
    State(service): State<SharedService>,
    Path(id): Path<EntityId>,
) -> ApiResult<Vec<Backlink>> {
    Ok(Json(service.store().backlinks(id).await?))
}

async fn links_handler(
    State(service): State<SharedService>,
    Path(id): Path<EntityId>,
) -> ApiResult<Vec<OutgoingLink>> {
    if service.store().entity(id).await?.is_none() {
        return Err(LinkGraphError::NotFound(format!("entity {id}")).into());
    }
    Ok(Json(service.store().outgoing(id).await?))
}

async fn tagged_handler(
    State(service): State<SharedService>,
    Path(id): Path<EntityId>,
) -> ApiResult<Vec<Backlink>> {
    Ok(Json(service.store().tag_backlinks(id).await?))
}

async fn resolve_handler(
    State(service): State<SharedService>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Vec<ResolvedTarget>> {
    Ok(Json(service.store().resolve(&request.ids).await?))
}

async fn draft_handler(
    State(service): State<SharedService>,
    Path(world): Path<WorldId>,
    Json(request): Json<DraftRequest>,
) -> ApiResult<RewriteResult> {
    let result = service
        .suggest_text(world, request.exclude, &request.text, request.variant)
        .await?;
    Ok(Json(result))
}
