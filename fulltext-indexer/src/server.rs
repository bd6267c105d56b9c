//! HTTP endpoints of the indexer pool.
//!
//! Every endpoint takes a JSON body carrying the caller's token and tenant.
//! The token is decoded before any indexer is touched. Any failure is
//! logged and answered with `404` and an empty body.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::put;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::errors::IndexerError;
use crate::pool::IndexerPool;
use fulltext_indexer_shared::{
    Claims, FullTextSearchRequest, IndexDocumentsRequest, SearchRequest,
};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<IndexerPool>,
    pub secret: Arc<str>,
}

impl AppState {
    pub fn new(pool: Arc<IndexerPool>, secret: impl Into<Arc<str>>) -> Self {
        Self {
            pool,
            secret: secret.into(),
        }
    }

    fn authorize(&self, token: &str) -> Result<Claims, IndexerError> {
        Ok(Claims::decode(token, &self.secret)?)
    }
}

/// Build the router with all routes configured.
pub fn build_router(state: AppState) -> Router {
    let api_base: &str = "/api/v1";

    Router::new()
        .route(format!("{}/search", api_base).as_str(), put(search))
        .route(
            format!("{}/full-text-search", api_base).as_str(),
            put(full_text_search),
        )
        .route(
            format!("{}/index-documents", api_base).as_str(),
            put(index_documents),
        )
        .with_state(state)
        .layer(CorsLayer::very_permissive())
}

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), IndexerError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Indexer server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Indexer server stopped");
    Ok(())
}

fn not_found(endpoint: &str, error: IndexerError) -> Response {
    warn!(endpoint = endpoint, error = %error, "Request failed");
    StatusCode::NOT_FOUND.into_response()
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, IndexerError> {
    payload
        .map(|Json(request)| request)
        .map_err(|e| IndexerError::request(e.body_text()))
}

async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let request = body(payload)?;
        state.authorize(&request.token)?;

        let indexer = state.pool.get(&request.tenant).await?;
        let hits = indexer
            .search(&request.classes, &request.query, request.full_text_limit)
            .await?;
        debug!(tenant = %request.tenant, hits = hits.len(), "Search served");
        Ok::<_, IndexerError>(hits)
    }
    .await;

    match result {
        Ok(hits) => Json(hits).into_response(),
        Err(e) => not_found("search", e),
    }
}

async fn full_text_search(
    State(state): State<AppState>,
    payload: Result<Json<FullTextSearchRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let request = body(payload)?;
        state.authorize(&request.token)?;

        let indexer = state.pool.get(&request.tenant).await?;
        let result = indexer
            .full_text_search(&request.query, &request.options)
            .await?;
        Ok::<_, IndexerError>(result)
    }
    .await;

    match result {
        Ok(result) => Json(result).into_response(),
        Err(e) => not_found("full-text-search", e),
    }
}

async fn index_documents(
    State(state): State<AppState>,
    payload: Result<Json<IndexDocumentsRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let request = body(payload)?;
        state.authorize(&request.token)?;

        let count = request.requests.len();
        let indexer = state.pool.get(&request.tenant).await?;
        indexer.index(request.requests).await?;
        debug!(tenant = %request.tenant, count = count, "Transactions queued for indexing");
        Ok::<_, IndexerError>(())
    }
    .await;

    match result {
        Ok(()) => Json(json!({})).into_response(),
        Err(e) => not_found("index-documents", e),
    }
}
