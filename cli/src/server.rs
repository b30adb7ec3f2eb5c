//! Payload lookup endpoint.
//!
//! `GET /opreturn/:payload_hex` returns every stored record whose payload
//! matches, as `[{ txhash, blockhash, op_return }]`, or 404 when nothing
//! does. The hex may be the bare payload or a full OP_RETURN output script.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use opindex_core::{payload_from_hex, RecordStore, RecordView};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn RecordStore>,
}

pub fn router(store: Arc<dyn RecordStore>) -> Router {
    Router::new()
        .route("/opreturn/:payload_hex", get(query_payload))
        .fallback(not_found)
        .with_state(AppState { store })
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    store: Arc<dyn RecordStore>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(%addr, "Query endpoint listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("query endpoint failed")
}

async fn query_payload(
    State(state): State<AppState>,
    Path(payload_hex): Path<String>,
) -> Response {
    let Ok(payload) = payload_from_hex(&payload_hex) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid payload hex");
    };

    match state.store.query_by_payload(&payload).await {
        Ok(records) if records.is_empty() => error_response(StatusCode::NOT_FOUND, "Not Found"),
        Ok(records) => {
            let views: Vec<RecordView> = records.iter().map(|r| r.view()).collect();
            Json(views).into_response()
        }
        Err(e) => {
            error!(error = %e, payload = %payload_hex, "Payload lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
