//! HTTP surface: event ingestion plus the toggle, destination and state
//! admin endpoints.
//!
//! Ingestion always answers `202 Accepted` before any processing happens;
//! the event then runs on a blocking task inside its own `event` span.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::{DestinationBook, DestinationSnapshot};
use crate::engine::AlertEngine;
use crate::error::AppError;
use crate::inbound::extract_inbound;
use crate::model::state::StateSummary;
use crate::toggle_store::AlertToggleStore;

pub struct AppContext {
    pub engine: Arc<AlertEngine>,
    pub toggles: AlertToggleStore,
    pub destinations: Arc<DestinationBook>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match &err {
            AppError::InvalidDestination { .. } => StatusCode::BAD_REQUEST,
            AppError::ProtectedDestination(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook/sms", post(ingest))
        .route("/toggles/{symbol}", get(get_toggles).put(put_toggles))
        .route("/toggles/{symbol}/defaults", post(seed_toggle_defaults))
        .route("/destinations", get(list_destinations))
        .route(
            "/destinations/{symbol}",
            put(put_destination).delete(delete_destination),
        )
        .route("/states", get(list_states))
        .route("/states/{symbol}/summary", get(state_summary))
        .with_state(ctx)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ingest(State(ctx): State<Arc<AppContext>>, body: String) -> impl IntoResponse {
    let arrived_at = Utc::now();
    let inbound = extract_inbound(&body);
    let event_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    let observed_at = inbound.timestamp.unwrap_or(arrived_at);

    let span = tracing::info_span!("event", event_id = %event_id, sender = %inbound.sender);
    let engine = Arc::clone(&ctx.engine);
    let message = inbound.message;
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        tracing::info!(len = message.len(), "Event received");
        let outcome = engine.process(&message, observed_at, Utc::now());
        tracing::debug!(outcome = ?outcome, "Event processed");
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "event_id": event_id })),
    )
}

async fn get_toggles(
    State(ctx): State<Arc<AppContext>>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let toggles = ctx.toggles.get(&symbol)?;
    Ok(Json(json!({
        "symbol": symbol.to_ascii_uppercase(),
        "toggles": toggles,
    })))
}

async fn put_toggles(
    State(ctx): State<Arc<AppContext>>,
    Path(symbol): Path<String>,
    Json(updates): Json<BTreeMap<String, bool>>,
) -> Result<Json<Value>, ApiError> {
    let toggles = ctx.toggles.set_many(&symbol, &updates)?;
    Ok(Json(json!({
        "symbol": symbol.to_ascii_uppercase(),
        "toggles": toggles,
    })))
}

async fn seed_toggle_defaults(
    State(ctx): State<Arc<AppContext>>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let seeded = ctx.toggles.ensure_defaults(&symbol)?;
    let toggles = ctx.toggles.get(&symbol)?;
    Ok(Json(json!({
        "symbol": symbol.to_ascii_uppercase(),
        "seeded": seeded,
        "toggles": toggles,
    })))
}

async fn list_destinations(State(ctx): State<Arc<AppContext>>) -> Json<DestinationSnapshot> {
    Json(ctx.destinations.snapshot())
}

#[derive(Debug, Deserialize)]
struct DestinationBody {
    url: String,
}

async fn put_destination(
    State(ctx): State<Arc<AppContext>>,
    Path(symbol): Path<String>,
    Json(body): Json<DestinationBody>,
) -> Result<Json<Value>, ApiError> {
    let replaced = ctx.destinations.set(&symbol, &body.url)?;
    Ok(Json(json!({
        "symbol": symbol,
        "replaced": replaced,
    })))
}

async fn delete_destination(
    State(ctx): State<Arc<AppContext>>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiError> {
    if ctx.destinations.remove(&symbol)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no destination for {}", symbol)))
    }
}

async fn list_states(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    let states = ctx.engine.states().all_states()?;
    Ok(Json(json!({ "count": states.len(), "states": states })))
}

async fn state_summary(
    State(ctx): State<Arc<AppContext>>,
    Path(symbol): Path<String>,
) -> Result<Json<StateSummary>, ApiError> {
    Ok(Json(ctx.engine.states().summary(&symbol)?))
}
