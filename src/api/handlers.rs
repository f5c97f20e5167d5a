use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use log::warn;

use crate::api::params::{replay, ReplayParams};
use crate::data::{Hub, PriceReading, TtlStore};
use crate::errors::ErrorPayload;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<TtlStore<PriceReading>>,
    pub hub: Arc<Hub>,
}

// GET /api/prices?since=<ns> - Replay stored readings
pub async fn get_prices(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<PriceReading>>, (StatusCode, Json<ErrorPayload>)> {
    let params = ReplayParams::from_query(query.as_deref()).map_err(|e| {
        warn!("Rejected price replay request: {}", e);
        (StatusCode::BAD_REQUEST, Json(ErrorPayload::from(&e)))
    })?;

    Ok(Json(replay(&state.store, params.since)))
}

// GET /api/health - Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "price_stream",
        "subscribers": state.hub.len().await,
        "stored_prices": state.store.len(),
        "timestamp": chrono::Utc::now()
    }))
}

// Create the API router
pub fn create_api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/prices", get(get_prices))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}
