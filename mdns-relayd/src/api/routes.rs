use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::protocol::{WireService, WS_PATH};
use shared::types::FullName;
use crate::api::socket::ws_handler;
use crate::relay::RelayHandle;

#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(WS_PATH, get(ws_handler))
        .route("/v1/services", get(get_services))
        .route("/v1/services/:fullname", get(get_service))
        .with_state(state)
}

async fn get_services(
    State(state): State<AppState>,
) -> Result<Json<Vec<WireService>>, StatusCode> {
    state
        .relay
        .snapshot()
        .await
        .map(|entries| Json(entries.iter().map(WireService::from).collect()))
        .map_err(|e| {
            tracing::error!("Failed to query services: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_service(
    State(state): State<AppState>,
    Path(fullname): Path<String>,
) -> Result<Json<WireService>, StatusCode> {
    state
        .relay
        .get_one(FullName::new(fullname))
        .await
        .map_err(|e| {
            tracing::error!("Failed to query service: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(|entry| Json(WireService::from(&entry)))
        .ok_or(StatusCode::NOT_FOUND)
}
