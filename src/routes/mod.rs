//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The process serves two independent routers on two ports: the message
//! service (websocket upgrade plus health and stats) and the vector asset
//! service (store, index and file reads). Both allow any origin.

pub mod assets;
pub mod ws;

use axum::Router;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::{AppState, AssetState};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Message service: `GET /` upgrades to the drawing-event websocket.
pub fn message_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .route("/stats", get(ws::stats))
        .layer(cors())
        .with_state(state)
}

/// Asset service: `POST /` for store/index commands, `GET /{*path}` for files.
pub fn asset_app(state: AssetState) -> Router {
    Router::new()
        .route("/", post(assets::post_command))
        .route("/{*path}", get(assets::get_asset))
        .layer(axum::middleware::map_response(no_cache))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

async fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
