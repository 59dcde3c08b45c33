//! Asset routes — store/index commands and file reads.
//!
//! DESIGN
//! ======
//! `POST /` carries a JSON command envelope naming `store`, `index`, or
//! both. Command failures are reported inside the response body with status
//! 200; only an empty or unparsable body is a 400. `GET /{*path}` serves the
//! final path component from the store, except `placeholder.svg`, which is
//! rendered from `width`/`height` query parameters.

use std::collections::HashMap;
use std::io::ErrorKind;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::services::assets::{AssetStore, base_name};
use crate::state::AssetState;

pub const ERROR_MISSING_BODY: &str = "Missing request body.";
pub const ERROR_FAILED_TO_PARSE: &str = "Failed to parse body.";

const PLACEHOLDER_NAME: &str = "placeholder.svg";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    #[serde(default)]
    pub store: Option<StoreCommand>,
    #[serde(default)]
    pub index: Option<IndexCommand>,
}

#[derive(Debug, Deserialize)]
pub struct StoreCommand {
    pub filename: String,
    #[serde(default)]
    pub svg: String,
    #[serde(default)]
    pub json: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexCommand {}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct PostResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexResult>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StoreResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct IndexResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filenames: Option<Vec<String>>,
}

// =============================================================================
// POST
// =============================================================================

pub async fn post_command(State(state): State<AssetState>, body: Bytes) -> Response {
    let request = match parse_post_request(&body) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = msg, "assets: rejected post");
            return (StatusCode::BAD_REQUEST, msg).into_response();
        }
    };

    Json(apply_post_request(state.store.as_ref(), request).await).into_response()
}

/// # Errors
///
/// Returns the message sent back with a 400 when the body is empty or is not
/// a command envelope naming at least one command.
pub fn parse_post_request(body: &[u8]) -> Result<PostRequest, &'static str> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ERROR_MISSING_BODY);
    }
    let request: PostRequest = serde_json::from_slice(body).map_err(|_| ERROR_FAILED_TO_PARSE)?;
    if request.store.is_none() && request.index.is_none() {
        return Err(ERROR_FAILED_TO_PARSE);
    }
    Ok(request)
}

pub async fn apply_post_request(store: &dyn AssetStore, request: PostRequest) -> PostResponse {
    let mut response = PostResponse::default();

    if let Some(command) = request.store {
        let error = store_drawing(store, &command).await.err();
        response.store = Some(StoreResult { error });
    }

    if request.index.is_some() {
        response.index = Some(match store.get_index().await {
            Ok(filenames) => IndexResult { error: None, filenames: Some(filenames) },
            Err(e) => IndexResult { error: Some(e.to_string()), filenames: None },
        });
    }

    response
}

async fn store_drawing(store: &dyn AssetStore, command: &StoreCommand) -> Result<(), String> {
    let svg_name = base_name(&command.filename).map_err(|e| e.to_string())?;
    let json_name = json_filename(svg_name);

    store.write_asset(svg_name, &command.svg).await.map_err(|e| e.to_string())?;
    store.write_asset(&json_name, &command.json).await.map_err(|e| e.to_string())
}

/// Companion JSON name: a trailing `.svg` becomes `.json`.
#[must_use]
pub fn json_filename(svg_name: &str) -> String {
    format!("{}.json", svg_name.strip_suffix(".svg").unwrap_or(svg_name))
}

// =============================================================================
// GET
// =============================================================================

pub async fn get_asset(
    State(state): State<AssetState>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Ok(name) = base_name(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if name == PLACEHOLDER_NAME {
        return match placeholder_svg(&params) {
            Ok(svg) => ([(CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
            Err(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        };
    }

    let Ok(file) = state.store.path_for(name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(content) => ([(CONTENT_TYPE, content_type_for(name))], content).into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(path = %file.display(), error = %e, "assets: read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// # Errors
///
/// Returns the 400 message when `width` or `height` is missing or not an integer.
pub fn placeholder_svg(params: &HashMap<String, String>) -> Result<String, String> {
    let dimension = |key: &str| {
        let raw = params.get(key).map_or("", String::as_str);
        raw.parse::<u32>()
            .map_err(|_| format!("Cannot build placeholder if {key} = '{raw}'"))
    };
    let width = dimension("width")?;
    let height = dimension("height")?;
    Ok(format!(
        r#"<svg viewBox="0,0,{width},{height}" xmlns="http://www.w3.org/2000/svg"></svg>"#
    ))
}

#[must_use]
pub fn content_type_for(name: &str) -> &'static str {
    match std::path::Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "assets_test.rs"]
mod tests;
