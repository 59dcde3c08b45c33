use super::*;
use crate::routes::{asset_app, no_cache};
use crate::services::assets::{AssetError, FileAssetStore};
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records writes and can be told to fail.
#[derive(Default)]
struct MockStore {
    writes: Mutex<Vec<(String, String)>>,
    fail_writes: bool,
    fail_index: bool,
}

#[async_trait::async_trait]
impl AssetStore for MockStore {
    async fn write_asset(&self, name: &str, content: &str) -> Result<(), AssetError> {
        if self.fail_writes {
            return Err(AssetError::Write {
                name: name.to_owned(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.writes
            .lock()
            .expect("mock mutex should lock")
            .push((name.to_owned(), content.to_owned()));
        Ok(())
    }

    async fn get_index(&self) -> Result<Vec<String>, AssetError> {
        if self.fail_index {
            return Err(AssetError::Index(std::io::Error::other("gone")));
        }
        Ok(vec!["a.json".into(), "a.svg".into()])
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, AssetError> {
        Ok(PathBuf::from("/nonexistent").join(base_name(name)?))
    }
}

fn file_state(dir: &TempDir) -> AssetState {
    AssetState::new(Arc::new(FileAssetStore::new(dir.path())))
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn query(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
    Query(pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect())
}

// =============================================================================
// PURE HELPERS
// =============================================================================

#[test]
fn json_filename_replaces_svg_suffix() {
    assert_eq!(json_filename("drawing.svg"), "drawing.json");
    assert_eq!(json_filename("drawing"), "drawing.json");
    assert_eq!(json_filename("drawing.svg.svg"), "drawing.svg.json");
}

#[test]
fn content_type_follows_extension() {
    assert_eq!(content_type_for("a.svg"), "image/svg+xml");
    assert_eq!(content_type_for("a.json"), "application/json");
    assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    assert_eq!(content_type_for("noext"), "application/octet-stream");
}

#[test]
fn placeholder_renders_viewbox() {
    let params = HashMap::from([("width".to_owned(), "640".to_owned()), ("height".to_owned(), "480".to_owned())]);
    assert_eq!(
        placeholder_svg(&params).expect("svg"),
        r#"<svg viewBox="0,0,640,480" xmlns="http://www.w3.org/2000/svg"></svg>"#
    );
}

#[test]
fn placeholder_requires_integer_dimensions() {
    let params = HashMap::from([("width".to_owned(), "wide".to_owned())]);
    assert_eq!(
        placeholder_svg(&params).expect_err("bad width"),
        "Cannot build placeholder if width = 'wide'"
    );

    let params = HashMap::from([("width".to_owned(), "10".to_owned())]);
    assert_eq!(
        placeholder_svg(&params).expect_err("missing height"),
        "Cannot build placeholder if height = ''"
    );
}

#[test]
fn parse_rejects_empty_and_garbage() {
    assert_eq!(parse_post_request(b"").expect_err("empty"), ERROR_MISSING_BODY);
    assert_eq!(parse_post_request(b"  \n").expect_err("blank"), ERROR_MISSING_BODY);
    assert_eq!(parse_post_request(b"{not json").expect_err("garbage"), ERROR_FAILED_TO_PARSE);
    assert_eq!(parse_post_request(b"{}").expect_err("no command"), ERROR_FAILED_TO_PARSE);
}

// =============================================================================
// POST
// =============================================================================

#[tokio::test]
async fn store_writes_svg_and_json_companion() {
    let mock = MockStore::default();
    let request = parse_post_request(br#"{"store":{"filename":"dir/pic.svg","svg":"<svg/>","json":"{}"}}"#)
        .expect("parse");

    let response = apply_post_request(&mock, request).await;

    assert_eq!(response, PostResponse { store: Some(StoreResult::default()), index: None });
    let writes = mock.writes.lock().expect("lock").clone();
    assert_eq!(
        writes,
        vec![("pic.svg".to_owned(), "<svg/>".to_owned()), ("pic.json".to_owned(), "{}".to_owned())]
    );
}

#[tokio::test]
async fn store_failure_is_reported_in_body() {
    let mock = MockStore { fail_writes: true, ..MockStore::default() };
    let request = parse_post_request(br#"{"store":{"filename":"pic.svg"}}"#).expect("parse");

    let response = apply_post_request(&mock, request).await;
    let error = response.store.and_then(|s| s.error).expect("store error");
    assert_eq!(error, "Failed to write pic.svg: disk full");
}

#[tokio::test]
async fn index_failure_uses_fixed_message() {
    let mock = MockStore { fail_index: true, ..MockStore::default() };
    let request = parse_post_request(br#"{"index":{}}"#).expect("parse");

    let response = apply_post_request(&mock, request).await;
    assert_eq!(
        response.index,
        Some(IndexResult { error: Some("Failed to index the store.".into()), filenames: None })
    );
}

#[tokio::test]
async fn post_handler_stores_then_indexes() {
    let dir = TempDir::new().expect("tempdir");
    let body = Bytes::from_static(br#"{"store":{"filename":"pic.svg","svg":"<svg/>","json":"{}"},"index":{}}"#);

    let response = post_command(State(file_state(&dir)), body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "store": {}, "index": { "filenames": ["pic.json", "pic.svg"] } })
    );
}

#[tokio::test]
async fn post_handler_rejects_empty_body() {
    let dir = TempDir::new().expect("tempdir");
    let response = post_command(State(file_state(&dir)), Bytes::new()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, ERROR_MISSING_BODY);
}

// =============================================================================
// GET
// =============================================================================

#[tokio::test]
async fn get_serves_stored_file_with_content_type() {
    let dir = TempDir::new().expect("tempdir");
    tokio::fs::write(dir.path().join("pic.svg"), "<svg/>").await.expect("seed");

    let response = get_asset(State(file_state(&dir)), Path("nested/pic.svg".into()), query(&[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/svg+xml");
    assert_eq!(body_text(response).await, "<svg/>");
}

#[tokio::test]
async fn get_missing_file_is_404() {
    let dir = TempDir::new().expect("tempdir");
    let response = get_asset(State(file_state(&dir)), Path("nope.json".into()), query(&[])).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_placeholder_renders_without_touching_store() {
    let state = AssetState::new(Arc::new(MockStore::default()));
    let response = get_asset(
        State(state),
        Path("any/placeholder.svg".into()),
        query(&[("width", "3"), ("height", "4")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        r#"<svg viewBox="0,0,3,4" xmlns="http://www.w3.org/2000/svg"></svg>"#
    );
}

#[tokio::test]
async fn get_placeholder_without_size_is_400() {
    let state = AssetState::new(Arc::new(MockStore::default()));
    let response = get_asset(State(state), Path("placeholder.svg".into()), query(&[])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_are_marked_no_cache() {
    let dir = TempDir::new().expect("tempdir");
    tokio::fs::write(dir.path().join("pic.json"), "{}").await.expect("seed");

    let response = get_asset(State(file_state(&dir)), Path("pic.json".into()), query(&[])).await;
    let response = no_cache(response).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], HeaderValue::from_static("no-cache"));
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
}

#[test]
fn asset_router_builds() {
    let dir = TempDir::new().expect("tempdir");
    let _router = asset_app(file_state(&dir));
}
