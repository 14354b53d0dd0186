use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;

use crate::AppState;
use crate::clock::SystemClock;
use crate::config::{FileConfig, RelayConfig};
use crate::session::SessionSnapshot;

/// Build a fully-wired `AppState` whose files and UI roots live in a temp
/// directory (`<tmp>/src` and `<tmp>/ui`).
///
/// Returns `(AppState, TempDir)`; callers **must** hold the `TempDir` for the
/// lifetime of the test.
pub fn test_app_state() -> (AppState, tempfile::TempDir) {
    test_app_state_with(|_| {})
}

/// Like `test_app_state`, with a hook to adjust the file config first.
pub fn test_app_state_with(
    adjust: impl FnOnce(&mut FileConfig),
) -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(tmp.path().join("src")).expect("files root");
    std::fs::create_dir_all(tmp.path().join("ui")).expect("ui root");

    let mut fc = FileConfig::default();
    fc.files.root = tmp.path().join("src");
    fc.ui.root = tmp.path().join("ui");
    adjust(&mut fc);

    let state = AppState::new(RelayConfig::from_file(&fc), Arc::new(SystemClock));
    (state, tmp)
}

/// A request carrying the address/user-agent pair used by the mobile tests.
pub fn mobile_request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "10.0.0.1")
        .header("user-agent", "TestAgent 1.0")
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap()
}

/// Target id the registry assigns to `mobile_request` traffic.
pub const MOBILE_TARGET: &str = "10.0.0.1-TestAgent-1.0";

pub fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap()
}

pub async fn body_bytes(resp: Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Poll the registry until `check` holds for `target_id`'s snapshot.
pub async fn wait_for_target(
    state: &AppState,
    target_id: &str,
    check: impl Fn(&SessionSnapshot) -> bool,
) {
    for _ in 0..200 {
        if let Some(session) = state.registry.get(target_id).await {
            if check(&session.snapshot().await) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("target {target_id} never reached the expected state");
}
