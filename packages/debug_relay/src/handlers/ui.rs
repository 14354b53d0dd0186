use axum::{
    body::Body,
    extract::{Request, State},
    response::{Html, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use crate::AppState;
use crate::error::not_found;
use crate::files::resolve_within;
use crate::views;

/// `/`, `/ui` and `/ui/`: every known target with a link into the debugger.
pub async fn targets_index(State(state): State<AppState>) -> Html<String> {
    let targets = state.registry.snapshots().await;
    Html(views::targets_page(&targets, state.registry.now()).into_string())
}

/// Serves `/ui/<path>` out of the UI root; everything else is a 404.
pub async fn fallback(State(state): State<AppState>, request: Request) -> Response {
    let Some(relative) = request.uri().path().strip_prefix("/ui/") else {
        return not_found();
    };
    let Ok(relative) = urlencoding::decode(relative) else {
        return not_found();
    };
    let Some(path) = resolve_within(&state.config.ui_root, &relative) else {
        debug!(path = %relative, "UI asset not found");
        return not_found();
    };

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
