use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::not_found;
use crate::files::{Breakpoint, resolve_within};

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<String>,
}

#[derive(Serialize)]
pub struct FileDataResponse {
    pub data: String,
    pub breakpoints: Vec<Breakpoint>,
}

pub async fn list_files(State(state): State<AppState>) -> Response {
    let catalog = state.catalog.clone();
    match tokio::task::spawn_blocking(move || catalog.list()).await {
        Ok(files) => Json(FileListResponse { files }).into_response(),
        Err(e) => {
            warn!("File listing task failed: {}", e);
            Json(FileListResponse { files: Vec::new() }).into_response()
        }
    }
}

/// Contents of one debuggable file plus its breakpoint metadata.
pub async fn file_data(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let Some(resolved) = resolve_within(state.catalog.root(), &path) else {
        debug!(path = %path, "Rejected file request");
        return not_found();
    };

    let bytes = match tokio::fs::read(&resolved).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path, "Failed to read file: {}", e);
            return not_found();
        }
    };
    let data = String::from_utf8_lossy(&bytes).into_owned();

    let source = state.breakpoints.clone();
    let breakpoints = tokio::task::spawn_blocking(move || source.breakpoints(&path))
        .await
        .unwrap_or_default();

    Json(FileDataResponse { data, breakpoints }).into_response()
}
