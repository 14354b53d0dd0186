use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid JSON body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("could not read request body: {0}")]
    BodyUnreadable(String),

    #[error("not found")]
    NotFound,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::InvalidBody(_) | RelayError::BodyUnreadable(_) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
            RelayError::NotFound => not_found(),
        }
    }
}

/// Plain-text 404 used for unknown routes and unreadable files alike.
pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain")],
        "NOT FOUND",
    )
        .into_response()
}
