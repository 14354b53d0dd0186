pub mod files;
pub mod relay;
pub mod ui;

// Re-export all handlers for easy route registration
pub use files::{file_data, list_files};
pub use relay::relay_handler;
pub use ui::{fallback, targets_index};

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Any `OPTIONS` request is answered with an empty 200 before routing.
pub async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}
