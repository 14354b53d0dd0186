// Library interface for debug_relay
// Exposes the relay router so it can be embedded in other servers.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod files;
pub mod handlers;
pub mod identity;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod views;

#[cfg(test)]
mod test_helpers;

pub use config::RelayConfig;
pub use dispatcher::{Delivery, Dispatcher};
pub use registry::SessionRegistry;
pub use session::Session;

use axum::{
    Router,
    http::{HeaderValue, header},
    middleware,
    routing::any,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::clock::Clock;
use crate::files::{BreakpointSource, FileCatalog, NoBreakpoints, StatementScanner};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<RelayConfig>,
    /// Enumerates debuggable files
    pub catalog: Arc<FileCatalog>,
    /// Breakpoint metadata for `/files/data`
    pub breakpoints: Arc<dyn BreakpointSource>,
}

impl AppState {
    pub fn new(config: RelayConfig, clock: Arc<dyn Clock>) -> Self {
        let catalog = FileCatalog::new(config.files_root.clone(), config.file_extensions.clone());
        let breakpoints: Arc<dyn BreakpointSource> = if config.breakpoints {
            Arc::new(StatementScanner::new(config.files_root.clone()))
        } else {
            Arc::new(NoBreakpoints)
        };
        Self {
            registry: Arc::new(SessionRegistry::new(clock)),
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            breakpoints,
        }
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// Build the complete relay router: protocol endpoints, file endpoints,
/// target listing and UI assets.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Mobile runtime
        .route("/mobile/init", any(handlers::relay_handler))
        .route("/mobile/console", any(handlers::relay_handler))
        .route("/mobile/breakpoint", any(handlers::relay_handler))
        .route("/mobile/incoming", any(handlers::relay_handler))
        // Debugger UI
        .route("/desktop/outgoing", any(handlers::relay_handler))
        .route("/desktop/incoming", any(handlers::relay_handler))
        // Debuggable files
        .route("/files/list", any(handlers::list_files))
        .route("/files/data/{*path}", any(handlers::file_data))
        // Target listing
        .route("/", any(handlers::targets_index))
        .route("/ui", any(handlers::targets_index))
        .route("/ui/", any(handlers::targets_index))
        // UI assets and everything else
        .fallback(handlers::fallback)
        .layer(middleware::from_fn(handlers::answer_options))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}
