//! REST API routes for soundsink

pub mod downloads;
pub mod error;
pub mod library;
pub mod matching;
pub mod stream;

use std::sync::Arc;

use actix_web::{get, web, HttpResponse, Responder};

pub use error::ApiError;

use crate::core::AutoMatcher;
use crate::queue::{JobQueue, ProgressFanout};
use crate::storage::ObjectStore;

/// Shared service handles injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobQueue>,
    pub fanout: Arc<ProgressFanout>,
    pub matcher: Arc<AutoMatcher>,
    pub storage: Arc<dyn ObjectStore>,
}

/// Liveness probe
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Download pipeline routes
        .service(web::scope("/downloads").configure(downloads::configure))
        // Library routes
        .service(web::scope("/library").configure(library::configure))
        // Standalone matching route
        .service(web::scope("/match").configure(matching::configure_match))
        // Track-scoped matching routes
        .service(web::scope("/tracks").configure(matching::configure_tracks))
        // Audio streaming routes
        .service(web::scope("/stream").configure(stream::configure))
        // Health probe
        .service(health);
}

/// Map malformed JSON bodies and bad query strings onto the standard
/// `{code, message}` error shape instead of actix's default text bodies.
pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    ApiError::Validation(err.to_string()).into()
}

pub fn query_error_handler(
    err: actix_web::error::QueryPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    ApiError::Validation(err.to_string()).into()
}
