//! Audio streaming route
//!
//! Serves stored blobs back out under the same `/stream/{key}` URLs the
//! object store hands to tracks.

use actix_web::{get, web, HttpResponse, Responder};

use crate::api::{AppState, ApiError};
use crate::storage::StorageError;
use crate::utils::auth::CurrentUser;

#[get("/{key:.*}")]
pub async fn stream_audio(
    _user: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ApiError> {
    let key = path.into_inner();

    let data = state.storage.get(&key).await.map_err(|e| match e {
        StorageError::NotFound(key) => ApiError::NotFound(key),
        StorageError::InvalidKey(key) => ApiError::Validation(format!("bad key: {}", key)),
        StorageError::Io(err) => {
            tracing::error!("storage read failed: {}", err);
            ApiError::Internal
        }
    })?;

    let content_type = mime_guess::from_path(&key)
        .first_or_octet_stream()
        .to_string();

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(("Accept-Ranges", "bytes"))
        .body(data))
}

/// Configure streaming routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(stream_audio);
}
