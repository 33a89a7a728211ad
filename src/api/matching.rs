//! Catalogue matching API routes
//!
//! `/match` scores arbitrary metadata without touching storage; the
//! track-scoped variants persist linkage or suggestions, and confirm-match
//! applies a user's explicit choice.

use actix_web::{post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{AppState, ApiError};
use crate::core::matcher::MatchInput;
use crate::db::tables::TrackTable;
use crate::utils::auth::CurrentUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmMatchBody {
    pub recording_mbid: Uuid,
    #[serde(default)]
    pub artist_mbid: Option<Uuid>,
    #[serde(default)]
    pub release_mbid: Option<Uuid>,
}

/// Score metadata against the catalogue without persisting anything
#[post("")]
pub async fn match_metadata(
    _user: CurrentUser,
    state: web::Data<AppState>,
    body: web::Json<MatchInput>,
) -> Result<impl Responder, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".to_string()));
    }

    let output = state
        .matcher
        .match_metadata(&body, &CancellationToken::new())
        .await?;
    Ok(HttpResponse::Ok().json(output))
}

/// Re-run the auto-matcher for a stored track and persist the outcome
#[post("/{track_id}/match")]
pub async fn match_track(
    _user: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<impl Responder, ApiError> {
    let track = TrackTable::get_by_id(path.into_inner()).await?;
    let output = state
        .matcher
        .match_track(&track, &CancellationToken::new())
        .await?;
    Ok(HttpResponse::Ok().json(output))
}

/// Apply a user-confirmed catalogue linkage
#[post("/{track_id}/confirm-match")]
pub async fn confirm_match(
    _user: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<ConfirmMatchBody>,
) -> Result<impl Responder, ApiError> {
    let track_id = path.into_inner();
    let track = state
        .matcher
        .confirm(
            track_id,
            body.recording_mbid,
            body.artist_mbid,
            body.release_mbid,
            &CancellationToken::new(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "trackId": track.id,
        "verified": track.mb_verified,
    })))
}

/// Configure the standalone match route
pub fn configure_match(cfg: &mut web::ServiceConfig) {
    cfg.service(match_metadata);
}

/// Configure the track-scoped matching routes
pub fn configure_tracks(cfg: &mut web::ServiceConfig) {
    cfg.service(match_track).service(confirm_match);
}
