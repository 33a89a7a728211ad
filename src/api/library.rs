//! Library API routes
//!
//! A user's library is a set of ownership relations over shared tracks.
//! The listing endpoint carries the full filter surface: pagination, sort
//! key and direction, substring search, verified-only filtering and an
//! optional field projection.

use actix_web::{delete, get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::api::ApiError;
use crate::db::tables::{LibraryQuery, LibrarySort, LibraryTable, SortOrder, TrackTable};
use crate::models::Track;
use crate::utils::auth::CurrentUser;
use crate::utils::dates::format_iso8601;

const DEFAULT_LIMIT: i64 = 20;

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct LibraryListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub sort: LibrarySort,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub mb_verified: Option<bool>,
    /// Comma-separated projection of track fields
    #[serde(default)]
    pub fields: Option<String>,
}

/// Serialize a track, keeping only the requested fields when a projection
/// was asked for. Unknown field names are ignored.
fn project_track(track: &Track, fields: &Option<Vec<String>>) -> serde_json::Value {
    let mut value = serde_json::to_value(track).unwrap_or(json!({}));
    if let (Some(fields), Some(map)) = (fields, value.as_object_mut()) {
        map.retain(|key, _| fields.iter().any(|f| f == key));
    }
    value
}

/// List the caller's library
#[get("")]
pub async fn list_library(
    user: CurrentUser,
    query: web::Query<LibraryListQuery>,
) -> Result<impl Responder, ApiError> {
    let fields: Option<Vec<String>> = query.fields.as_ref().map(|raw| {
        raw.split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    });

    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let (tracks, total) = LibraryTable::list(
        user.0.id,
        &LibraryQuery {
            limit,
            offset,
            sort: query.sort,
            order: query.order,
            q: query.q.clone(),
            mb_verified: query.mb_verified,
        },
    )
    .await?;

    let tracks: Vec<serde_json::Value> =
        tracks.iter().map(|t| project_track(t, &fields)).collect();

    Ok(HttpResponse::Ok().json(json!({
        "tracks": tracks,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

/// Add a track to the caller's library
#[post("/tracks/{track_id}")]
pub async fn add_library_track(
    user: CurrentUser,
    path: web::Path<i64>,
) -> Result<impl Responder, ApiError> {
    let track_id = path.into_inner();

    // 404 for an unknown track, 409 for a duplicate entry
    let track = TrackTable::get_by_id(track_id).await?;
    let entry = LibraryTable::add(user.0.id, track.id).await?;

    Ok(HttpResponse::Created().json(json!({
        "track_id": entry.track_id,
        "added_at": format_iso8601(&entry.added_at),
    })))
}

/// Remove a track from the caller's library. The track itself stays.
#[delete("/tracks/{track_id}")]
pub async fn remove_library_track(
    user: CurrentUser,
    path: web::Path<i64>,
) -> Result<impl Responder, ApiError> {
    LibraryTable::remove(user.0.id, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure library routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_library)
        .service(add_library_track)
        .service(remove_library_track);
}
