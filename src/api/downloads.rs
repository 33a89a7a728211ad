//! Download API routes
//!
//! Submitting a URL enqueues a job; the rest of the surface is read-only
//! job inspection plus a live progress stream over SSE.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::{AppState, ApiError};
use crate::models::SourceType;
use crate::utils::auth::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct SubmitDownloadBody {
    pub url: String,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    /// Opaque metadata scraped from the source page; may carry a
    /// MusicBrainz recording hint under `mb_recording_id` / `recordingMbid`
    #[serde(default)]
    pub page_metadata: Option<serde_json::Value>,
}

fn recording_hint(page_metadata: &Option<serde_json::Value>) -> Option<Uuid> {
    let meta = page_metadata.as_ref()?;
    ["mb_recording_id", "recordingMbid"]
        .iter()
        .find_map(|key| meta.get(key))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Submit a URL for ingestion
#[post("")]
pub async fn submit_download(
    user: CurrentUser,
    state: web::Data<AppState>,
    body: web::Json<SubmitDownloadBody>,
) -> Result<impl Responder, ApiError> {
    let url = body.url.trim();
    if url.is_empty() {
        return Err(ApiError::Validation("url is required".to_string()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ApiError::Validation("url must be http(s)".to_string()));
    }

    let source_type = body
        .source_type
        .or_else(|| SourceType::from_url(url))
        .ok_or_else(|| {
            ApiError::Validation("source_type missing and not derivable from url".to_string())
        })?;

    let hint = recording_hint(&body.page_metadata);
    let job = state
        .queue
        .enqueue(user.0.id, url, source_type, hint)
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "job_id": job.id,
        "status": job.status,
    })))
}

/// All of the caller's jobs, newest first
#[get("")]
pub async fn list_downloads(
    user: CurrentUser,
    state: web::Data<AppState>,
) -> Result<impl Responder, ApiError> {
    let jobs = state.queue.list_user_jobs(user.0.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "jobs": jobs })))
}

/// Live progress stream for the caller's jobs, as server-sent events
#[get("/events")]
pub async fn progress_events(
    user: CurrentUser,
    state: web::Data<AppState>,
) -> Result<impl Responder, ApiError> {
    let subscription = state.fanout.subscribe(user.0.id);

    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        let job = subscription.recv().await?;
        let payload = serde_json::to_string(&job).unwrap_or_default();
        let event = web::Bytes::from(format!("data: {}\n\n", payload));
        Some((Ok::<_, actix_web::Error>(event), subscription))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

/// A single job, visible to its owner only
#[get("/{job_id}")]
pub async fn get_download(
    user: CurrentUser,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ApiError> {
    let job_id = path.into_inner();
    let job = state.queue.get_job(&job_id).await?;
    if job.user_id != user.0.id {
        return Err(ApiError::NotFound(format!("job {}", job_id)));
    }
    Ok(HttpResponse::Ok().json(job))
}

/// Configure download routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(submit_download)
        .service(list_downloads)
        .service(progress_events)
        .service(get_download);
}
