//! Download job model
//!
//! A DownloadJob is the durable unit of work flowing through the shared
//! queue. The record itself lives in the job store as JSON; this module owns
//! the state-transition and progress rules applied on every update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{JobStatus, SourceType};
use crate::utils::dates;

/// A single ingest attempt identified by an opaque id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: String,
    pub user_id: i64,
    pub url: String,
    pub source_type: SourceType,
    pub status: JobStatus,
    /// Percent complete in [0, 100], monotonic within one attempt
    pub progress: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Optional MusicBrainz recording hint supplied at submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_recording_id: Option<Uuid>,
    #[serde(with = "dates::iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "dates::iso8601")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "dates::iso8601_option", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "dates::iso8601_option", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Illegal state-machine step
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl DownloadJob {
    /// Create a fresh job in `queued` with a random id
    pub fn new(
        user_id: i64,
        url: String,
        source_type: SourceType,
        mb_recording_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            url,
            source_type,
            status: JobStatus::Queued,
            progress: 0.0,
            error: None,
            retry_count: 0,
            mb_recording_id,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a status update in place, enforcing the state machine and
    /// progress monotonicity.
    ///
    /// Rules:
    /// - the transition must be legal per [`JobStatus::can_transition_to`];
    /// - re-asserting the current status never lowers progress;
    /// - entering `downloading` stamps `started_at` once per attempt;
    /// - entering `complete` or `failed` stamps `completed_at`;
    /// - entering `failed` keeps the stored progress and records the error.
    pub fn apply_update(
        &mut self,
        status: JobStatus,
        progress: f64,
        error: Option<&str>,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(status) {
            return Err(InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        let clamped = progress.clamp(0.0, 100.0);
        if status == self.status {
            self.progress = self.progress.max(clamped);
        } else if status == JobStatus::Failed {
            // keep whatever the attempt reached before it died
        } else {
            self.progress = clamped;
        }

        if status == JobStatus::Downloading && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if status.is_terminal() && status != self.status {
            self.completed_at = Some(Utc::now());
        }

        match status {
            JobStatus::Failed => {
                if error.is_some() {
                    self.error = error.map(|e| e.to_string());
                }
            }
            _ => self.error = error.map(|e| e.to_string()),
        }

        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Reset the job for another attempt: bump the retry counter, go back to
    /// `queued`, clear the error and the per-attempt timestamps. The stored
    /// progress is left alone; the next attempt's first `downloading` update
    /// writes 0.
    pub fn begin_retry(&mut self) {
        self.retry_count += 1;
        self.status = JobStatus::Queued;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DownloadJob {
        DownloadJob::new(
            1,
            "https://youtube.com/watch?v=abc".into(),
            SourceType::Youtube,
            None,
        )
    }

    #[test]
    fn test_new_job_defaults() {
        let j = job();
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.progress, 0.0);
        assert_eq!(j.retry_count, 0);
        assert!(j.started_at.is_none());
        assert!(j.completed_at.is_none());
        assert!(!j.id.is_empty());
    }

    #[test]
    fn test_started_at_stamped_once() {
        let mut j = job();
        j.apply_update(JobStatus::Downloading, 0.0, None).unwrap();
        let first = j.started_at.expect("started_at set");

        j.apply_update(JobStatus::Downloading, 50.0, None).unwrap();
        assert_eq!(j.started_at, Some(first));
    }

    #[test]
    fn test_progress_monotonic_within_status() {
        let mut j = job();
        j.apply_update(JobStatus::Downloading, 40.0, None).unwrap();
        j.apply_update(JobStatus::Downloading, 20.0, None).unwrap();
        assert_eq!(j.progress, 40.0);

        j.apply_update(JobStatus::Downloading, 90.0, None).unwrap();
        assert_eq!(j.progress, 90.0);
    }

    #[test]
    fn test_progress_clamped() {
        let mut j = job();
        j.apply_update(JobStatus::Downloading, 250.0, None).unwrap();
        assert_eq!(j.progress, 100.0);
    }

    #[test]
    fn test_failed_keeps_progress_and_error() {
        let mut j = job();
        j.apply_update(JobStatus::Downloading, 60.0, None).unwrap();
        j.apply_update(JobStatus::Failed, 0.0, Some("network reset"))
            .unwrap();
        assert_eq!(j.progress, 60.0);
        assert_eq!(j.error.as_deref(), Some("network reset"));
        assert!(j.completed_at.is_some());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut j = job();
        let err = j.apply_update(JobStatus::Complete, 100.0, None).unwrap_err();
        assert_eq!(err.from, JobStatus::Queued);
        assert_eq!(err.to, JobStatus::Complete);
    }

    #[test]
    fn test_idempotent_update() {
        let mut j = job();
        j.apply_update(JobStatus::Downloading, 30.0, None).unwrap();
        let before = j.progress;
        j.apply_update(JobStatus::Downloading, 30.0, None).unwrap();
        assert_eq!(j.progress, before);
        assert_eq!(j.status, JobStatus::Downloading);
    }

    #[test]
    fn test_retry_resets_attempt_state() {
        let mut j = job();
        j.apply_update(JobStatus::Downloading, 80.0, None).unwrap();
        j.apply_update(JobStatus::Failed, 0.0, Some("boom")).unwrap();

        j.begin_retry();
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.retry_count, 1);
        assert!(j.error.is_none());
        assert!(j.started_at.is_none());
        assert!(j.completed_at.is_none());

        // the new attempt starts back at zero
        j.apply_update(JobStatus::Downloading, 0.0, None).unwrap();
        assert_eq!(j.progress, 0.0);
        assert!(j.started_at.is_some());
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut j = job();
        j.apply_update(JobStatus::Downloading, 42.5, None).unwrap();
        let json = serde_json::to_string(&j).unwrap();
        let back: DownloadJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, j.id);
        assert_eq!(back.status, JobStatus::Downloading);
        assert_eq!(back.progress, 42.5);
    }
}
