//! Shared enums for sources and job state

use serde::{Deserialize, Serialize};

/// Supported external media sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Youtube,
    Soundcloud,
    Bandcamp,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Youtube => "youtube",
            SourceType::Soundcloud => "soundcloud",
            SourceType::Bandcamp => "bandcamp",
        }
    }

    /// Guess the source from a submitted URL
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.contains("youtube.com") || lower.contains("youtu.be") {
            Some(SourceType::Youtube)
        } else if lower.contains("soundcloud.com") {
            Some(SourceType::Soundcloud)
        } else if lower.contains("bandcamp.com") {
            Some(SourceType::Bandcamp)
        } else {
            None
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "youtube" => Ok(SourceType::Youtube),
            "soundcloud" => Ok(SourceType::Soundcloud),
            "bandcamp" => Ok(SourceType::Bandcamp),
            other => Err(format!("unknown source type: {}", other)),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a download job.
///
/// ```text
/// queued → downloading → processing → uploading → complete
///                                               ↘ failed → (retry) queued
/// ```
/// Any non-terminal state may jump to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Processing,
    Uploading,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Uploading => "uploading",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal within a single attempt. A failed job may still re-enter
    /// `queued` through the retry path.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether moving to `next` is a legal state-machine step.
    /// Re-asserting the current state is always allowed so status updates
    /// stay idempotent.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match (*self, next) {
            (JobStatus::Queued, JobStatus::Downloading) => true,
            (JobStatus::Downloading, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Uploading) => true,
            (JobStatus::Uploading, JobStatus::Complete) => true,
            (JobStatus::Failed, JobStatus::Queued) => true,
            (from, JobStatus::Failed) if !from.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
