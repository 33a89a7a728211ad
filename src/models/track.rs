//! Track model
//!
//! A Track is the canonical record of a playable audio unit, shared by all
//! users and content-addressed by its identity hash. MusicBrainz linkage and
//! match suggestions hang off it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SourceType;
use crate::utils::dates;

/// Canonical record of a playable audio unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Database ID, assigned on insert
    pub id: i64,
    /// 16-hex-char identity fingerprint, unique across all tracks
    pub identity_hash: String,
    /// Track title
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration_ms: Option<i64>,
    /// Version tag when this is not the original recording (remix, edit, ...)
    #[serde(default)]
    pub version: Option<String>,
    /// URL this track was ingested from
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    /// Object-store key of the audio blob
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub file_size_bytes: Option<i64>,
    /// Opaque extra metadata, including persisted match suggestions
    #[serde(default)]
    pub extra: serde_json::Value,
    /// MusicBrainz recording this track is linked to
    #[serde(default)]
    pub mb_recording_id: Option<Uuid>,
    #[serde(default)]
    pub mb_release_id: Option<Uuid>,
    #[serde(default)]
    pub mb_artist_id: Option<Uuid>,
    /// True once the linkage was established with high confidence.
    /// Implies `mb_recording_id` is set.
    #[serde(default)]
    pub mb_verified: bool,
    #[serde(with = "dates::iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "dates::iso8601")]
    pub updated_at: DateTime<Utc>,
}

/// Key under which ranked match suggestions live inside `extra`
pub const SUGGESTIONS_KEY: &str = "mb_suggestions";

impl Track {
    /// Create an unsaved track with the given identity and title
    pub fn new(identity_hash: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            identity_hash,
            title,
            artist: None,
            album: None,
            duration_ms: None,
            version: None,
            source_url: None,
            source_type: None,
            storage_key: None,
            file_size_bytes: None,
            extra: serde_json::Value::Null,
            mb_recording_id: None,
            mb_release_id: None,
            mb_artist_id: None,
            mb_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The suggestions persisted for this track, if any
    pub fn suggestions(&self) -> Vec<MatchSuggestion> {
        self.extra
            .get(SUGGESTIONS_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.identity_hash == other.identity_hash
    }
}

impl Eq for Track {}

/// A ranked candidate catalogue entry stored alongside an unverified track,
/// awaiting user confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSuggestion {
    pub recording_mbid: Uuid,
    #[serde(default)]
    pub artist_mbid: Option<Uuid>,
    #[serde(default)]
    pub release_mbid: Option<Uuid>,
    pub title: String,
    pub artist: String,
    /// Match confidence in [0, 1]
    pub confidence: f64,
    /// Short tags describing why this candidate scored
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// A user's ownership relation over a track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub user_id: i64,
    pub track_id: i64,
    #[serde(with = "dates::iso8601")]
    pub added_at: DateTime<Utc>,
}
