//! MusicBrainz WS/2 response types
//!
//! Only the fields the matcher and the API surface actually consume are
//! mapped; everything else in the upstream payload is ignored.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recording returned by search or lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub title: String,
    /// Upstream search score (0-100), absent on lookups
    #[serde(default)]
    pub score: Option<i64>,
    /// Recording length in milliseconds
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default, rename = "artist-credit")]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub releases: Vec<ReleaseRef>,
}

impl Recording {
    /// The full credited artist string, join phrases included
    /// ("Daft Punk feat. Pharrell Williams").
    pub fn credited_artist(&self) -> String {
        let mut out = String::new();
        for credit in &self.artist_credit {
            out.push_str(&credit.name);
            out.push_str(&credit.joinphrase);
        }
        out
    }

    /// MBID of the first credited artist
    pub fn primary_artist_id(&self) -> Option<Uuid> {
        self.artist_credit.first().map(|c| c.artist.id)
    }

    /// MBID of the first associated release
    pub fn primary_release_id(&self) -> Option<Uuid> {
        self.releases.first().map(|r| r.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistCredit {
    /// Name as credited on this recording
    pub name: String,
    #[serde(default)]
    pub joinphrase: String,
    pub artist: ArtistRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Uuid,
    pub name: String,
    #[serde(default, rename = "sort-name")]
    pub sort_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRef {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// An artist returned by search or lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default, rename = "sort-name")]
    pub sort_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub disambiguation: Option<String>,
}

/// A release group returned by search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseGroup {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default, rename = "primary-type")]
    pub primary_type: Option<String>,
    #[serde(default, rename = "artist-credit")]
    pub artist_credit: Vec<ArtistCredit>,
}

#[derive(Debug, Deserialize)]
pub struct RecordingSearchResponse {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistSearchResponse {
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseGroupSearchResponse {
    #[serde(default, rename = "release-groups")]
    pub release_groups: Vec<ReleaseGroup>,
}
