//! Track table operations
//!
//! The repository owns the dedup contract: `create_or_get` never returns a
//! duplicate, even under concurrent inserts racing on the identity hash.

use chrono::Utc;
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::identity::track_fingerprint;
use crate::core::title_parser::{clean_artist_name, parse_title};
use crate::db::{is_unique_violation, DbEngine, RepoError};
use crate::models::{SourceType, Track};
use crate::utils::dates::{format_iso8601, parse_iso8601};

/// Database row for the tracks table
#[derive(Debug, FromRow)]
pub(crate) struct TrackRow {
    id: i64,
    identity_hash: String,
    title: String,
    artist: Option<String>,
    album: Option<String>,
    duration_ms: Option<i64>,
    version: Option<String>,
    source_url: Option<String>,
    source_type: Option<String>,
    storage_key: Option<String>,
    file_size_bytes: Option<i64>,
    extra: String,
    mb_recording_id: Option<String>,
    mb_release_id: Option<String>,
    mb_artist_id: Option<String>,
    mb_verified: bool,
    created_at: String,
    updated_at: String,
}

impl TrackRow {
    pub(crate) fn into_track(self) -> Track {
        let extra: serde_json::Value =
            serde_json::from_str(&self.extra).unwrap_or(serde_json::Value::Null);

        Track {
            id: self.id,
            identity_hash: self.identity_hash,
            title: self.title,
            artist: self.artist,
            album: self.album,
            duration_ms: self.duration_ms,
            version: self.version,
            source_url: self.source_url,
            source_type: self.source_type.and_then(|s| s.parse().ok()),
            storage_key: self.storage_key,
            file_size_bytes: self.file_size_bytes,
            extra,
            mb_recording_id: self.mb_recording_id.and_then(|s| Uuid::parse_str(&s).ok()),
            mb_release_id: self.mb_release_id.and_then(|s| Uuid::parse_str(&s).ok()),
            mb_artist_id: self.mb_artist_id.and_then(|s| Uuid::parse_str(&s).ok()),
            mb_verified: self.mb_verified,
            created_at: parse_iso8601(&self.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_iso8601(&self.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

/// MusicBrainz linkage to seed a track with at creation time
#[derive(Debug, Clone, Copy)]
pub struct CatalogueIds {
    pub recording_id: Uuid,
    pub artist_id: Option<Uuid>,
    pub release_id: Option<Uuid>,
    pub verified: bool,
}

/// Optional attributes for `create_from_metadata`
#[derive(Debug, Clone, Default)]
pub struct TrackOptions {
    pub catalogue: Option<CatalogueIds>,
    /// (source url, source type)
    pub source: Option<(String, SourceType)>,
    /// (storage key, file size in bytes)
    pub storage: Option<(String, i64)>,
    pub extra: Option<serde_json::Value>,
}

/// Partial catalogue-linkage update. `None` fields keep the stored value
/// (COALESCE semantics), so a caller can update the ids without touching the
/// metadata blob and vice versa.
#[derive(Debug, Clone, Default)]
pub struct CatalogueMatch {
    pub recording_id: Option<Uuid>,
    pub release_id: Option<Uuid>,
    pub artist_id: Option<Uuid>,
    pub verified: Option<bool>,
    pub extra: Option<serde_json::Value>,
}

/// Canonical identity derived from raw metadata: the parsed/cleaned fields
/// plus the fingerprint they hash to.
#[derive(Debug, Clone)]
pub struct DerivedIdentity {
    pub identity_hash: String,
    pub artist: String,
    pub title: String,
    pub version: String,
}

/// Run raw metadata through the title parser and fingerprint the result.
/// `create_from_metadata` and the ingest pipeline share this so storage keys
/// and identity hashes never diverge.
pub fn derive_identity(artist: &str, title: &str, album: &str, duration_ms: i64) -> DerivedIdentity {
    let parsed = parse_title(title);

    let artist = if artist.trim().is_empty() {
        parsed.artist.clone()
    } else {
        clean_artist_name(artist)
    };
    let track_title = if parsed.track.is_empty() {
        title.trim().to_string()
    } else {
        parsed.track.clone()
    };

    let identity_hash = track_fingerprint(&artist, &track_title, album, duration_ms, &parsed.version);

    DerivedIdentity {
        identity_hash,
        artist,
        title: track_title,
        version: parsed.version,
    }
}

/// Track table operations
pub struct TrackTable;

impl TrackTable {
    /// Get a track by its database id
    pub async fn get_by_id(id: i64) -> Result<Track, RepoError> {
        let engine = DbEngine::get()?;
        let row: Option<TrackRow> = sqlx::query_as("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(engine.pool())
            .await?;

        row.map(|r| r.into_track()).ok_or(RepoError::NotFound)
    }

    /// Get a track by its identity fingerprint
    pub async fn get_by_identity_hash(hash: &str) -> Result<Option<Track>, RepoError> {
        let engine = DbEngine::get()?;
        let row: Option<TrackRow> = sqlx::query_as("SELECT * FROM tracks WHERE identity_hash = ?")
            .bind(hash)
            .fetch_optional(engine.pool())
            .await?;

        Ok(row.map(|r| r.into_track()))
    }

    /// Insert a track, mapping the unique-index violation on identity_hash
    /// to a distinguished conflict.
    async fn insert(track: &Track) -> Result<i64, RepoError> {
        let engine = DbEngine::get()?;
        let extra = serde_json::to_string(&track.extra).unwrap_or_else(|_| "{}".to_string());
        let now = format_iso8601(&Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO tracks (
                identity_hash, title, artist, album, duration_ms, version,
                source_url, source_type, storage_key, file_size_bytes, extra,
                mb_recording_id, mb_release_id, mb_artist_id, mb_verified,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&track.identity_hash)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(&track.album)
        .bind(track.duration_ms)
        .bind(&track.version)
        .bind(&track.source_url)
        .bind(track.source_type.map(|s| s.as_str()))
        .bind(&track.storage_key)
        .bind(track.file_size_bytes)
        .bind(&extra)
        .bind(track.mb_recording_id.map(|u| u.to_string()))
        .bind(track.mb_release_id.map(|u| u.to_string()))
        .bind(track.mb_artist_id.map(|u| u.to_string()))
        .bind(track.mb_verified)
        .bind(&now)
        .bind(&now)
        .execute(engine.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepoError::Conflict(format!("identity_hash {}", track.identity_hash))
            } else {
                RepoError::Database(e)
            }
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Look up by identity hash, inserting on miss. A concurrent insert that
    /// wins the race turns into a re-read, so callers always get exactly one
    /// row per fingerprint. Returns the track and whether it was created.
    pub async fn create_or_get(track: Track) -> Result<(Track, bool), RepoError> {
        if let Some(existing) = Self::get_by_identity_hash(&track.identity_hash).await? {
            return Ok((existing, false));
        }

        match Self::insert(&track).await {
            Ok(id) => Ok((Self::get_by_id(id).await?, true)),
            Err(RepoError::Conflict(_)) => {
                let existing = Self::get_by_identity_hash(&track.identity_hash)
                    .await?
                    .ok_or(RepoError::NotFound)?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Derive the canonical track row from raw metadata and create-or-get it.
    ///
    /// The title goes through the parser so versions and noise suffixes land
    /// in the right fields, then everything is fingerprinted for dedup.
    pub async fn create_from_metadata(
        artist: &str,
        title: &str,
        album: &str,
        duration_ms: i64,
        options: TrackOptions,
    ) -> Result<(Track, bool), RepoError> {
        let derived = derive_identity(artist, title, album, duration_ms);

        let mut track = Track::new(derived.identity_hash, derived.title);
        track.artist = (!derived.artist.is_empty()).then_some(derived.artist);
        track.album = (!album.trim().is_empty()).then(|| album.trim().to_string());
        track.duration_ms = (duration_ms > 0).then_some(duration_ms);
        track.version = (!derived.version.is_empty()).then_some(derived.version);

        if let Some(ids) = options.catalogue {
            track.mb_recording_id = Some(ids.recording_id);
            track.mb_artist_id = ids.artist_id;
            track.mb_release_id = ids.release_id;
            track.mb_verified = ids.verified;
        }
        if let Some((url, source_type)) = options.source {
            track.source_url = Some(url);
            track.source_type = Some(source_type);
        }
        if let Some((key, size)) = options.storage {
            track.storage_key = Some(key);
            track.file_size_bytes = Some(size);
        }
        if let Some(extra) = options.extra {
            track.extra = extra;
        }

        Self::create_or_get(track).await
    }

    /// Update catalogue linkage with COALESCE semantics: `None` fields keep
    /// the stored value. Bumps `updated_at` and returns the fresh row.
    pub async fn update_catalogue_match(
        track_id: i64,
        update: &CatalogueMatch,
    ) -> Result<Track, RepoError> {
        let engine = DbEngine::get()?;
        let extra = update
            .extra
            .as_ref()
            .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "{}".to_string()));

        let result = sqlx::query(
            r#"
            UPDATE tracks SET
                mb_recording_id = COALESCE(?, mb_recording_id),
                mb_release_id = COALESCE(?, mb_release_id),
                mb_artist_id = COALESCE(?, mb_artist_id),
                mb_verified = COALESCE(?, mb_verified),
                extra = COALESCE(?, extra),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.recording_id.map(|u| u.to_string()))
        .bind(update.release_id.map(|u| u.to_string()))
        .bind(update.artist_id.map(|u| u.to_string()))
        .bind(update.verified)
        .bind(extra)
        .bind(format_iso8601(&Utc::now()))
        .bind(track_id)
        .execute(engine.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Self::get_by_id(track_id).await
    }

    /// Apply user edits to the descriptive fields
    pub async fn update_metadata(
        track_id: i64,
        title: Option<&str>,
        artist: Option<&str>,
        album: Option<&str>,
    ) -> Result<Track, RepoError> {
        let engine = DbEngine::get()?;

        let result = sqlx::query(
            r#"
            UPDATE tracks SET
                title = COALESCE(?, title),
                artist = COALESCE(?, artist),
                album = COALESCE(?, album),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(artist)
        .bind(album)
        .bind(format_iso8601(&Utc::now()))
        .bind(track_id)
        .execute(engine.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Self::get_by_id(track_id).await
    }

    /// Substring search across title, artist and album. Exact title prefixes
    /// sort first, then title ascending. Limit is clamped to [1, 100].
    pub async fn search(query: &str, limit: i64, offset: i64) -> Result<Vec<Track>, RepoError> {
        let engine = DbEngine::get()?;
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);

        let contains = format!("%{}%", query);
        let prefix = format!("{}%", query);

        let rows: Vec<TrackRow> = sqlx::query_as(
            r#"
            SELECT * FROM tracks
            WHERE title LIKE ? OR artist LIKE ? OR album LIKE ?
            ORDER BY CASE WHEN title LIKE ? THEN 0 ELSE 1 END, title ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&contains)
        .bind(&contains)
        .bind(&contains)
        .bind(&prefix)
        .bind(limit)
        .bind(offset)
        .fetch_all(engine.pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.into_track()).collect())
    }

    /// Total number of tracks
    pub async fn count() -> Result<i64, RepoError> {
        let engine = DbEngine::get()?;
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracks")
            .fetch_one(engine.pool())
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::init_test_db;

    fn unique_track(tag: &str) -> Track {
        let hash = track_fingerprint(tag, tag, "", 0, "");
        Track::new(hash, format!("Track {}", tag))
    }

    #[tokio::test]
    async fn test_create_or_get_inserts_then_returns_existing() {
        init_test_db().await;

        let track = unique_track("create-or-get-basic");
        let (created, was_created) = TrackTable::create_or_get(track.clone()).await.unwrap();
        assert!(was_created);
        assert!(created.id > 0);

        let (again, was_created) = TrackTable::create_or_get(track).await.unwrap();
        assert!(!was_created);
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn test_create_or_get_concurrent_single_row() {
        init_test_db().await;

        let track = unique_track("create-or-get-concurrent");
        let (a, b, c, d) = tokio::join!(
            TrackTable::create_or_get(track.clone()),
            TrackTable::create_or_get(track.clone()),
            TrackTable::create_or_get(track.clone()),
            TrackTable::create_or_get(track.clone()),
        );

        let ids: Vec<i64> = [a, b, c, d]
            .into_iter()
            .map(|r| r.unwrap().0.id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "ids diverged: {:?}", ids);
    }

    #[tokio::test]
    async fn test_insert_conflict_is_distinguished() {
        init_test_db().await;

        let track = unique_track("conflict-mapping");
        TrackTable::insert(&track).await.unwrap();
        let err = TrackTable::insert(&track).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_create_from_metadata_dedupes_noisy_titles() {
        init_test_db().await;

        let (first, created) = TrackTable::create_from_metadata(
            "Daft Punk",
            "Daft Punk - One More Time (Official Video)",
            "Discovery",
            320000,
            TrackOptions::default(),
        )
        .await
        .unwrap();
        assert!(created);
        assert_eq!(first.title, "One More Time");
        assert_eq!(first.artist.as_deref(), Some("Daft Punk"));

        // same recording, different upload noise, duration inside the bucket
        let (second, created) = TrackTable::create_from_metadata(
            "Daft Punk",
            "Daft Punk - One More Time [HD]",
            "Discovery",
            322000,
            TrackOptions::default(),
        )
        .await
        .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_create_from_metadata_applies_options() {
        init_test_db().await;

        let (track, _) = TrackTable::create_from_metadata(
            "Options Artist",
            "Options Song",
            "Options Album",
            200000,
            TrackOptions {
                source: Some((
                    "https://youtube.com/watch?v=opt".into(),
                    SourceType::Youtube,
                )),
                storage: Some(("tracks/abc.opus".into(), 4_200_000)),
                extra: Some(serde_json::json!({"uploader": "OptionsChannel"})),
                catalogue: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            track.source_url.as_deref(),
            Some("https://youtube.com/watch?v=opt")
        );
        assert_eq!(track.source_type, Some(SourceType::Youtube));
        assert_eq!(track.storage_key.as_deref(), Some("tracks/abc.opus"));
        assert_eq!(track.file_size_bytes, Some(4_200_000));
        assert_eq!(track.extra["uploader"], "OptionsChannel");
        assert!(track.created_at <= track.updated_at);
    }

    #[tokio::test]
    async fn test_update_catalogue_match_coalesce() {
        init_test_db().await;

        let track = unique_track("coalesce-semantics");
        let (track, _) = TrackTable::create_or_get(track).await.unwrap();

        let recording = Uuid::new_v4();
        let updated = TrackTable::update_catalogue_match(
            track.id,
            &CatalogueMatch {
                recording_id: Some(recording),
                verified: Some(true),
                extra: Some(serde_json::json!({"mb_suggestions": []})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.mb_recording_id, Some(recording));
        assert!(updated.mb_verified);

        // nil fields leave everything intact
        let untouched = TrackTable::update_catalogue_match(track.id, &CatalogueMatch::default())
            .await
            .unwrap();
        assert_eq!(untouched.mb_recording_id, Some(recording));
        assert!(untouched.mb_verified);
        assert_eq!(untouched.extra, serde_json::json!({"mb_suggestions": []}));
    }

    #[tokio::test]
    async fn test_create_from_metadata_with_catalogue_ids() {
        init_test_db().await;

        let recording = Uuid::new_v4();
        let (track, created) = TrackTable::create_from_metadata(
            "Seeded Artist",
            "Seeded Song",
            "",
            195_000,
            TrackOptions {
                catalogue: Some(CatalogueIds {
                    recording_id: recording,
                    artist_id: Some(Uuid::new_v4()),
                    release_id: None,
                    verified: true,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(created);
        assert!(track.mb_verified);
        assert_eq!(track.mb_recording_id, Some(recording));
        assert!(track.mb_artist_id.is_some());
        assert!(track.mb_release_id.is_none());
    }

    #[tokio::test]
    async fn test_update_metadata_coalesce() {
        init_test_db().await;

        let (track, _) = TrackTable::create_from_metadata(
            "Edit Artist",
            "Edit Artist - Edit Song",
            "Edit Album",
            180_000,
            TrackOptions::default(),
        )
        .await
        .unwrap();

        let updated = TrackTable::update_metadata(track.id, Some("Corrected Song"), None, None)
            .await
            .unwrap();
        assert_eq!(updated.title, "Corrected Song");
        // untouched fields keep their values
        assert_eq!(updated.artist.as_deref(), Some("Edit Artist"));
        assert_eq!(updated.album.as_deref(), Some("Edit Album"));
        assert!(updated.updated_at >= track.updated_at);
    }

    #[tokio::test]
    async fn test_update_catalogue_match_missing_track() {
        init_test_db().await;

        let err = TrackTable::update_catalogue_match(999_999, &CatalogueMatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn test_search_prefix_first() {
        init_test_db().await;

        for title in ["Zearch Alpha", "The Zearch", "Zearch Beta"] {
            let hash = track_fingerprint("search-artist", title, "", 0, "");
            let mut t = Track::new(hash, title.to_string());
            t.artist = Some("search-artist".into());
            TrackTable::create_or_get(t).await.unwrap();
        }

        let results = TrackTable::search("Zearch", 20, 0).await.unwrap();
        assert!(results.len() >= 3);
        // prefix matches come before the substring match
        assert_eq!(results[0].title, "Zearch Alpha");
        assert_eq!(results[1].title, "Zearch Beta");
        assert_eq!(results[2].title, "The Zearch");
    }

    #[tokio::test]
    async fn test_search_limit_clamped() {
        init_test_db().await;
        // a zero limit still returns at most one row instead of erroring
        let results = TrackTable::search("Zearch", 0, 0).await.unwrap();
        assert!(results.len() <= 1);
    }
}
