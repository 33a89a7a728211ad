//! Library entries table operations
//!
//! A library entry is a user's ownership relation over a track. Entries are
//! unique per (user, track); removing one never touches the track itself.

use chrono::Utc;
use serde::Deserialize;
use sqlx::FromRow;

use crate::db::tables::track_table::TrackRow;
use crate::db::{is_unique_violation, DbEngine, RepoError};
use crate::models::{LibraryEntry, Track};
use crate::utils::dates::{format_iso8601, parse_iso8601};

/// Sort key for library listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibrarySort {
    AddedAt,
    Title,
    Artist,
}

impl Default for LibrarySort {
    fn default() -> Self {
        LibrarySort::AddedAt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// Listing parameters for a user's library
#[derive(Debug, Clone, Default)]
pub struct LibraryQuery {
    pub limit: i64,
    pub offset: i64,
    pub sort: LibrarySort,
    pub order: SortOrder,
    pub q: Option<String>,
    pub mb_verified: Option<bool>,
}

#[derive(Debug, FromRow)]
struct EntryRow {
    user_id: i64,
    track_id: i64,
    added_at: String,
}

impl EntryRow {
    fn into_entry(self) -> LibraryEntry {
        LibraryEntry {
            user_id: self.user_id,
            track_id: self.track_id,
            added_at: parse_iso8601(&self.added_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Library entries table operations
pub struct LibraryTable;

impl LibraryTable {
    /// Add a track to a user's library. Adding twice is a conflict.
    pub async fn add(user_id: i64, track_id: i64) -> Result<LibraryEntry, RepoError> {
        let engine = DbEngine::get()?;
        let added_at = Utc::now();

        sqlx::query("INSERT INTO library_entries (user_id, track_id, added_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(track_id)
            .bind(format_iso8601(&added_at))
            .execute(engine.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepoError::Conflict(format!("library entry ({}, {})", user_id, track_id))
                } else {
                    RepoError::Database(e)
                }
            })?;

        Ok(LibraryEntry {
            user_id,
            track_id,
            added_at,
        })
    }

    /// Remove a track from a user's library
    pub async fn remove(user_id: i64, track_id: i64) -> Result<(), RepoError> {
        let engine = DbEngine::get()?;

        let result =
            sqlx::query("DELETE FROM library_entries WHERE user_id = ? AND track_id = ?")
                .bind(user_id)
                .bind(track_id)
                .execute(engine.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Fetch a single entry
    pub async fn get(user_id: i64, track_id: i64) -> Result<Option<LibraryEntry>, RepoError> {
        let engine = DbEngine::get()?;
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT user_id, track_id, added_at FROM library_entries WHERE user_id = ? AND track_id = ?",
        )
        .bind(user_id)
        .bind(track_id)
        .fetch_optional(engine.pool())
        .await?;

        Ok(row.map(|r| r.into_entry()))
    }

    /// List a user's library with the given filters. Returns the page of
    /// tracks plus the total count matching the filters.
    pub async fn list(user_id: i64, query: &LibraryQuery) -> Result<(Vec<Track>, i64), RepoError> {
        let engine = DbEngine::get()?;
        let limit = if query.limit <= 0 { 20 } else { query.limit.min(100) };
        let offset = query.offset.max(0);

        let mut filter = String::from("WHERE le.user_id = ?");
        if query.q.is_some() {
            filter.push_str(" AND (t.title LIKE ? OR t.artist LIKE ? OR t.album LIKE ?)");
        }
        if query.mb_verified.is_some() {
            filter.push_str(" AND t.mb_verified = ?");
        }

        let sort_column = match query.sort {
            LibrarySort::AddedAt => "le.added_at",
            LibrarySort::Title => "t.title COLLATE NOCASE",
            LibrarySort::Artist => "t.artist COLLATE NOCASE",
        };
        let direction = match query.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let list_sql = format!(
            "SELECT t.* FROM library_entries le JOIN tracks t ON t.id = le.track_id {} ORDER BY {} {} LIMIT ? OFFSET ?",
            filter, sort_column, direction
        );
        let count_sql = format!(
            "SELECT COUNT(*) FROM library_entries le JOIN tracks t ON t.id = le.track_id {}",
            filter
        );

        let pattern = query.q.as_ref().map(|q| format!("%{}%", q));

        let mut list_query = sqlx::query_as::<_, TrackRow>(&list_sql);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);

        list_query = list_query.bind(user_id);
        count_query = count_query.bind(user_id);
        if let Some(ref p) = pattern {
            for _ in 0..3 {
                list_query = list_query.bind(p.clone());
                count_query = count_query.bind(p.clone());
            }
        }
        if let Some(verified) = query.mb_verified {
            list_query = list_query.bind(verified);
            count_query = count_query.bind(verified);
        }
        list_query = list_query.bind(limit).bind(offset);

        let rows = list_query.fetch_all(engine.pool()).await?;
        let (total,): (i64,) = count_query.fetch_one(engine.pool()).await?;

        Ok((rows.into_iter().map(|r| r.into_track()).collect(), total))
    }
}
