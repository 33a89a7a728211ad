//! MusicBrainz web service client
//!
//! A thin adapter over the public WS/2 JSON API with two obligations: never
//! exceed the configured request rate, and cache responses. The rate limiter
//! is process-wide state; exactly one client instance is expected per
//! process and it is injected wherever catalogue access is needed.

use std::time::Duration;

use dashmap::DashMap;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::models::{
    Artist, Recording, RecordingSearchResponse, ReleaseGroup, ReleaseGroupSearchResponse,
    ArtistSearchResponse,
};

const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const USER_AGENT: &str = concat!(
    "soundsink/",
    env!("CARGO_PKG_VERSION"),
    " ( https://github.com/soundsink/soundsink )"
);

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_TTL: Duration = Duration::from_secs(24 * 3600);
const LOOKUP_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Catalogue client failures
#[derive(Debug, Error)]
pub enum MusicBrainzError {
    /// Upstream returned 404 for the entity
    #[error("not found")]
    NotFound,
    /// The rate-limiter wait was cancelled
    #[error("cancelled")]
    Cancelled,
    /// Upstream answered with a non-success status
    #[error("upstream status {0}")]
    UpstreamStatus(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl MusicBrainzError {
    /// Whether retrying the request later could help
    pub fn is_temporary(&self) -> bool {
        match self {
            MusicBrainzError::Transport(_) => true,
            MusicBrainzError::UpstreamStatus(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Process-wide request pacing: a mutex over the last request time.
/// Waiters sleep until eligible; cancellation aborts the wait.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: parking_lot::Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = requests_per_second.max(1) as u64;
        Self {
            min_interval: Duration::from_millis(1000 / rps),
            last_request: parking_lot::Mutex::new(None),
        }
    }

    /// Block until a request slot is available or the token fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), MusicBrainzError> {
        loop {
            let wait = {
                let mut last = self.last_request.lock();
                let now = Instant::now();
                match *last {
                    Some(prev) if now.duration_since(prev) < self.min_interval => {
                        self.min_interval - now.duration_since(prev)
                    }
                    _ => {
                        *last = Some(now);
                        return Ok(());
                    }
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(MusicBrainzError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

struct CacheEntry {
    expires_at: std::time::Instant,
    value: serde_json::Value,
}

/// Advisory TTL cache over raw response bodies. Lookup failures and stale
/// entries fall through to upstream.
struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let hit = self.entries.get(key)?;
        if std::time::Instant::now() >= hit.expires_at {
            drop(hit);
            self.entries.remove(key);
            return None;
        }
        Some(hit.value.clone())
    }

    fn put(&self, key: String, value: serde_json::Value, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                expires_at: std::time::Instant::now() + ttl,
                value,
            },
        );
    }
}

fn search_cache_key(entity: &str, query: &str, limit: u32, offset: u32) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", query, limit, offset).as_bytes());
    format!("{}:{}", entity, &hex::encode(digest)[..8])
}

fn lookup_cache_key(entity: &str, id: &Uuid) -> String {
    format!("{}:{}", entity, id)
}

/// MusicBrainz WS/2 client with caching and rate limiting
pub struct MusicBrainzClient {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    cache: ResponseCache,
}

impl MusicBrainzClient {
    pub fn new(requests_per_second: u32) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, requests_per_second)
    }

    pub fn with_base_url(base_url: &str, requests_per_second: u32) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(requests_per_second),
            cache: ResponseCache::new(),
        }
    }

    /// Rate-limited GET returning the raw JSON body
    async fn request_json(
        &self,
        path: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, MusicBrainzError> {
        self.limiter.acquire(cancel).await?;

        let url = format!("{}/{}", self.base_url, path);
        let request = self.http.get(&url).query(params).query(&[("fmt", "json")]);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(MusicBrainzError::Cancelled),
            result = request.send() => result?,
        };

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(MusicBrainzError::NotFound),
            status => Err(MusicBrainzError::UpstreamStatus(status.as_u16())),
        }
    }

    /// Search any entity endpoint, going through the cache unless asked not to
    async fn search_raw(
        &self,
        entity: &str,
        query: &str,
        limit: u32,
        offset: u32,
        skip_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, MusicBrainzError> {
        let key = search_cache_key(entity, query, limit, offset);
        if !skip_cache {
            if let Some(cached) = self.cache.get(&key) {
                debug!(entity, key = %key, "catalogue search cache hit");
                return Ok(cached);
            }
        }

        let params = [
            ("query", query.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        let body = self.request_json(entity, &params, cancel).await?;
        self.cache.put(key, body.clone(), SEARCH_TTL);
        Ok(body)
    }

    /// Lookup any entity by MBID, going through the cache
    async fn lookup_raw(
        &self,
        entity: &str,
        id: Uuid,
        inc: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, MusicBrainzError> {
        let key = lookup_cache_key(entity, &id);
        if let Some(cached) = self.cache.get(&key) {
            debug!(entity, %id, "catalogue lookup cache hit");
            return Ok(cached);
        }

        let params = if inc.is_empty() {
            vec![]
        } else {
            vec![("inc", inc.to_string())]
        };
        let path = format!("{}/{}", entity, id);
        let body = self.request_json(&path, &params, cancel).await?;
        self.cache.put(key, body.clone(), LOOKUP_TTL);
        Ok(body)
    }

    pub async fn search_artists(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
        skip_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artist>, MusicBrainzError> {
        let body = self
            .search_raw("artist", query, limit, offset, skip_cache, cancel)
            .await?;
        let parsed: ArtistSearchResponse = serde_json::from_value(body)?;
        Ok(parsed.artists)
    }

    pub async fn search_release_groups(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
        skip_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReleaseGroup>, MusicBrainzError> {
        let body = self
            .search_raw("release-group", query, limit, offset, skip_cache, cancel)
            .await?;
        let parsed: ReleaseGroupSearchResponse = serde_json::from_value(body)?;
        Ok(parsed.release_groups)
    }

    pub async fn lookup_artist(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Artist, MusicBrainzError> {
        let body = self.lookup_raw("artist", id, "", cancel).await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait::async_trait]
impl super::CatalogueClient for MusicBrainzClient {
    async fn search_recordings(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
        skip_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recording>, MusicBrainzError> {
        let body = self
            .search_raw("recording", query, limit, offset, skip_cache, cancel)
            .await?;
        let parsed: RecordingSearchResponse = serde_json::from_value(body)?;
        Ok(parsed.recordings)
    }

    async fn lookup_recording(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Recording, MusicBrainzError> {
        let body = self
            .lookup_raw("recording", id, "artists+releases", cancel)
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}
