//! MusicBrainz catalogue integration

pub mod client;
pub mod models;

pub use client::{MusicBrainzClient, MusicBrainzError, RateLimiter};
pub use models::{Artist, ArtistCredit, Recording, ReleaseGroup, ReleaseRef};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The catalogue operations the rest of the system depends on. The matcher
/// is generic over this seam so tests can count and stub upstream calls.
#[async_trait::async_trait]
pub trait CatalogueClient: Send + Sync {
    /// Full-text recording search returning upstream-ordered candidates
    async fn search_recordings(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
        skip_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recording>, MusicBrainzError>;

    /// Fetch a recording's detail record by MBID
    async fn lookup_recording(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Recording, MusicBrainzError>;
}
