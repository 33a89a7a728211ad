//! Auto-match engine
//!
//! Links ingested tracks to MusicBrainz recordings. Candidates from the
//! catalogue search are scored against the parsed source metadata; a
//! high-confidence top candidate is auto-verified, everything else lands as
//! ranked suggestions on the track for the user to confirm.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::core::title_parser::{clean_artist_name, parse_title, ParsedTitle};
use crate::db::tables::{CatalogueMatch, TrackTable};
use crate::db::RepoError;
use crate::models::{MatchSuggestion, Track, SUGGESTIONS_KEY};
use crate::musicbrainz::{CatalogueClient, MusicBrainzError, Recording};

// Score weights; must sum to 1.0
const WEIGHT_ARTIST: f64 = 0.40;
const WEIGHT_TRACK: f64 = 0.40;
const WEIGHT_DURATION: f64 = 0.20;

/// Overall score at or above which the top candidate is auto-verified
const AUTO_MATCH_THRESHOLD: f64 = 85.0;
const MEDIUM_THRESHOLD: f64 = 70.0;

/// Cap of the featuring-artist bonus; the overall score is clamped to 100
/// afterwards so threshold semantics stay intact.
const FEATURING_BONUS_MAX: f64 = 5.0;

const SEARCH_LIMIT: u32 = 10;
const MAX_SUGGESTIONS: usize = 3;

/// Words dropped from both sides before fuzzy comparison
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for",
];

/// Titles containing any of these as whole words are not music; the matcher
/// short-circuits without calling the catalogue.
const NON_MUSIC_KEYWORDS: &[&str] = &[
    "podcast",
    "interview",
    "tutorial",
    "review",
    "unboxing",
    "vlog",
    "gameplay",
    "let's play",
    "stream",
    "reaction",
    "commentary",
    "news",
    "lecture",
    "audiobook",
    "asmr",
];

/// Ingested metadata handed to the matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInput {
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A catalogue candidate with its score breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub recording_mbid: Uuid,
    #[serde(default)]
    pub artist_mbid: Option<Uuid>,
    #[serde(default)]
    pub release_mbid: Option<Uuid>,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    pub artist_score: f64,
    pub track_score: f64,
    pub duration_score: f64,
    pub overall: f64,
    pub confidence: Confidence,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Result of a match run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutput {
    pub verified: bool,
    #[serde(default)]
    pub best_match: Option<ScoredCandidate>,
    #[serde(default)]
    pub suggestions: Vec<MatchSuggestion>,
    pub parsed: ParsedTitle,
}

impl MatchOutput {
    fn unmatched(parsed: ParsedTitle) -> Self {
        Self {
            verified: false,
            best_match: None,
            suggestions: Vec::new(),
            parsed,
        }
    }
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Catalogue(#[from] MusicBrainzError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Normalize a string for fuzzy comparison: strip diacritics, lowercase,
/// replace non-alphanumerics with spaces, drop stop words, collapse.
pub fn normalize_for_match(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect();

    let spaced: String = stripped
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    spaced
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein-based similarity in [0, 100]. Both sides empty is a perfect
/// match; exactly one side empty scores zero.
fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let distance = strsim::levenshtein(a, b) as f64;
    let max_len = a.chars().count().max(b.chars().count()) as f64;
    100.0 * (1.0 - distance / max_len)
}

/// Duration closeness in [0, 100]: within 10 seconds is perfect, then 5
/// points off per additional second. Unknown on either side scores 50.
fn duration_score(ours: Option<i64>, theirs: Option<i64>) -> f64 {
    match (ours, theirs) {
        (Some(a), Some(b)) if a > 0 && b > 0 => {
            let diff_secs = (a - b).abs() as f64 / 1000.0;
            if diff_secs <= 10.0 {
                100.0
            } else {
                (100.0 - 5.0 * (diff_secs - 10.0)).max(0.0)
            }
        }
        _ => 50.0,
    }
}

pub(crate) fn confidence_for(overall: f64) -> Confidence {
    if overall >= AUTO_MATCH_THRESHOLD {
        Confidence::High
    } else if overall >= MEDIUM_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Score one catalogue candidate against the parsed input
pub fn score_candidate(
    parsed: &ParsedTitle,
    duration_ms: Option<i64>,
    recording: &Recording,
) -> ScoredCandidate {
    let our_artist = normalize_for_match(&parsed.artist);
    let our_track = normalize_for_match(&parsed.track);
    let their_artist = normalize_for_match(&recording.credited_artist());
    let their_track = normalize_for_match(&recording.title);

    let artist_score = similarity(&our_artist, &their_artist);
    let track_score = similarity(&our_track, &their_track);
    let duration = duration_score(duration_ms, recording.length);

    let mut overall =
        WEIGHT_ARTIST * artist_score + WEIGHT_TRACK * track_score + WEIGHT_DURATION * duration;

    let mut reasons = Vec::new();
    if artist_score >= 90.0 {
        reasons.push("artist-match".to_string());
    }
    if track_score >= 90.0 {
        reasons.push("title-match".to_string());
    }
    if duration >= 100.0 {
        reasons.push("duration-match".to_string());
    }

    if !parsed.featuring.is_empty() {
        let matched = parsed
            .featuring
            .iter()
            .filter(|feat| {
                let norm = normalize_for_match(feat);
                !norm.is_empty() && their_artist.contains(&norm)
            })
            .count();
        if matched > 0 {
            overall += FEATURING_BONUS_MAX * matched as f64 / parsed.featuring.len() as f64;
            reasons.push("featuring-match".to_string());
        }
    }

    // the bonus must never push a score past the threshold scale
    let overall = overall.min(100.0);

    ScoredCandidate {
        recording_mbid: recording.id,
        artist_mbid: recording.primary_artist_id(),
        release_mbid: recording.primary_release_id(),
        title: recording.title.clone(),
        artist: recording.credited_artist(),
        duration_ms: recording.length,
        artist_score,
        track_score,
        duration_score: duration,
        overall,
        confidence: confidence_for(overall),
        reasons,
    }
}

/// Whole-word non-music keyword check on the normalized title
fn is_non_music(title: &str) -> bool {
    let padded = format!(" {} ", normalize_for_match(title));
    NON_MUSIC_KEYWORDS
        .iter()
        .any(|kw| padded.contains(&format!(" {} ", normalize_for_match(kw))))
}

/// Compose the upstream search query from the parsed fields
fn compose_query(track: &str, artist: &str) -> String {
    let escape = |s: &str| s.replace('"', "\\\"");
    if artist.is_empty() {
        format!("recording:\"{}\"", escape(track))
    } else {
        format!("recording:\"{}\" AND artist:\"{}\"", escape(track), escape(artist))
    }
}

/// The auto-match engine. One instance per process, injected where needed.
pub struct AutoMatcher {
    catalogue: Arc<dyn CatalogueClient>,
}

impl AutoMatcher {
    pub fn new(catalogue: Arc<dyn CatalogueClient>) -> Self {
        Self { catalogue }
    }

    /// Run the match flow against the catalogue without persisting anything.
    pub async fn match_metadata(
        &self,
        input: &MatchInput,
        cancel: &CancellationToken,
    ) -> Result<MatchOutput, MusicBrainzError> {
        let mut parsed = parse_title(&input.title);
        if parsed.artist.is_empty() {
            if let Some(uploader) = input.uploader.as_deref() {
                parsed.artist = clean_artist_name(uploader);
            }
        }

        if is_non_music(&input.title) {
            debug!(title = %input.title, "non-music title, skipping catalogue");
            return Ok(MatchOutput::unmatched(parsed));
        }
        if parsed.track.is_empty() {
            return Ok(MatchOutput::unmatched(parsed));
        }

        let query = compose_query(&parsed.track, &parsed.artist);
        let recordings = self
            .catalogue
            .search_recordings(&query, SEARCH_LIMIT, 0, false, cancel)
            .await?;

        let mut candidates: Vec<ScoredCandidate> = recordings
            .iter()
            .map(|rec| score_candidate(&parsed, input.duration_ms, rec))
            .collect();
        // stable sort keeps upstream order on ties
        candidates.sort_by(|a, b| b.overall.partial_cmp(&a.overall).unwrap_or(Ordering::Equal));

        let verified = candidates
            .first()
            .map(|c| c.overall >= AUTO_MATCH_THRESHOLD)
            .unwrap_or(false);
        let best_match = candidates.first().cloned();

        let suggestions = if verified {
            Vec::new()
        } else {
            candidates
                .iter()
                .take(MAX_SUGGESTIONS)
                .map(|c| MatchSuggestion {
                    recording_mbid: c.recording_mbid,
                    artist_mbid: c.artist_mbid,
                    release_mbid: c.release_mbid,
                    title: c.title.clone(),
                    artist: c.artist.clone(),
                    confidence: c.overall / 100.0,
                    reasons: c.reasons.clone(),
                })
                .collect()
        };

        Ok(MatchOutput {
            verified,
            best_match,
            suggestions,
            parsed,
        })
    }

    /// Match a stored track and persist the outcome: catalogue linkage when
    /// auto-verified, ranked suggestions otherwise. An unverified run with no
    /// candidates leaves the stored metadata blob untouched.
    pub async fn match_track(
        &self,
        track: &Track,
        cancel: &CancellationToken,
    ) -> Result<MatchOutput, MatchError> {
        // prefer the uploader recorded at ingest, else the stored artist, so
        // the parsed-artist fallback has something to work with
        let uploader = track
            .extra
            .get("uploader")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| track.artist.clone());

        let input = MatchInput {
            title: track
                .extra
                .get("source_title")
                .and_then(|v| v.as_str())
                .unwrap_or(&track.title)
                .to_string(),
            uploader,
            duration_ms: track.duration_ms,
            source_url: track.source_url.clone(),
        };

        let output = self.match_metadata(&input, cancel).await?;

        if output.verified {
            if let Some(best) = &output.best_match {
                info!(
                    track_id = track.id,
                    recording = %best.recording_mbid,
                    overall = best.overall,
                    "auto-verified catalogue match"
                );
                TrackTable::update_catalogue_match(
                    track.id,
                    &CatalogueMatch {
                        recording_id: Some(best.recording_mbid),
                        artist_id: best.artist_mbid,
                        release_id: best.release_mbid,
                        verified: Some(true),
                        extra: None,
                    },
                )
                .await?;
            }
        } else if !output.suggestions.is_empty() {
            let mut extra = track.extra.clone();
            if !extra.is_object() {
                extra = serde_json::json!({});
            }
            extra[SUGGESTIONS_KEY] =
                serde_json::to_value(&output.suggestions).unwrap_or_default();
            TrackTable::update_catalogue_match(
                track.id,
                &CatalogueMatch {
                    extra: Some(extra),
                    ..Default::default()
                },
            )
            .await?;
        }

        Ok(output)
    }

    /// Link a track to a recording the user (or a submission hint) named.
    /// Missing artist/release ids are filled from a best-effort lookup.
    pub async fn confirm(
        &self,
        track_id: i64,
        recording_mbid: Uuid,
        artist_mbid: Option<Uuid>,
        release_mbid: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<Track, MatchError> {
        let mut artist = artist_mbid;
        let mut release = release_mbid;

        if artist.is_none() || release.is_none() {
            match self.catalogue.lookup_recording(recording_mbid, cancel).await {
                Ok(recording) => {
                    artist = artist.or_else(|| recording.primary_artist_id());
                    release = release.or_else(|| recording.primary_release_id());
                }
                Err(e) => debug!(%recording_mbid, "confirm lookup failed: {}", e),
            }
        }

        let track = TrackTable::update_catalogue_match(
            track_id,
            &CatalogueMatch {
                recording_id: Some(recording_mbid),
                artist_id: artist,
                release_id: release,
                verified: Some(true),
                extra: None,
            },
        )
        .await?;

        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::musicbrainz::models::{ArtistCredit, ArtistRef, ReleaseRef};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct StubCatalogue {
        recordings: Vec<Recording>,
        calls: AtomicUsize,
    }

    impl StubCatalogue {
        fn new(recordings: Vec<Recording>) -> Self {
            Self {
                recordings,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CatalogueClient for StubCatalogue {
        async fn search_recordings(
            &self,
            _query: &str,
            _limit: u32,
            _offset: u32,
            _skip_cache: bool,
            _cancel: &CancellationToken,
        ) -> Result<Vec<Recording>, MusicBrainzError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.recordings.clone())
        }

        async fn lookup_recording(
            &self,
            _id: Uuid,
            _cancel: &CancellationToken,
        ) -> Result<Recording, MusicBrainzError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.recordings
                .first()
                .cloned()
                .ok_or(MusicBrainzError::NotFound)
        }
    }

    fn recording(artist: &str, title: &str, length: Option<i64>) -> Recording {
        Recording {
            id: Uuid::new_v4(),
            title: title.to_string(),
            score: Some(100),
            length,
            artist_credit: vec![ArtistCredit {
                name: artist.to_string(),
                joinphrase: String::new(),
                artist: ArtistRef {
                    id: Uuid::new_v4(),
                    name: artist.to_string(),
                    sort_name: None,
                },
            }],
            releases: vec![ReleaseRef {
                id: Uuid::new_v4(),
                title: "Some Album".to_string(),
                status: None,
            }],
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = WEIGHT_ARTIST + WEIGHT_TRACK + WEIGHT_DURATION;
        assert!((sum - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_for_match() {
        assert_eq!(normalize_for_match("The Beatles"), "beatles");
        assert_eq!(normalize_for_match("Sigur Rós"), "sigur ros");
        assert_eq!(normalize_for_match("Let's Play!"), "let s play");
        assert_eq!(normalize_for_match("Of Monsters and Men"), "monsters men");
    }

    #[test]
    fn test_similarity_edges() {
        assert_eq!(similarity("", ""), 100.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
        assert_eq!(similarity("creep", "creep"), 100.0);
        assert!(similarity("creep", "creek") > 70.0);
    }

    #[test]
    fn test_levenshtein_metric_properties() {
        use proptest::prelude::*;

        proptest!(|(a in "[a-c]{0,6}", b in "[a-c]{0,6}", c in "[a-c]{0,6}")| {
            let ab = strsim::levenshtein(&a, &b);
            let ba = strsim::levenshtein(&b, &a);
            prop_assert_eq!(ab, ba);

            let ac = strsim::levenshtein(&a, &c);
            let cb = strsim::levenshtein(&c, &b);
            prop_assert!(ab <= ac + cb);
        });
    }

    #[test]
    fn test_duration_score_falloff() {
        assert_eq!(duration_score(Some(200_000), Some(200_000)), 100.0);
        assert_eq!(duration_score(Some(200_000), Some(210_000)), 100.0);
        assert_eq!(duration_score(Some(200_000), Some(211_000)), 95.0);
        assert_eq!(duration_score(Some(200_000), Some(230_000)), 0.0);
        assert_eq!(duration_score(None, Some(200_000)), 50.0);
        assert_eq!(duration_score(Some(200_000), None), 50.0);
        assert_eq!(duration_score(Some(0), Some(200_000)), 50.0);
    }

    #[test]
    fn test_confidence_thresholds() {
        assert_eq!(confidence_for(100.0), Confidence::High);
        // a tie at exactly 85 rounds up to auto-match
        assert_eq!(confidence_for(85.0), Confidence::High);
        assert_eq!(confidence_for(84.9), Confidence::Medium);
        assert_eq!(confidence_for(70.0), Confidence::Medium);
        assert_eq!(confidence_for(69.9), Confidence::Low);
    }

    #[test]
    fn test_featuring_bonus_clamped() {
        let parsed = ParsedTitle {
            artist: "Daft Punk".into(),
            track: "Get Lucky".into(),
            featuring: vec!["Pharrell Williams".into()],
            ..Default::default()
        };
        let mut rec = recording("Daft Punk", "Get Lucky", Some(369_000));
        rec.artist_credit.push(ArtistCredit {
            name: "Pharrell Williams".into(),
            joinphrase: String::new(),
            artist: ArtistRef {
                id: Uuid::new_v4(),
                name: "Pharrell Williams".into(),
                sort_name: None,
            },
        });

        let scored = score_candidate(&parsed, Some(369_000), &rec);
        assert!(scored.overall <= 100.0);
        assert!(scored.reasons.contains(&"featuring-match".to_string()));
    }

    #[tokio::test]
    async fn test_high_confidence_auto_match() {
        let stub = StubCatalogue::new(vec![recording("Radiohead", "Creep", Some(239_000))]);
        let matcher = AutoMatcher::new(Arc::new(stub));

        let output = matcher
            .match_metadata(
                &MatchInput {
                    title: "Radiohead - Creep".into(),
                    uploader: None,
                    duration_ms: Some(239_000),
                    source_url: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(output.verified);
        let best = output.best_match.unwrap();
        assert!(best.overall >= 95.0, "overall was {}", best.overall);
        assert_eq!(best.confidence, Confidence::High);
        // auto-verified runs carry no suggestions
        assert!(output.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_non_music_short_circuit() {
        let stub = Arc::new(StubCatalogue::new(vec![recording(
            "Someone",
            "Something",
            None,
        )]));
        let matcher = AutoMatcher::new(stub.clone());

        let output = matcher
            .match_metadata(
                &MatchInput {
                    title: "Joe Rogan Experience #123 - Interview with a Guest".into(),
                    uploader: None,
                    duration_ms: None,
                    source_url: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!output.verified);
        assert!(output.best_match.is_none());
        assert!(output.suggestions.is_empty());
        assert_eq!(stub.call_count(), 0, "catalogue must not be called");
    }

    #[tokio::test]
    async fn test_non_music_requires_whole_word() {
        // "Dreams" contains "ream(s)" but not the whole word "stream"
        let stub = Arc::new(StubCatalogue::new(vec![recording(
            "Fleetwood Mac",
            "Dreams",
            Some(257_000),
        )]));
        let matcher = AutoMatcher::new(stub.clone());

        let output = matcher
            .match_metadata(
                &MatchInput {
                    title: "Fleetwood Mac - Dreams".into(),
                    uploader: None,
                    duration_ms: Some(257_000),
                    source_url: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(stub.call_count(), 1);
        assert!(output.verified);
    }

    #[tokio::test]
    async fn test_empty_track_is_noop() {
        let stub = Arc::new(StubCatalogue::new(vec![]));
        let matcher = AutoMatcher::new(stub.clone());

        let output = matcher
            .match_metadata(
                &MatchInput {
                    title: "".into(),
                    uploader: Some("SomeChannel".into()),
                    duration_ms: None,
                    source_url: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!output.verified);
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_uploader_fallback_for_artist() {
        let stub = StubCatalogue::new(vec![recording("Radiohead", "Creep", Some(239_000))]);
        let matcher = AutoMatcher::new(Arc::new(stub));

        let output = matcher
            .match_metadata(
                &MatchInput {
                    title: "Creep".into(),
                    uploader: Some("RadioheadVEVO".into()),
                    duration_ms: Some(239_000),
                    source_url: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(output.parsed.artist, "Radiohead");
        assert!(output.verified);
    }

    #[tokio::test]
    async fn test_low_confidence_yields_suggestions() {
        let stub = StubCatalogue::new(vec![
            recording("Somebody Else", "A Different Song", Some(100_000)),
            recording("Another Band", "Nothing Alike", Some(90_000)),
        ]);
        let matcher = AutoMatcher::new(Arc::new(stub));

        let output = matcher
            .match_metadata(
                &MatchInput {
                    title: "Obscure Artist - Deep Cut".into(),
                    uploader: None,
                    duration_ms: Some(300_000),
                    source_url: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!output.verified);
        assert!(output.best_match.is_some());
        assert!(!output.suggestions.is_empty());
        assert!(output.suggestions.len() <= MAX_SUGGESTIONS);
        for suggestion in &output.suggestions {
            assert!(suggestion.confidence >= 0.0 && suggestion.confidence <= 1.0);
        }
    }

    #[tokio::test]
    async fn test_ties_keep_upstream_order() {
        let first = recording("Same Artist", "Same Song", Some(200_000));
        let second = recording("Same Artist", "Same Song", Some(200_000));
        let first_id = first.id;
        let stub = StubCatalogue::new(vec![first, second]);
        let matcher = AutoMatcher::new(Arc::new(stub));

        let output = matcher
            .match_metadata(
                &MatchInput {
                    title: "Same Artist - Same Song".into(),
                    uploader: None,
                    duration_ms: Some(200_000),
                    source_url: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(output.best_match.unwrap().recording_mbid, first_id);
    }

    #[tokio::test]
    async fn test_match_track_persists_verified_linkage() {
        crate::db::testing::init_test_db().await;

        let rec = recording("Persist Artist", "Persist Song", Some(222_000));
        let rec_id = rec.id;
        let matcher = AutoMatcher::new(Arc::new(StubCatalogue::new(vec![rec])));

        let (track, _) = TrackTable::create_from_metadata(
            "Persist Artist",
            "Persist Artist - Persist Song",
            "",
            222_000,
            Default::default(),
        )
        .await
        .unwrap();

        let output = matcher
            .match_track(&track, &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.verified);

        let stored = TrackTable::get_by_id(track.id).await.unwrap();
        assert!(stored.mb_verified);
        assert_eq!(stored.mb_recording_id, Some(rec_id));
    }

    #[tokio::test]
    async fn test_match_track_persists_suggestions() {
        crate::db::testing::init_test_db().await;

        let matcher = AutoMatcher::new(Arc::new(StubCatalogue::new(vec![recording(
            "Vaguely Similar",
            "Sort of the Same",
            Some(10_000),
        )])));

        let (track, _) = TrackTable::create_from_metadata(
            "Suggestion Artist",
            "Suggestion Artist - Suggestion Song",
            "",
            240_000,
            Default::default(),
        )
        .await
        .unwrap();

        let output = matcher
            .match_track(&track, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!output.verified);

        let stored = TrackTable::get_by_id(track.id).await.unwrap();
        assert!(!stored.mb_verified);
        assert!(!stored.suggestions().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_fills_ids_from_lookup() {
        crate::db::testing::init_test_db().await;

        let rec = recording("Confirm Artist", "Confirm Song", Some(180_000));
        let rec_id = rec.id;
        let artist_id = rec.primary_artist_id();
        let matcher = AutoMatcher::new(Arc::new(StubCatalogue::new(vec![rec])));

        let (track, _) = TrackTable::create_from_metadata(
            "Confirm Artist",
            "Confirm Artist - Confirm Song",
            "",
            180_000,
            Default::default(),
        )
        .await
        .unwrap();

        let confirmed = matcher
            .confirm(track.id, rec_id, None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(confirmed.mb_verified);
        assert_eq!(confirmed.mb_recording_id, Some(rec_id));
        assert_eq!(confirmed.mb_artist_id, artist_id);
    }
}
