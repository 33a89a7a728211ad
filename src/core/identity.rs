//! Track identity fingerprinting
//!
//! Collapses duplicates of the same recording across sources while keeping
//! distinct versions (remix, live, radio edit) apart. The fingerprint is the
//! sole dedup key: two ingests with the same fingerprint resolve to one track.

use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Width of the duration bucket in milliseconds. Tracks within the same
/// bucket compare equal on duration, giving roughly ±5s fuzzy matching.
const DURATION_BUCKET_MS: i64 = 5000;

/// Leading articles stripped once during normalization
const ARTICLE_PREFIXES: &[&str] = &["the ", "a ", "an "];

/// Number of hex characters kept from the SHA-256 digest
const FINGERPRINT_LEN: usize = 16;

/// Normalize a single metadata component for fingerprinting.
///
/// Accents are removed by decomposing to NFD, dropping combining marks and
/// recomposing, so "Café" and "Cafe" normalize identically regardless of the
/// source encoding. Whitespace runs collapse to a single space, the result is
/// lowercased, and one leading article ("the ", "a ", "an ") is stripped.
pub fn normalize_component(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut lowered = collapsed.to_lowercase();

    for prefix in ARTICLE_PREFIXES {
        if let Some(rest) = lowered.strip_prefix(prefix) {
            lowered = rest.to_string();
            break;
        }
    }

    lowered
}

/// Bucket a duration to the nearest lower multiple of 5 seconds.
/// Unknown or non-positive durations land in bucket 0.
pub fn duration_bucket(duration_ms: i64) -> i64 {
    if duration_ms <= 0 {
        return 0;
    }
    (duration_ms / DURATION_BUCKET_MS) * DURATION_BUCKET_MS
}

/// Compute the 16-hex-character identity fingerprint for a track.
///
/// The fingerprint is stable across process restarts and source encodings:
/// it is the truncated SHA-256 of the pipe-joined normalized components plus
/// the duration bucket. Empty components are allowed and participate as
/// empty fields.
pub fn track_fingerprint(
    artist: &str,
    title: &str,
    album: &str,
    duration_ms: i64,
    version: &str,
) -> String {
    let key = format!(
        "{}|{}|{}|{}|{}",
        normalize_component(artist),
        normalize_component(title),
        normalize_component(album),
        duration_bucket(duration_ms),
        normalize_component(version),
    );

    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let fp = track_fingerprint("Daft Punk", "Get Lucky", "Random Access Memories", 367000, "");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = track_fingerprint("Artist", "Song", "Album", 210000, "");
        let b = track_fingerprint("Artist", "Song", "Album", 210000, "");
        assert_eq!(a, b);
    }

    #[test]
    fn test_duration_bucket_boundaries() {
        assert_eq!(duration_bucket(0), 0);
        assert_eq!(duration_bucket(-1), 0);
        assert_eq!(duration_bucket(4999), 0);
        assert_eq!(duration_bucket(5000), 5000);
        assert_eq!(duration_bucket(367000), 365000);
        assert_eq!(duration_bucket(368000), 365000);
        assert_eq!(duration_bucket(372000), 370000);
    }

    #[test]
    fn test_identity_collapse_across_sources() {
        // within one 5s bucket the fingerprints collapse
        let a = track_fingerprint("Daft Punk", "Get Lucky", "Random Access Memories", 367000, "");
        let b = track_fingerprint("Daft Punk", "Get Lucky", "Random Access Memories", 368000, "");
        assert_eq!(a, b);

        // crossing the 370000 bucket boundary separates them
        let c = track_fingerprint("Daft Punk", "Get Lucky", "Random Access Memories", 372000, "");
        assert_ne!(a, c);
    }

    #[test]
    fn test_version_preserved() {
        let original = track_fingerprint("Artist", "Song", "Album", 210000, "");
        let remix = track_fingerprint("Artist", "Song", "Album", 210000, "remix");
        assert_ne!(original, remix);
    }

    #[test]
    fn test_article_prefix_collapse() {
        let with_article = track_fingerprint("The Beatles", "Hey Jude", "Past Masters", 431000, "");
        let without = track_fingerprint("Beatles", "Hey Jude", "Past Masters", 431000, "");
        assert_eq!(with_article, without);
    }

    #[test]
    fn test_article_stripped_once() {
        // only one leading article goes, the second word survives
        assert_eq!(normalize_component("The The"), "the");
        assert_eq!(normalize_component("A An The"), "an the");
    }

    #[test]
    fn test_accent_folding() {
        assert_eq!(normalize_component("Café"), "cafe");
        assert_eq!(normalize_component("Beyoncé"), "beyonce");
        let accented = track_fingerprint("Sigur Rós", "Hoppípolla", "Takk...", 270000, "");
        let plain = track_fingerprint("Sigur Ros", "Hoppipolla", "Takk...", 270000, "");
        assert_eq!(accented, plain);
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(normalize_component("  Daft   Punk  "), "daft punk");
        let spaced = track_fingerprint("Daft  Punk", " Get  Lucky ", "", 367000, "");
        let tight = track_fingerprint("Daft Punk", "Get Lucky", "", 367000, "");
        assert_eq!(spaced, tight);
    }

    #[test]
    fn test_empty_components_allowed() {
        let fp = track_fingerprint("", "Song", "", 0, "");
        assert_eq!(fp.len(), 16);
    }
}
