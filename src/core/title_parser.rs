//! Source title parsing
//!
//! Upload titles from external media sources are noisy: "Artist - Song
//! (feat. Guest) [Official Video] HD" and friends. This module extracts the
//! structured fields the rest of the pipeline works with. Strategies are
//! ordered and the first match wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structured output of a parsed source title
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTitle {
    /// Extracted artist name, empty when no strategy found one
    pub artist: String,
    /// Cleaned track title
    pub track: String,
    /// Featured artists pulled out of the title
    #[serde(default)]
    pub featuring: Vec<String>,
    /// Whether a remix/edit/mix token was detected
    #[serde(default)]
    pub is_remix: bool,
    /// The artist credited inside the remix token, may be empty
    #[serde(default)]
    pub remix_artist: String,
    /// Lowercased version keyword (remix, edit, ...), empty for originals
    #[serde(default)]
    pub version: String,
    /// The title exactly as received
    pub raw: String,
}

lazy_static! {
    // End-of-title video suffixes: "(Official Video)", "[Lyric Video]", "(MV)"
    static ref VIDEO_SUFFIX_BRACKET: Regex = Regex::new(
        r"(?i)\s*[\[\(]\s*(?:(?:official\s+)?(?:(?:music|lyric)\s+)?video|HD|HQ|4K|1080p|720p|M/V|MV)\s*[\]\)]\s*$"
    )
    .unwrap();

    // Bare trailing quality tokens: "... HD", "... 1080p"
    static ref VIDEO_SUFFIX_BARE: Regex = Regex::new(
        r"(?i)\s+(?:HD|HQ|4K|1080p|720p|M/V|MV)\s*$"
    )
    .unwrap();

    // Featured artists in brackets: "(feat. X)", "[ft. X]", "(featuring X)"
    static ref FEAT_BRACKET: Regex = Regex::new(
        r"(?i)[\[\(]\s*(?:feat\.?|ft\.?|featuring)\s+([^\]\)]+)[\]\)]"
    )
    .unwrap();

    // Dash-suffix featuring: "Song - feat. X", "Song ft. X" at the end.
    // The list may not contain dashes or brackets so "A ft B - Song" stays
    // with the dash strategy.
    static ref FEAT_DASH: Regex = Regex::new(
        r"(?i)\s+[-–—]?\s*(?:feat\.?|ft\.?|featuring)\s+([^\[\(\]\)–—-]+)$"
    )
    .unwrap();

    // Separators inside a featuring list
    static ref FEAT_LIST_SPLIT: Regex = Regex::new(r"(?i)\s*(?:,|&|\band\b)\s*").unwrap();

    // Trailing remix token: "(Skrillex Remix)", "[Radio Edit]", "(VIP Mix)"
    static ref REMIX_TRAILING: Regex = Regex::new(
        r"(?i)[\[\(]\s*([^\]\)]*?)\s*\b(remix|edit|mix|bootleg|flip|rework)\b\s*[\]\)]\s*$"
    )
    .unwrap();

    // "Artist - Track" with hyphen, en-dash or em-dash
    static ref DASH_SPLIT: Regex = Regex::new(r"^(.*?)\s+[-–—]\s+(.*)$").unwrap();

    // Artist "Track" quoted form (straight or curly quotes)
    static ref QUOTED_TRACK: Regex = Regex::new(r#"^(.+?)\s+["“](.+?)["”]\s*$"#).unwrap();

    // "Track by Artist"
    static ref TRACK_BY_ARTIST: Regex = Regex::new(r"(?i)^(.+?)\s+by\s+(.+)$").unwrap();

    // Trailing uploader noise on artist names
    static ref ARTIST_TOPIC_SUFFIX: Regex = Regex::new(r"(?i)\s*[-–—]\s*Topic\s*$").unwrap();
    static ref ARTIST_VEVO_SUFFIX: Regex = Regex::new(r"(?i)\s*VEVO\s*$").unwrap();

    // Trailing "(1994)" and "(Remastered)" / "(2009 Remastered)" on track titles
    static ref TRACK_YEAR_SUFFIX: Regex =
        Regex::new(r"\s*\((?:19|20)\d{2}\)\s*$").unwrap();
    static ref TRACK_REMASTER_SUFFIX: Regex = Regex::new(
        r"(?i)\s*\(\s*(?:(?:19|20)\d{2}\s+)?remaster(?:ed)?(?:\s+(?:19|20)\d{2})?\s*\)\s*$"
    )
    .unwrap();
}

/// Keywords that disqualify a string from "looks like an artist name"
const VERSION_KEYWORDS: &[&str] = &[
    "remix",
    "version",
    "edit",
    "mix",
    "remaster",
    "live",
    "acoustic",
    "instrumental",
];

/// Parse a free-text source title into structured fields.
pub fn parse_title(raw: &str) -> ParsedTitle {
    let mut work = strip_video_suffixes(raw.trim());

    let featuring = extract_featuring(&mut work);
    let (is_remix, remix_artist, version) = extract_remix(&mut work);

    let (artist, track) = match_strategies(&work);

    ParsedTitle {
        artist: clean_artist_name(&artist),
        track: clean_track_name(&track),
        featuring,
        is_remix,
        remix_artist,
        version,
        raw: raw.to_string(),
    }
}

/// Strip trailing video-platform suffixes, repeatedly, so stacked noise like
/// "Song (Official Video) HD" comes off in full.
fn strip_video_suffixes(title: &str) -> String {
    let mut result = title.to_string();
    loop {
        let next = VIDEO_SUFFIX_BRACKET.replace(&result, "").to_string();
        let next = VIDEO_SUFFIX_BARE.replace(&next, "").to_string();
        let next = next.trim().to_string();
        if next == result {
            return result;
        }
        result = next;
    }
}

/// Pull featured artists out of `work`, removing the tokens in place.
fn extract_featuring(work: &mut String) -> Vec<String> {
    let mut featuring = Vec::new();

    for cap in FEAT_BRACKET.captures_iter(work) {
        if let Some(list) = cap.get(1) {
            featuring.extend(split_artist_list(list.as_str()));
        }
    }
    let mut cleaned = FEAT_BRACKET.replace_all(work, "").trim().to_string();

    if let Some(cap) = FEAT_DASH.captures(&cleaned) {
        if let Some(list) = cap.get(1) {
            featuring.extend(split_artist_list(list.as_str()));
        }
        cleaned = FEAT_DASH.replace(&cleaned, "").trim().to_string();
    }

    *work = cleaned;
    featuring
}

/// Detect a trailing remix token, removing it in place.
/// Returns (is_remix, remix_artist, version keyword).
fn extract_remix(work: &mut String) -> (bool, String, String) {
    if let Some(cap) = REMIX_TRAILING.captures(work) {
        let remix_artist = cap
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let version = cap
            .get(2)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        *work = REMIX_TRAILING.replace(work, "").trim().to_string();
        (true, remix_artist, version)
    } else {
        (false, String::new(), String::new())
    }
}

/// Try the parse strategies in order; first match wins.
fn match_strategies(work: &str) -> (String, String) {
    // 1. "Artist - Track"
    if let Some(cap) = DASH_SPLIT.captures(work) {
        let left = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let right = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if !left.is_empty() && !right.is_empty() {
            // Uploads sometimes come as "Track - Artist"; swap when only the
            // track side passes the artist heuristic.
            if looks_like_artist(right) && !looks_like_artist(left) {
                return (right.to_string(), left.to_string());
            }
            return (left.to_string(), right.to_string());
        }
    }

    // 2. Artist "Track"
    if let Some(cap) = QUOTED_TRACK.captures(work) {
        let artist = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let track = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if !artist.is_empty() && !track.is_empty() {
            return (artist.to_string(), track.to_string());
        }
    }

    // 3. "Track by Artist"
    if let Some(cap) = TRACK_BY_ARTIST.captures(work) {
        let track = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let artist = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if !artist.is_empty() && !track.is_empty() {
            return (artist.to_string(), track.to_string());
        }
    }

    // 4. Fallback: the whole cleaned string is the track
    (String::new(), work.trim().to_string())
}

/// Heuristic for "this side of the dash reads like an artist name":
/// short, no brackets, no version keywords.
fn looks_like_artist(text: &str) -> bool {
    if text.chars().count() > 40 {
        return false;
    }
    if text.contains(['(', ')', '[', ']']) {
        return false;
    }
    let lower = text.to_lowercase();
    !VERSION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Split a featuring list on commas, ampersands and "and".
fn split_artist_list(list: &str) -> Vec<String> {
    FEAT_LIST_SPLIT
        .split(list)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Strip uploader noise from an artist name: " - Topic", trailing "VEVO".
pub fn clean_artist_name(artist: &str) -> String {
    let cleaned = ARTIST_TOPIC_SUFFIX.replace(artist, "").to_string();
    let cleaned = ARTIST_VEVO_SUFFIX.replace(&cleaned, "").to_string();
    cleaned.trim().to_string()
}

/// Strip trailing year and remaster annotations from a track title.
pub fn clean_track_name(track: &str) -> String {
    let mut result = track.trim().to_string();
    loop {
        let next = TRACK_REMASTER_SUFFIX.replace(&result, "").to_string();
        let next = TRACK_YEAR_SUFFIX.replace(&next, "").to_string();
        let next = next.trim().to_string();
        if next == result {
            return result;
        }
        result = next;
    }
}
