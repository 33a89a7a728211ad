//! Date and time utilities
//!
//! All wire and persisted timestamps use second-precision ISO-8601 UTC,
//! `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a timestamp as "YYYY-MM-DDTHH:MM:SSZ"
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.format(ISO_FORMAT).to_string()
}

/// Parse "YYYY-MM-DDTHH:MM:SSZ"; falls back to RFC 3339 for records written
/// by older builds.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, ISO_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for `DateTime<Utc>` fields
pub mod iso8601 {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_iso8601(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_iso8601(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s)))
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` fields
pub mod iso8601_option {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(dt) => serializer.serialize_some(&format_iso8601(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            None => Ok(None),
            Some(s) => parse_iso8601(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
        }
    }
}
