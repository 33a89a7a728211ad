//! Data models

pub mod enums;
pub mod job;
pub mod track;

pub use enums::{JobStatus, SourceType};
pub use job::{DownloadJob, InvalidTransition};
pub use track::{LibraryEntry, MatchSuggestion, Track, SUGGESTIONS_KEY};
