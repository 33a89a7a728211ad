//! Ingest processor
//!
//! The worker pool's processor callback: runs the extractor binary against
//! the submitted URL, probes the resulting audio file, uploads it to blob
//! storage, creates (or dedups onto) the canonical track row, links it into
//! the submitting user's library, and finally runs the auto-matcher.
//! Catalogue trouble never fails an ingest; the track simply lands
//! unverified.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use lofty::{Accessor, AudioFile, Probe, TaggedFileExt};
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::matcher::AutoMatcher;
use crate::db::tables::{derive_identity, LibraryTable, TrackOptions, TrackTable};
use crate::db::RepoError;
use crate::models::{DownloadJob, JobStatus};
use crate::queue::worker::{JobProcessor, ProcessError, ProgressSink};
use crate::storage::ObjectStore;

/// File extensions the extractor may hand back
const AUDIO_EXTENSIONS: &[&str] = &["opus", "mp3", "m4a", "aac", "flac", "ogg", "wav", "webm"];

lazy_static! {
    // "[download]  45.2% of 3.52MiB at ..." lines on the extractor's stdout
    static ref DOWNLOAD_PROGRESS: Regex =
        Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap();
}

/// Subset of the extractor's info.json sidecar
#[derive(Debug, Default, Deserialize)]
struct ExtractorInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    duration: Option<f64>,
}

/// Tags and properties read from the downloaded file
#[derive(Debug, Default)]
struct AudioProbe {
    duration_ms: i64,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
}

pub struct IngestProcessor {
    storage: Arc<dyn ObjectStore>,
    matcher: Arc<AutoMatcher>,
    extractor_bin: String,
}

impl IngestProcessor {
    pub fn new(storage: Arc<dyn ObjectStore>, matcher: Arc<AutoMatcher>) -> Self {
        Self {
            storage,
            matcher,
            extractor_bin: "yt-dlp".to_string(),
        }
    }

    pub fn with_extractor(mut self, bin: impl Into<String>) -> Self {
        self.extractor_bin = bin.into();
        self
    }

    /// Run the extractor into `dir`, streaming download progress, and return
    /// the path of the audio file it produced.
    async fn run_extractor(
        &self,
        job: &DownloadJob,
        dir: &Path,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ProcessError> {
        let template = dir.join("%(id)s.%(ext)s");
        let mut child = Command::new(&self.extractor_bin)
            .arg("--newline")
            .arg("--no-playlist")
            .arg("-x")
            .arg("--write-info-json")
            .arg("-o")
            .arg(&template)
            .arg(&job.url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProcessError::Failed(format!("failed to spawn {}: {}", self.extractor_bin, e))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // keep the last stderr line around for the failure message
        let stderr_task = tokio::spawn(async move {
            let mut last = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        last = line;
                    }
                }
            }
            last
        });

        let outcome = {
            let drive = drive_extractor(&mut child, stdout, progress);
            tokio::pin!(drive);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                status = &mut drive => Some(status),
            }
        };

        let status = match outcome {
            None => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(ProcessError::Cancelled);
            }
            Some(status) => status
                .map_err(|e| ProcessError::Failed(format!("extractor failed: {}", e)))?,
        };

        if !status.success() {
            let last_err = stderr_task.await.unwrap_or_default();
            let message = format!("extractor exited with {}: {}", status, last_err);
            // a URL the extractor flatly rejects never gets better with retries
            if last_err.contains("Unsupported URL") || last_err.contains("is not a valid URL") {
                return Err(ProcessError::Permanent(message));
            }
            return Err(ProcessError::Failed(message));
        }
        stderr_task.abort();

        find_audio_file(dir).ok_or_else(|| {
            ProcessError::Failed("extractor produced no audio file".to_string())
        })
    }
}

/// Forward progress lines until stdout closes, then reap the child
async fn drive_extractor(
    child: &mut Child,
    stdout: Option<ChildStdout>,
    progress: &ProgressSink,
) -> std::io::Result<std::process::ExitStatus> {
    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        let mut last_reported = 0.0f64;
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(pct) = parse_progress_line(&line) {
                // throttle write-through to whole-percent steps
                if pct - last_reported >= 1.0 || (pct >= 100.0 && last_reported < 100.0) {
                    last_reported = pct;
                    progress.report(JobStatus::Downloading, pct).await;
                }
            }
        }
    }
    child.wait().await
}

fn parse_progress_line(line: &str) -> Option<f64> {
    DOWNLOAD_PROGRESS
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn find_audio_file(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
}

async fn read_extractor_info(dir: &Path) -> ExtractorInfo {
    let Some(path) = std::fs::read_dir(dir).ok().and_then(|entries| {
        entries
            .flatten()
            .map(|entry| entry.path())
            .find(|path| path.to_string_lossy().ends_with(".info.json"))
    }) else {
        return ExtractorInfo::default();
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(e) => {
            debug!("unreadable extractor info: {}", e);
            ExtractorInfo::default()
        }
    }
}

fn probe_audio(path: &Path) -> Option<AudioProbe> {
    let tagged = Probe::open(path).ok()?.read().ok()?;
    let properties = tagged.properties();
    let duration_ms = properties.duration().as_millis() as i64;

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    Some(AudioProbe {
        duration_ms,
        title: tag.and_then(|t| t.title().map(|s| s.to_string())),
        artist: tag.and_then(|t| t.artist().map(|s| s.to_string())),
        album: tag.and_then(|t| t.album().map(|s| s.to_string())),
    })
}

#[async_trait]
impl JobProcessor for IngestProcessor {
    async fn process(
        &self,
        job: DownloadJob,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<(), ProcessError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| ProcessError::Failed(format!("workdir: {}", e)))?;

        let audio_path = self
            .run_extractor(&job, workdir.path(), &progress, &cancel)
            .await?;

        progress.report(JobStatus::Processing, 100.0).await;

        let info = read_extractor_info(workdir.path()).await;
        let probe = probe_audio(&audio_path);

        let source_title = info
            .title
            .clone()
            .or_else(|| probe.as_ref().and_then(|p| p.title.clone()))
            .or_else(|| {
                audio_path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| job.url.clone());
        let uploader = info.uploader.clone().unwrap_or_default();
        let tag_artist = probe
            .as_ref()
            .and_then(|p| p.artist.clone())
            .unwrap_or_default();
        let album = probe
            .as_ref()
            .and_then(|p| p.album.clone())
            .unwrap_or_default();
        let duration_ms = probe
            .as_ref()
            .map(|p| p.duration_ms)
            .filter(|ms| *ms > 0)
            .or_else(|| info.duration.map(|secs| (secs * 1000.0) as i64))
            .unwrap_or(0);

        // the artist for identity purposes: embedded tag, else parsed from
        // the title, else the uploader; the matcher applies the same order
        let artist_input = if !tag_artist.trim().is_empty() {
            tag_artist.clone()
        } else {
            String::new()
        };

        let derived = derive_identity(&artist_input, &source_title, &album, duration_ms);
        let extension = audio_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("audio")
            .to_lowercase();
        let storage_key = format!("tracks/{}.{}", derived.identity_hash, extension);

        progress.report(JobStatus::Uploading, 100.0).await;

        let data = tokio::fs::read(&audio_path)
            .await
            .map_err(|e| ProcessError::Failed(format!("read audio file: {}", e)))?;
        let file_size = data.len() as i64;
        self.storage
            .put(&storage_key, data.into())
            .await
            .map_err(|e| ProcessError::Failed(format!("upload failed: {}", e)))?;

        let extra = serde_json::json!({
            "source_title": source_title,
            "uploader": uploader,
        });
        let (track, created) = TrackTable::create_from_metadata(
            &artist_input,
            &source_title,
            &album,
            duration_ms,
            TrackOptions {
                source: Some((job.url.clone(), job.source_type)),
                storage: Some((storage_key, file_size)),
                extra: Some(extra),
                catalogue: None,
            },
        )
        .await
        .map_err(|e| ProcessError::Failed(format!("track upsert: {}", e)))?;

        info!(
            job_id = %job.id,
            track_id = track.id,
            identity = %track.identity_hash,
            created,
            "ingest landed"
        );

        match LibraryTable::add(job.user_id, track.id).await {
            Ok(_) => {}
            Err(RepoError::Conflict(_)) => {
                debug!(track_id = track.id, user_id = job.user_id, "already in library");
            }
            Err(e) => return Err(ProcessError::Failed(format!("library entry: {}", e))),
        }

        // catalogue linkage is best-effort: an unreachable catalogue leaves
        // the track unverified and the ingest still succeeds
        if let Some(hint) = job.mb_recording_id {
            match self.matcher.confirm(track.id, hint, None, None, &cancel).await {
                Ok(_) => info!(track_id = track.id, recording = %hint, "linked from submission hint"),
                Err(e) => warn!(track_id = track.id, "hint linkage failed: {}", e),
            }
        } else {
            match self.matcher.match_track(&track, &cancel).await {
                Ok(output) if output.verified => {}
                Ok(output) => {
                    debug!(
                        track_id = track.id,
                        suggestions = output.suggestions.len(),
                        "no auto-match, suggestions stored"
                    );
                }
                Err(e) => warn!(track_id = track.id, "auto-match failed: {}", e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(
            parse_progress_line("[download]  45.2% of 3.52MiB at 1.21MiB/s"),
            Some(45.2)
        );
        assert_eq!(parse_progress_line("[download] 100% of 3.52MiB"), Some(100.0));
        assert_eq!(parse_progress_line("[info] writing metadata"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn test_find_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.info.json"), "{}").unwrap();
        assert!(find_audio_file(dir.path()).is_none());

        std::fs::write(dir.path().join("abc.opus"), b"x").unwrap();
        let found = find_audio_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "abc.opus");
    }

    #[tokio::test]
    async fn test_read_extractor_info() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("abc.info.json"),
            serde_json::json!({
                "title": "Artist - Song (Official Video)",
                "uploader": "ArtistVEVO",
                "duration": 215.3,
                "unrelated": {"nested": true},
            })
            .to_string(),
        )
        .unwrap();

        let info = read_extractor_info(dir.path()).await;
        assert_eq!(info.title.as_deref(), Some("Artist - Song (Official Video)"));
        assert_eq!(info.uploader.as_deref(), Some("ArtistVEVO"));
        assert_eq!(info.duration, Some(215.3));
    }

    #[tokio::test]
    async fn test_read_extractor_info_missing() {
        let dir = tempfile::tempdir().unwrap();
        let info = read_extractor_info(dir.path()).await;
        assert!(info.title.is_none());
        assert!(info.uploader.is_none());
    }
}
