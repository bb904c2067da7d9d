//! Implements `TrackResolver` on top of the `yt-dlp` command-line tool.

use serde::Deserialize;
use serenity::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Track, TrackResolver, is_url};
use crate::commands::music::utils::music_manager::{MusicError, MusicResult};

/// Subset of `yt-dlp -j` output the resolver cares about.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    title: Option<String>,
    /// Direct media URL for the selected format.
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    /// Present when the output describes a search result or playlist.
    #[serde(default)]
    entries: Vec<YtDlpEntry>,
}

impl YtDlpEntry {
    fn flatten_into(self, tracks: &mut Vec<Track>) {
        let YtDlpEntry {
            title,
            url,
            webpage_url,
            duration,
            entries,
        } = self;

        if let Some(url) = url {
            let mut track = Track::new(title.unwrap_or_else(|| "Unknown Title".to_string()), url);
            if let Some(page) = webpage_url {
                track = track.with_webpage_url(page);
            }
            if let Some(secs) = duration.filter(|d| d.is_finite() && *d >= 0.0) {
                track = track.with_duration(Duration::from_secs_f64(secs));
            }
            tracks.push(track);
        }

        for entry in entries {
            entry.flatten_into(tracks);
        }
    }
}

/// Resolves queries by running `yt-dlp` as a child process.
pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// URLs go to yt-dlp untouched; anything else becomes a single-result search.
    pub fn search_target(query: &str) -> String {
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    /// Parses `yt-dlp -j` output (one JSON document per line) into tracks.
    pub fn parse_output(stdout: &str) -> MusicResult<Vec<Track>> {
        let mut tracks = Vec::new();

        for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let entry: YtDlpEntry = serde_json::from_str(line).map_err(|e| {
                MusicError::ResolutionFailure(format!("Failed to parse video metadata: {}", e))
            })?;
            entry.flatten_into(&mut tracks);
        }

        Ok(tracks)
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn candidates(&self, query: &str) -> MusicResult<Vec<Track>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::InvalidCommandArgument(
                "Give me something to search for or a URL.".to_string(),
            ));
        }

        let target = Self::search_target(query);
        info!("Resolving `{}` with {}", target, self.binary);

        let output = Command::new(&self.binary)
            .args([
                "-j",            // Output as JSON
                "--no-playlist", // Don't process playlists
                "-f",
                "bestaudio/best",
                "--quiet",
                "--no-warnings",
                target.as_str(),
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MusicError::ResolutionFailure(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp exited with {} for `{}`: {}", output.status, target, stderr.trim());
            return Err(MusicError::ResolutionFailure(format!(
                "yt-dlp could not resolve `{}`",
                query
            )));
        }

        let tracks = Self::parse_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!("yt-dlp returned {} candidate(s) for `{}`", tracks.len(), target);
        Ok(tracks)
    }
}
