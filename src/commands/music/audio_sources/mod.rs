//! Turning a user query (search term or URL) into playable tracks.

pub mod track_metadata;
pub mod youtube;

use serenity::async_trait;
use url::Url;

use crate::commands::music::utils::music_manager::{MusicError, MusicResult};
pub use track_metadata::Track;

/// Resolves a free-text query or URL into tracks the audio sink can play.
///
/// Implementations report every failure as a `MusicError` value and never panic
/// into the caller.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// All candidates for `query`, best match first.
    async fn candidates(&self, query: &str) -> MusicResult<Vec<Track>>;

    /// The first candidate for `query`.
    async fn resolve(&self, query: &str) -> MusicResult<Track> {
        self.candidates(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::ResolutionFailure(format!("No results for `{}`", query)))
    }
}

/// Check if a string is an http(s) URL rather than a search term
pub fn is_url(input: &str) -> bool {
    Url::parse(input).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
