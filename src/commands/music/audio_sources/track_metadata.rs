//! Defines the `Track` record that flows from a resolver, through the queue, to the audio sink.

use std::fmt;
use std::time::Duration;

use crate::commands::music::utils::format_duration;

/// A playable track: what to show the user and where the audio sink reads from.
///
/// Fields are fixed once the resolver has built the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    stream_locator: String,
    webpage_url: Option<String>,
    duration: Option<Duration>,
}

impl Track {
    pub fn new(title: impl Into<String>, stream_locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stream_locator: stream_locator.into(),
            webpage_url: None,
            duration: None,
        }
    }

    pub fn with_webpage_url(mut self, url: impl Into<String>) -> Self {
        self.webpage_url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// URI the audio sink opens to produce frames.
    pub fn stream_locator(&self) -> &str {
        &self.stream_locator
    }

    /// Human-facing page for the track, when the resolver knows one.
    pub fn webpage_url(&self) -> Option<&str> {
        self.webpage_url.as_deref()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration {
            Some(duration) => write!(f, "{} ({})", self.title, format_duration(duration)),
            None => write!(f, "{}", self.title),
        }
    }
}
