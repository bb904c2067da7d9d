//! Notices a session posts on its own, outside of any command reply.

use std::fmt;
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use serenity::all::{ChannelId, CreateMessage};
use serenity::async_trait;
use tracing::warn;

use super::embedded_messages;
use crate::commands::music::audio_sources::Track;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A queued track started after the previous one ended.
    NowPlaying(Track),
    /// A track could not be started or broke mid-stream and was skipped.
    PlaybackFailed { track: Track, reason: String },
    /// The session sat empty for too long and left the voice channel.
    IdleDisconnect,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NowPlaying(track) => write!(f, "Now playing: {}", track),
            Notice::PlaybackFailed { track, reason } => {
                write!(f, "Could not play {}: {}. Skipping.", track.title(), reason)
            }
            Notice::IdleDisconnect => {
                write!(f, "Left the voice channel after the queue stayed empty.")
            }
        }
    }
}

#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, notice: Notice);
}

/// Posts notices as embeds in the text channel a session was opened from.
pub struct ChannelAnnouncer {
    http: Arc<serenity::Http>,
    channel_id: ChannelId,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<serenity::Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn announce(&self, notice: Notice) {
        let message = CreateMessage::new().embed(embedded_messages::notice(&notice));
        if let Err(e) = self.channel_id.send_message(&self.http, message).await {
            warn!("Failed to post notice in channel {}: {}", self.channel_id, e);
        }
    }
}

/// Announcer that only logs, for sessions without a text channel.
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn announce(&self, notice: Notice) {
        tracing::info!("{}", notice);
    }
}
