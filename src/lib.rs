//! Voice-channel music bot: resolves queries with yt-dlp, queues them per guild
//! and streams them into a voice call through ffmpeg and songbird.

use std::sync::Arc;

pub mod commands;
pub mod config;

use commands::music::audio_sources::TrackResolver;
use commands::music::utils::music_manager::MusicManager;
use config::MusicConfig;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type CommandResult = Result<(), Error>;

/// User data, which is stored and accessible in all command invocations
pub struct Data {
    pub music: Arc<MusicManager>,
    pub resolver: Arc<dyn TrackResolver>,
    pub config: MusicConfig,
}
