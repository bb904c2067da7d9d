//! Test fixtures for the music sessions

use jukebox::commands::music::audio_sources::Track;
use jukebox::commands::music::utils::music_manager::MusicManager;
use jukebox::config::MusicConfig;
use rstest::fixture;
use serenity::all::{ChannelId, GuildId};
use std::time::Duration;

/// Sample guild IDs for testing
pub const GUILD: GuildId = GuildId::new(111222333);
pub const OTHER_GUILD: GuildId = GuildId::new(444555666);

/// Voice channel the command author listens in
pub const VOICE_CHANNEL: ChannelId = ChannelId::new(777888999);

/// A track whose locator is derived from its title
pub fn track(title: &str) -> Track {
    Track::new(title, format!("https://cdn.example/{}.webm", title))
        .with_webpage_url(format!("https://www.youtube.com/watch?v={}", title))
        .with_duration(Duration::from_secs(180))
}

pub fn config() -> MusicConfig {
    MusicConfig {
        queue_capacity: 5,
        idle_timeout: Some(Duration::from_secs(30)),
        ..MusicConfig::default()
    }
}

#[fixture]
pub fn manager() -> MusicManager {
    super::init();
    MusicManager::new(&config())
}
