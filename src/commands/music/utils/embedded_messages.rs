use poise::{CreateReply, serenity_prelude as serenity};
use serenity::all::{ChannelId, CreateEmbed};

use super::announcements::Notice;
use super::format_duration;
use super::music_manager::MusicError;
use super::sequencer::{Enqueued, QueueSnapshot};
use crate::commands::music::audio_sources::Track;

const COLOR_OK: u32 = 0x00ff00;
const COLOR_ERROR: u32 = 0xff0000;

/// Title linked to the track's page when one is known
fn linked_title(track: &Track) -> String {
    match track.webpage_url() {
        Some(url) => format!("[{}]({})", track.title(), url),
        None => track.title().to_string(),
    }
}

fn with_duration(embed: CreateEmbed, track: &Track) -> CreateEmbed {
    match track.duration() {
        Some(duration) => embed.field("Duration", format!("`{}`", format_duration(duration)), true),
        None => embed,
    }
}

/// Create an ephemeral embed describing a failed music operation
pub fn error(err: &MusicError) -> CreateReply {
    CreateReply::default()
        .embed(
            CreateEmbed::new()
                .title("❌ Error")
                .description(err.to_string())
                .color(COLOR_ERROR),
        )
        .ephemeral(true)
}

/// Create an embed for when the bot joins a voice channel
pub fn joined(channel_id: ChannelId) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title("🔊 Joined")
            .description(format!("Joined <#{}>", channel_id))
            .color(COLOR_OK),
    )
}

/// Create an embed for a track that was just played or queued
pub fn enqueued(outcome: &Enqueued) -> CreateReply {
    let embed = match outcome {
        Enqueued::Playing(track) => with_duration(
            CreateEmbed::new()
                .title("🎵 Now Playing")
                .description(linked_title(track))
                .color(COLOR_OK),
            track,
        ),
        Enqueued::Queued { track, position } => with_duration(
            CreateEmbed::new()
                .title("🎵 Added to Queue")
                .description(linked_title(track))
                .color(COLOR_OK),
            track,
        )
        .field("Position", format!("`#{}`", position), true),
    };

    CreateReply::default().embed(embed)
}

/// Create an embed listing the now-playing track and what is up next
pub fn queue(snapshot: &QueueSnapshot) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title("🎵 Music Queue")
            .description(snapshot.to_string())
            .color(COLOR_OK),
    )
}

/// Create an embed for when a track is skipped
pub fn skipped(track: &Track) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title("⏭️ Skipped")
            .description(format!("Skipped {}", linked_title(track)))
            .color(COLOR_OK),
    )
}

/// Create an embed for when a track is paused
pub fn paused(track: &Track) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title("⏸️ Paused")
            .description(format!("Paused {}", linked_title(track)))
            .color(COLOR_OK),
    )
}

/// Create an embed for when a track is resumed
pub fn resumed(track: &Track) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title("▶️ Resumed")
            .description(format!("Resumed {}", linked_title(track)))
            .color(COLOR_OK),
    )
}

/// Create an embed for when looping is switched on or off
pub fn loop_status(enabled: bool) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title(if enabled {
                "🔁 Looping Enabled"
            } else {
                "➡️ Looping Disabled"
            })
            .description(if enabled {
                "Finished tracks go back to the end of the queue"
            } else {
                "Finished tracks are dropped from the queue"
            })
            .color(COLOR_OK),
    )
}

/// Create an embed for when the bot stops playing music
pub fn stopped(was_connected: bool) -> CreateReply {
    CreateReply::default().embed(
        CreateEmbed::new()
            .title("⏹️ Stopped")
            .description(if was_connected {
                "Stopped playback and disconnected"
            } else {
                "Nothing to stop"
            })
            .color(COLOR_OK),
    )
}

/// Embed for a notice a session posts on its own
pub fn notice(notice: &Notice) -> CreateEmbed {
    match notice {
        Notice::NowPlaying(track) => with_duration(
            CreateEmbed::new()
                .title("🎵 Now Playing")
                .description(linked_title(track))
                .color(COLOR_OK),
            track,
        ),
        Notice::PlaybackFailed { .. } => CreateEmbed::new()
            .title("⚠️ Playback Failed")
            .description(notice.to_string())
            .color(COLOR_ERROR),
        Notice::IdleDisconnect => CreateEmbed::new()
            .title("👋 Left Voice Channel")
            .description(notice.to_string())
            .color(COLOR_OK),
    }
}
