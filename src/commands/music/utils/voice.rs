//! Voice channel plumbing between serenity/songbird and the music sessions.

use poise::serenity_prelude as serenity;
use serenity::client::Context as SerenityContext;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{error, info};

use super::announcements::{Announcer, ChannelAnnouncer};
use super::audio_sink::{AudioSink, SongbirdSink};
use super::music_manager::{MusicError, MusicResult};
use crate::Context;

/// Get the Songbird voice client from the context
pub async fn get_songbird(ctx: &SerenityContext) -> MusicResult<Arc<Songbird>> {
    songbird::get(ctx).await.ok_or(MusicError::NoVoiceManager)
}

/// Get the voice channel ID that the user is currently in
pub fn get_user_voice_channel(
    ctx: &SerenityContext,
    guild_id: GuildId,
    user_id: UserId,
) -> MusicResult<ChannelId> {
    let guild = ctx.cache.guild(guild_id).ok_or(MusicError::NotInGuild)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or(MusicError::UserNotInVoiceChannel)
}

/// Joins (or moves to) the command author's voice channel and makes sure the
/// guild has a music session. Returns the channel joined.
pub async fn connect_to_author(ctx: Context<'_>, guild_id: GuildId) -> MusicResult<ChannelId> {
    let channel_id = get_user_voice_channel(ctx.serenity_context(), guild_id, ctx.author().id)?;
    let songbird = get_songbird(ctx.serenity_context()).await?;
    let data = ctx.data();
    data.music.settle(guild_id).await;

    // Songbird reuses an existing call for the guild and just moves it.
    let call = songbird.join(guild_id, channel_id).await.map_err(|e| {
        error!(
            "Failed to join voice channel {} for guild {}: {}",
            channel_id, guild_id, e
        );
        MusicError::JoinError(e.to_string())
    })?;
    info!("Connected to voice channel {} in guild {}", channel_id, guild_id);

    let http = ctx.serenity_context().http.clone();
    let text_channel = ctx.channel_id();
    data.music.open_with(guild_id, || {
        let sink: Box<dyn AudioSink> = Box::new(SongbirdSink::new(
            songbird.clone(),
            guild_id,
            call,
            data.config.ffmpeg.clone(),
        ));
        let announcer: Arc<dyn Announcer> = Arc::new(ChannelAnnouncer::new(http, text_channel));
        (sink, announcer)
    });

    Ok(channel_id)
}
