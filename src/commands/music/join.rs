use super::*;
use crate::commands::music::utils::{embedded_messages, voice::connect_to_author};

/// Join your voice channel, or move there if already connected elsewhere
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn join(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    match connect_to_author(ctx, guild_id).await {
        Ok(channel_id) => ctx.send(embedded_messages::joined(channel_id)).await?,
        Err(err) => ctx.send(embedded_messages::error(&err)).await?,
    };

    Ok(())
}
