use super::*;
use crate::commands::music::utils::embedded_messages;

/// Stop the music, clear the queue, and leave the voice channel
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn stop(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    let was_connected = ctx.data().music.stop(guild_id).await;
    ctx.send(embedded_messages::stopped(was_connected)).await?;

    Ok(())
}
