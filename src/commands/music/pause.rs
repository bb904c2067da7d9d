use super::*;
use crate::commands::music::utils::embedded_messages;

/// Pause the current track
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn pause(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    let reply = match ctx.data().music.pause(guild_id).await {
        Ok(track) => embedded_messages::paused(&track),
        Err(err) => embedded_messages::error(&err),
    };
    ctx.send(reply).await?;

    Ok(())
}
