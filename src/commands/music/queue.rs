use super::*;
use crate::commands::music::utils::embedded_messages;

/// View the current music queue
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn queue(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    let snapshot = ctx.data().music.snapshot(guild_id).await;
    ctx.send(embedded_messages::queue(&snapshot)).await?;

    Ok(())
}
