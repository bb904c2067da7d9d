use super::*;
use crate::commands::music::utils::embedded_messages;

/// Skip the currently playing song
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn skip(ctx: Context<'_>) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    let reply = match ctx.data().music.skip(guild_id).await {
        Ok(track) => embedded_messages::skipped(&track),
        Err(err) => embedded_messages::error(&err),
    };
    ctx.send(reply).await?;

    Ok(())
}
