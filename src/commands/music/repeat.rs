//! Defines the `loop` command for re-queueing finished tracks.

use super::*;
use crate::commands::music::utils::{embedded_messages, sequencer::LoopMode};

/// Turn looping on or off, or toggle it when no mode is given.
///
/// While looping, every finished track goes back to the end of the queue.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "loop",
    category = "Music"
)]
pub async fn repeat(
    ctx: Context<'_>,
    #[description = "on or off"] mode: Option<String>,
) -> CommandResult {
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;

    let result = match mode.as_deref().unwrap_or("toggle").parse::<LoopMode>() {
        Ok(mode) => ctx.data().music.set_loop(guild_id, mode).await,
        Err(err) => Err(err),
    };

    let reply = match result {
        Ok(enabled) => embedded_messages::loop_status(enabled),
        Err(err) => embedded_messages::error(&err),
    };
    ctx.send(reply).await?;

    Ok(())
}
