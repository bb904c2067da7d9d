use super::*;
use crate::commands::music::utils::embedded_messages;
use crate::commands::music::utils::voice::{connect_to_author, get_user_voice_channel};
use tracing::{error, info};

/// Play a song from a search term or URL, joining your voice channel if needed
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn play(
    ctx: Context<'_>,
    #[description = "URL or search query"]
    #[rest]
    query: String,
) -> CommandResult {
    info!("Received play command with query: {}", query);
    let guild_id = ctx.guild_id().ok_or(MusicError::NotInGuild)?;
    let data = ctx.data();
    let listener_channel =
        get_user_voice_channel(ctx.serenity_context(), guild_id, ctx.author().id).ok();

    if !data.music.is_active(guild_id) {
        if let Err(err) = connect_to_author(ctx, guild_id).await {
            ctx.send(embedded_messages::error(&err)).await?;
            return Ok(());
        }
    }

    // Defer the response since resolving the query might take time
    ctx.defer().await?;

    let outcome = data
        .music
        .play(guild_id, listener_channel, data.resolver.as_ref(), &query)
        .await;
    match outcome {
        Ok(outcome) => {
            ctx.send(embedded_messages::enqueued(&outcome)).await?;
        }
        Err(err) => {
            error!("Failed to play `{}` in guild {}: {}", query, guild_id, err);
            ctx.send(embedded_messages::error(&err)).await?;
        }
    }

    Ok(())
}
