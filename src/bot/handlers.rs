use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info};

use crate::{
    audio::orchestrator::{PlayOutcome, SkipOutcome},
    bot::{listener_snapshot, ResonaBot},
    error::MusicError,
    ui::messages,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonaBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(ctx, &command, "❌ Este comando solo funciona en un servidor", true).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        _ => respond(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(url) = option_str(command, "url") else {
        return respond(ctx, command, "❌ Falta la URL", true).await;
    };

    // la resolución puede tardar más que la ventana de respuesta: defer
    command.defer(&ctx.http).await?;

    if let Err(e) = ensure_connected(ctx, command, bot, guild_id).await {
        report_error(&e);
        return edit(ctx, command, &messages::for_error(&e)).await;
    }

    match bot.orchestrator.request_play(guild_id, command.user.id, &url).await {
        Ok(PlayOutcome::Started(track)) => edit(ctx, command, &messages::now_playing(&track)).await,
        Ok(PlayOutcome::Queued(track)) => {
            edit(ctx, command, &messages::queued(&track, command.user.id)).await
        }
        Err(e) => {
            report_error(&e);
            edit(ctx, command, &messages::for_error(&e)).await
        }
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<()> {
    let listeners = listener_snapshot(ctx, guild_id);

    // "force" solo cuenta con permiso de gestión
    let force_requested = option_bool(command, "force").unwrap_or(false);
    let can_force = command
        .member
        .as_ref()
        .and_then(|m| m.permissions)
        .map(|p| p.manage_guild())
        .unwrap_or(false);

    match bot
        .orchestrator
        .skip(guild_id, command.user.id, &listeners, force_requested && can_force)
        .await
    {
        Ok(SkipOutcome::Skipped) => respond(ctx, command, &messages::skipped(), false).await,
        Ok(SkipOutcome::VotePending { have, needed }) => {
            respond(ctx, command, &messages::vote_registered(have, needed), false).await
        }
        Err(e) => {
            report_error(&e);
            respond(ctx, command, &messages::for_error(&e), true).await
        }
    }
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<()> {
    let level = option_int(command, "level").unwrap_or(100).clamp(0, 100) as u32;
    bot.orchestrator.set_volume(guild_id, level).await;
    respond(ctx, command, &messages::volume_set(level), false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<()> {
    let titles = bot.orchestrator.queue_titles(guild_id);
    respond(ctx, command, &messages::queue_listing(&titles), false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.orchestrator.now_playing(guild_id) {
        Some(track) => respond(ctx, command, &messages::now_playing(&track), false).await,
        None => respond(ctx, command, "📭  |  No hay nada sonando", true).await,
    }
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<()> {
    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let has_perms = bot_has_voice_perms(ctx, guild_id, voice_channel);

    match bot
        .orchestrator
        .connect(guild_id, voice_channel, Some(command.channel_id), has_perms)
        .await
    {
        Ok(()) => {
            respond(
                ctx,
                command,
                "🔊  |  Conectado; este canal queda vinculado para los avisos",
                false,
            )
            .await
        }
        Err(e) => {
            report_error(&e);
            respond(ctx, command, &messages::for_error(&e), true).await
        }
    }
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.orchestrator.disconnect(guild_id).await {
        Ok(()) => respond(ctx, command, "👋  |  Desconectado", false).await,
        Err(e) => {
            report_error(&e);
            respond(ctx, command, &messages::for_error(&e), true).await
        }
    }
}

/// Conecta y vincula este canal de texto si la guild aún no tiene llamada.
async fn ensure_connected(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonaBot,
    guild_id: GuildId,
) -> Result<(), MusicError> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| MusicError::Internal("songbird no inicializado".to_string()))?;
    if manager.get(guild_id).is_some() {
        return Ok(());
    }

    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let has_perms = bot_has_voice_perms(ctx, guild_id, voice_channel);
    bot.orchestrator
        .connect(guild_id, voice_channel, Some(command.channel_id), has_perms)
        .await
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user_id).and_then(|vs| vs.channel_id)
}

fn bot_has_voice_perms(
    ctx: &Context,
    guild_id: GuildId,
    voice_channel: Option<ChannelId>,
) -> bool {
    // sin canal, el chequeo de NotAChannel manda; sin caché, decide el join
    let Some(channel_id) = voice_channel else {
        return true;
    };
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return true;
    };
    let (Some(channel), Some(member)) = (guild.channels.get(&channel_id), guild.members.get(&bot_id))
    else {
        return true;
    };

    let perms = guild.user_permissions_in(channel, member);
    perms.connect() && perms.speak()
}

/// Los fallos que no son de dominio se loggean con contexto completo; el
/// usuario solo ve el mensaje opaco.
fn report_error(error: &MusicError) {
    if !error.is_domain() {
        error!("Error inesperado atendiendo un comando: {:?}", error);
    }
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

fn option_str(command: &CommandInteraction, name: &str) -> Option<String> {
    command.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

fn option_int(command: &CommandInteraction, name: &str) -> Option<i64> {
    command.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Integer(i) => Some(*i),
        _ => None,
    })
}

fn option_bool(command: &CommandInteraction, name: &str) -> Option<bool> {
    command.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Boolean(b) => Some(*b),
        _ => None,
    })
}
