//! # Bot Module
//!
//! Capa de comandos y eventos de Discord sobre el orquestador.
//!
//! [`ResonaBot`] implementa el [`EventHandler`] de serenity y traduce el
//! mundo Discord al núcleo: comandos slash a operaciones del orquestador,
//! cambios de estado de voz a snapshots de oyentes, y el fin de cada track
//! (reportado por el backend) a llamadas de avance.

use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod links;
pub mod notify;

use crate::{
    audio::{
        notify::Notifier,
        orchestrator::{Listener, Orchestrator, PlayOutcome},
    },
    config::Config,
    resolver::MetadataResolver,
    sources::oembed,
    ui::messages,
};

pub struct ResonaBot {
    config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    resolver: Arc<MetadataResolver>,
    notifier: Arc<dyn Notifier>,
    http_client: reqwest::Client,
    /// Receptor de fines de track; lo consume el loop de avance en `ready`
    track_events: parking_lot::Mutex<Option<UnboundedReceiver<GuildId>>>,
    maintenance_started: AtomicBool,
}

impl ResonaBot {
    pub fn new(
        config: Config,
        orchestrator: Arc<Orchestrator>,
        resolver: Arc<MetadataResolver>,
        notifier: Arc<dyn Notifier>,
        track_events: UnboundedReceiver<GuildId>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            resolver,
            notifier,
            http_client: reqwest::Client::new(),
            track_events: parking_lot::Mutex::new(Some(track_events)),
            maintenance_started: AtomicBool::new(false),
        }
    }

    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Link suelto en el canal vinculado: validar, admitir y confirmar.
    async fn handle_link(&self, ctx: &Context, msg: &Message, guild_id: GuildId, video_id: &str) {
        // solo con una conexión de voz viva
        let Some(manager) = songbird::get(ctx).await else {
            return;
        };
        if manager.get(guild_id).is_none() {
            return;
        }

        if let Err(e) = oembed::validate(&self.http_client, video_id).await {
            debug!("Link detectado pero inválido ({}): {}", video_id, e);
            return;
        }

        let url = format!("https://www.youtube.com/watch?v={video_id}");
        match self.orchestrator.request_play(guild_id, msg.author.id, &url).await {
            Ok(outcome) => {
                let track = match &outcome {
                    PlayOutcome::Started(track) | PlayOutcome::Queued(track) => track,
                };
                self.notifier.delete_message(msg.channel_id, msg.id).await;
                self.notifier
                    .send(msg.channel_id, &messages::queued(track, msg.author.id))
                    .await;
            }
            Err(e) => {
                if !e.is_domain() {
                    error!(
                        "Error agregando {} a la cola de guild {}: {:?}",
                        url, guild_id, e
                    );
                }
                self.notifier.send(msg.channel_id, &messages::for_error(&e)).await;
            }
        }
    }
}

#[async_trait]
impl EventHandler for ResonaBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // loop de avance: un track terminó → snapshot de oyentes → advance
        if let Some(mut rx) = self.track_events.lock().take() {
            let orchestrator = self.orchestrator.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                while let Some(guild_id) = rx.recv().await {
                    let listeners = listener_snapshot(&ctx, guild_id);
                    if let Err(e) = orchestrator.advance(guild_id, &listeners).await {
                        warn!("Error avanzando la cola de guild {}: {:?}", guild_id, e);
                    }
                }
            });
        }

        // mantenimiento horario del caché de metadata
        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let resolver = self.resolver.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
                loop {
                    interval.tick().await;
                    resolver.cache().cleanup_old_entries();
                    info!("🧹 Tareas de mantenimiento completadas");
                }
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detección de links en el canal vinculado de cada guild.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(bound) = self.orchestrator.bound_channel(guild_id) else {
            return;
        };
        if bound != msg.channel_id {
            return;
        }

        if let Some(video_id) = links::match_watch_link(&msg.content) {
            self.handle_link(&ctx, &msg, guild_id, &video_id).await;
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id.or_else(|| old.as_ref().and_then(|o| o.guild_id))
        else {
            return;
        };

        // el propio bot fue desconectado: descartar el estado de la guild
        let bot_id = ctx.cache.current_user().id;
        if new.user_id == bot_id && old.is_some() && new.channel_id.is_none() {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.orchestrator.on_transport_closed(guild_id).await;
            return;
        }

        // cambio de membresía: si el bot quedó solo, el orquestador corta
        let listeners = listener_snapshot(&ctx, guild_id);
        if listeners.is_empty() {
            return;
        }
        if let Err(e) = self.orchestrator.on_listeners_changed(guild_id, &listeners).await {
            error!("Error manejando cambio de oyentes en guild {}: {:?}", guild_id, e);
        }
    }
}

/// Snapshot de los miembros del canal de voz donde está el bot.
pub fn listener_snapshot(ctx: &Context, guild_id: GuildId) -> Vec<Listener> {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return Vec::new();
    };
    let Some(bot_channel) = guild.voice_states.get(&bot_id).and_then(|vs| vs.channel_id) else {
        return Vec::new();
    };

    guild
        .voice_states
        .iter()
        .filter(|(_, vs)| vs.channel_id == Some(bot_channel))
        .map(|(user_id, vs)| Listener {
            user_id: *user_id,
            deaf: vs.deaf || vs.self_deaf,
            bot: *user_id == bot_id
                || guild.members.get(user_id).map(|m| m.user.bot).unwrap_or(false),
        })
        .collect()
}
