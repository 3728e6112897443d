use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::{error::MusicError, resolver::Track};

/// Capacidad de reproducción consumida por el orquestador.
///
/// La implementación real va sobre songbird; los tests usan un fake que
/// registra las invocaciones.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn join(&self, guild_id: GuildId, voice_channel: ChannelId) -> Result<(), MusicError>;
    async fn play(&self, guild_id: GuildId, track: &Track, volume: f32) -> Result<(), MusicError>;
    async fn stop(&self, guild_id: GuildId, cleanup: bool) -> Result<(), MusicError>;
    async fn skip(&self, guild_id: GuildId) -> Result<(), MusicError>;
}

/// Backend songbird: reproduce la URL directa del stream y avisa por el
/// canal `finished_tx` cuando termina cada track.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current_tracks: DashMap<GuildId, TrackHandle>,
    finished_tx: UnboundedSender<GuildId>,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, finished_tx: UnboundedSender<GuildId>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            current_tracks: DashMap::new(),
            finished_tx,
        }
    }
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    async fn join(&self, guild_id: GuildId, voice_channel: ChannelId) -> Result<(), MusicError> {
        match self.manager.join(guild_id, voice_channel).await {
            Ok(_call) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => Err(MusicError::ConnectError(e.to_string())),
        }
    }

    async fn play(&self, guild_id: GuildId, track: &Track, volume: f32) -> Result<(), MusicError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| MusicError::Internal("sin conexión de voz activa".to_string()))?;

        let input = Input::from(HttpRequest::new(self.http.clone(), track.audio_url.clone()));

        let mut handler = call.lock().await;
        let track_handle = handler.play_input(input);
        let _ = track_handle.set_volume(volume.clamp(0.0, 2.0));

        track_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id,
                    finished_tx: self.finished_tx.clone(),
                },
            )
            .map_err(|e| MusicError::Internal(format!("no se pudo registrar el evento de fin: {e}")))?;

        self.current_tracks.insert(guild_id, track_handle);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId, cleanup: bool) -> Result<(), MusicError> {
        if let Some((_, handle)) = self.current_tracks.remove(&guild_id) {
            let _ = handle.stop();
            info!("⏹️ Reproducción detenida en guild {}", guild_id);
        }

        if cleanup && self.manager.get(guild_id).is_some() {
            self.manager
                .remove(guild_id)
                .await
                .map_err(|e| MusicError::Internal(format!("no se pudo soltar la conexión: {e}")))?;
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }

        Ok(())
    }

    async fn skip(&self, guild_id: GuildId) -> Result<(), MusicError> {
        if let Some(handle) = self.current_tracks.get(&guild_id) {
            // detener el track dispara TrackEvent::End y con él el avance
            let _ = handle.stop();
            info!("⏭️ Track saltado en guild {}", guild_id);
        }
        Ok(())
    }
}

/// Notifica el fin de cada track al loop de avance
struct TrackEndNotifier {
    guild_id: GuildId,
    finished_tx: UnboundedSender<GuildId>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track terminado en guild {}", self.guild_id);
        if self.finished_tx.send(self.guild_id).is_err() {
            error!("El loop de avance ya no está escuchando");
        }
        None
    }
}
