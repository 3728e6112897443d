use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    audio::{
        backend::AudioBackend,
        notify::Notifier,
        queue::{QueuedTrack, TrackQueues},
        registry::ConnectionRegistry,
        votes::{SkipVotes, VoteOutcome},
    },
    config::Config,
    error::MusicError,
    resolver::{MetadataResolver, Track},
    ui::messages,
};

/// Snapshot de un miembro del canal de voz, tomado por la capa del bot.
#[derive(Debug, Clone, Copy)]
pub struct Listener {
    pub user_id: UserId,
    pub deaf: bool,
    pub bot: bool,
}

/// Estado de reproducción de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Connecting,
    Playing,
    Stopping,
}

/// Resultado de admitir una petición de reproducción.
#[derive(Debug, Clone)]
pub enum PlayOutcome {
    /// La guild estaba libre: el track arrancó ya
    Started(Track),
    /// Había reproducción activa: quedó encolado
    Queued(Track),
}

/// Resultado de una petición de salto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped,
    VotePending { have: usize, needed: usize },
}

#[derive(Debug)]
struct GuildSession {
    state: PlayState,
    volume: f32,
}

/// Máquina de estados de reproducción por guild.
///
/// Toda operación sobre una guild corre dentro de su sección crítica (un
/// `Mutex` por guild): dos peticiones concurrentes jamás observan ambas
/// "no hay nada sonando". Guilds distintas nunca se bloquean entre sí.
pub struct Orchestrator {
    sessions: DashMap<GuildId, Arc<Mutex<GuildSession>>>,
    registry: ConnectionRegistry,
    queues: TrackQueues,
    votes: SkipVotes,
    /// Tokens fuera del candado de sesión: un stop debe poder cortar una
    /// resolución que está esperando dentro de la sección crítica
    cancel_tokens: DashMap<GuildId, CancellationToken>,
    current: DashMap<GuildId, Track>,
    resolver: Arc<MetadataResolver>,
    backend: Arc<dyn AudioBackend>,
    notifier: Arc<dyn Notifier>,
    default_volume: f32,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<MetadataResolver>,
        backend: Arc<dyn AudioBackend>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            registry: ConnectionRegistry::new(),
            queues: TrackQueues::new(config.max_queue_size),
            votes: SkipVotes::new(),
            cancel_tokens: DashMap::new(),
            current: DashMap::new(),
            resolver,
            backend,
            notifier,
            default_volume: config.default_volume,
        }
    }

    /// Conecta el bot a un canal de voz y vincula el canal de texto.
    ///
    /// La vinculación ocurre antes del join; si el join o el chequeo de
    /// permisos fallan, una vinculación recién creada se revierte (una
    /// preexistente queda intacta).
    pub async fn connect(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        text_channel: Option<ChannelId>,
        has_voice_perms: bool,
    ) -> Result<(), MusicError> {
        let (voice, text) = match (voice_channel, text_channel) {
            (Some(v), Some(t)) => (v, t),
            _ => return Err(MusicError::NotAChannel),
        };

        let session = self.session(guild_id);
        let mut s = session.lock().await;

        let was_bound = self.registry.bound_channel(guild_id).is_some();
        self.registry.bind(guild_id, text)?;

        if !has_voice_perms {
            if !was_bound {
                self.registry.unbind(guild_id);
            }
            return Err(MusicError::NoPermission);
        }

        let prev = s.state;
        s.state = PlayState::Connecting;
        match self.backend.join(guild_id, voice).await {
            Ok(()) => {
                s.state = if prev == PlayState::Playing {
                    PlayState::Playing
                } else {
                    PlayState::Idle
                };
                Ok(())
            }
            Err(e) => {
                s.state = prev;
                if !was_bound {
                    self.registry.unbind(guild_id);
                }
                error!(
                    "❌ No se pudo unir al canal de voz {} en guild {}: {}",
                    voice, guild_id, e
                );
                Err(e)
            }
        }
    }

    /// Admite una petición: resuelve la URL y reproduce o encola.
    pub async fn request_play(
        &self,
        guild_id: GuildId,
        requester: UserId,
        raw_input: &str,
    ) -> Result<PlayOutcome, MusicError> {
        let url = normalize_input(raw_input)?;

        let session = self.session(guild_id);
        let mut s = session.lock().await;

        let track = self.resolver.resolve(&url).await?;

        if s.state != PlayState::Playing {
            self.start_track(guild_id, &mut s, &track).await?;
            Ok(PlayOutcome::Started(track))
        } else {
            self.queues.enqueue(
                guild_id,
                QueuedTrack::new(track.url.clone(), track.title.clone(), requester),
            )?;
            Ok(PlayOutcome::Queued(track))
        }
    }

    /// Avanza la cola cuando el track actual terminó.
    ///
    /// Camino de fondo: las entradas muertas se saltan sin molestar al
    /// usuario y la cola vacía detiene limpio.
    pub async fn advance(
        &self,
        guild_id: GuildId,
        listeners: &[Listener],
    ) -> Result<(), MusicError> {
        let token = self.refresh_token(guild_id);

        let session = self.session(guild_id);
        let mut s = session.lock().await;

        if s.state != PlayState::Playing {
            debug!("Avance ignorado en guild {} (estado {:?})", guild_id, s.state);
            return Ok(());
        }
        self.current.remove(&guild_id);

        if bot_is_alone(listeners) {
            return self.shutdown_locked(guild_id, &mut s, true).await;
        }

        let Some(text_channel) = self.registry.bound_channel(guild_id) else {
            warn!("Guild {} sin canal vinculado durante el avance", guild_id);
            let _ = self.shutdown_locked(guild_id, &mut s, false).await;
            return Err(MusicError::NotInChannel);
        };

        loop {
            let Some(entry) = self.queues.dequeue_front(guild_id) else {
                self.notifier.send(text_channel, &messages::queue_finished()).await;
                s.state = PlayState::Stopping;
                self.backend.stop(guild_id, false).await?;
                s.state = PlayState::Idle;
                return Ok(());
            };

            // el stream encolado pudo expirar: siempre se re-resuelve
            let resolved = tokio::select! {
                _ = token.cancelled() => {
                    debug!(
                        "Resolución cancelada en guild {}; se descarta {}",
                        guild_id, entry.title
                    );
                    return Ok(());
                }
                result = self.resolver.resolve(&entry.url) => result,
            };

            match resolved {
                Ok(track) => match self.start_track(guild_id, &mut s, &track).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(
                            "⚠️ No se pudo reproducir {} en guild {}: {}, se salta",
                            entry.title, guild_id, e
                        );
                    }
                },
                Err(e) => {
                    warn!(
                        "⚠️ Entrada muerta en la cola de guild {} ({}): {}, se salta",
                        guild_id, entry.title, e
                    );
                }
            }
        }
    }

    /// Salta el track actual, con voto ponderado cuando hay sala.
    pub async fn skip(
        &self,
        guild_id: GuildId,
        requester: UserId,
        listeners: &[Listener],
        force: bool,
    ) -> Result<SkipOutcome, MusicError> {
        let session = self.session(guild_id);
        let _s = session.lock().await;

        if !force && listeners.len() > 2 {
            let eligible = listeners.iter().filter(|l| !l.bot && !l.deaf).count();
            match self.votes.cast(guild_id, requester, eligible) {
                VoteOutcome::AlreadyVoted => return Err(MusicError::AlreadyVoted),
                VoteOutcome::Pending { have, needed } => {
                    return Ok(SkipOutcome::VotePending { have, needed });
                }
                VoteOutcome::Passed => {}
            }
        } else {
            // forzado o sala chica: época nueva de votos
            self.votes.clear(guild_id);
        }

        self.backend.skip(guild_id).await?;
        Ok(SkipOutcome::Skipped)
    }

    /// Fija el volumen configurado; el backend lo acota a su rango.
    pub async fn set_volume(&self, guild_id: GuildId, percent: u32) {
        let session = self.session(guild_id);
        let mut s = session.lock().await;
        s.volume = (percent as f32 * 2.0) / 100.0;
        info!("🔊 Volumen de guild {} fijado a {}%", guild_id, percent);
    }

    /// Evento de membresía: si el bot quedó solo, detiene con limpieza.
    /// El vínculo de canal NO se limpia en este camino.
    pub async fn on_listeners_changed(
        &self,
        guild_id: GuildId,
        listeners: &[Listener],
    ) -> Result<(), MusicError> {
        if !bot_is_alone(listeners) {
            return Ok(());
        }

        self.cancel_pending(guild_id);

        let session = self.session(guild_id);
        let mut s = session.lock().await;

        if let Some(text_channel) = self.registry.bound_channel(guild_id) {
            self.notifier.send(text_channel, &messages::left_alone()).await;
        }

        self.shutdown_locked(guild_id, &mut s, true).await
    }

    /// El transporte se cerró (nos echaron o se cayó la conexión):
    /// se descarta todo el estado de la guild, vínculo incluido.
    pub async fn on_transport_closed(&self, guild_id: GuildId) {
        self.cancel_pending(guild_id);

        let session = self.session(guild_id);
        let mut s = session.lock().await;

        info!("🔌 Transporte cerrado en guild {}; se descarta el estado", guild_id);
        self.queues.clear(guild_id);
        self.votes.clear(guild_id);
        self.current.remove(&guild_id);
        self.registry.unbind(guild_id);
        let _ = self.backend.stop(guild_id, false).await;
        s.state = PlayState::Idle;
    }

    /// Desconexión pedida por un usuario (/leave): detiene, suelta el
    /// transporte y desvincula.
    pub async fn disconnect(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.cancel_pending(guild_id);

        let session = self.session(guild_id);
        let mut s = session.lock().await;

        let result = self.shutdown_locked(guild_id, &mut s, true).await;
        self.registry.unbind(guild_id);
        result
    }

    pub fn bound_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.registry.bound_channel(guild_id)
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        let session = self.session(guild_id);
        let s = session.lock().await;
        s.state == PlayState::Playing
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.current.get(&guild_id).map(|t| t.clone())
    }

    pub fn queue_len(&self, guild_id: GuildId) -> usize {
        self.queues.len(guild_id)
    }

    pub fn queue_titles(&self, guild_id: GuildId) -> Vec<String> {
        self.queues.titles(guild_id)
    }

    // -- internos --

    fn session(&self, guild_id: GuildId) -> Arc<Mutex<GuildSession>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(GuildSession {
                    state: PlayState::Idle,
                    volume: self.default_volume,
                }))
            })
            .clone()
    }

    async fn start_track(
        &self,
        guild_id: GuildId,
        s: &mut GuildSession,
        track: &Track,
    ) -> Result<(), MusicError> {
        // un fallo del backend propaga sin tocar cola ni estado
        self.backend.play(guild_id, track, s.volume).await?;
        s.state = PlayState::Playing;
        self.votes.clear(guild_id);
        self.current.insert(guild_id, track.clone());
        info!("🎵 Reproduciendo en guild {}: {}", guild_id, track.title);
        Ok(())
    }

    async fn shutdown_locked(
        &self,
        guild_id: GuildId,
        s: &mut GuildSession,
        cleanup: bool,
    ) -> Result<(), MusicError> {
        s.state = PlayState::Stopping;
        self.votes.clear(guild_id);
        self.current.remove(&guild_id);
        if cleanup {
            self.queues.clear(guild_id);
        }
        let result = self.backend.stop(guild_id, cleanup).await;
        s.state = PlayState::Idle;
        result
    }

    fn refresh_token(&self, guild_id: GuildId) -> CancellationToken {
        let mut entry = self.cancel_tokens.entry(guild_id).or_default();
        if entry.is_cancelled() {
            *entry = CancellationToken::new();
        }
        entry.clone()
    }

    fn cancel_pending(&self, guild_id: GuildId) {
        if let Some(token) = self.cancel_tokens.get(&guild_id) {
            token.cancel();
        }
    }
}

fn bot_is_alone(listeners: &[Listener]) -> bool {
    listeners.len() == 1 && listeners[0].bot
}

/// Normaliza la entrada cruda del usuario a una URL http(s).
///
/// Discord envuelve URLs en `<...>` para suprimir el preview; se quita
/// antes de validar.
fn normalize_input(raw: &str) -> Result<String, MusicError> {
    let stripped = raw.trim().trim_start_matches('<').trim_end_matches('>').trim();
    if stripped.is_empty() {
        return Err(MusicError::InvalidInput("entrada vacía".to_string()));
    }

    let parsed =
        Url::parse(stripped).map_err(|_| MusicError::InvalidInput(stripped.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MusicError::InvalidInput(stripped.to_string()));
    }

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ExtractError, MetadataExtractor, RawFormat, RawMedia};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const GUILD: GuildId = GuildId::new(7);
    const TEXT: ChannelId = ChannelId::new(70);
    const VOICE: ChannelId = ChannelId::new(71);

    fn watch_url(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={id}")
    }

    fn media(id: &str, duration: u64) -> RawMedia {
        RawMedia {
            id: id.to_string(),
            title: format!("Track {id}"),
            thumbnail: None,
            duration_seconds: Some(duration),
            formats: vec![RawFormat {
                itag: Some(251),
                container: Some("webm".to_string()),
                audio_bitrate: Some(160.0),
                video_bitrate: None,
                url: Some(format!("https://cdn/{id}")),
            }],
        }
    }

    /// Extractor de tabla: URL canónica → metadata, contando llamadas
    #[derive(Default)]
    struct TableExtractor {
        media: HashMap<String, RawMedia>,
        broken: HashSet<String>,
        calls: AtomicUsize,
    }

    impl TableExtractor {
        fn with(ids: &[&str]) -> Self {
            let mut table = Self::default();
            for id in ids {
                table.media.insert(watch_url(id), media(id, 180));
            }
            table
        }

        fn broken(mut self, id: &str) -> Self {
            self.broken.insert(watch_url(id));
            self
        }
    }

    #[async_trait]
    impl MetadataExtractor for TableExtractor {
        async fn extract(&self, url: &str) -> Result<RawMedia, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.contains(url) {
                return Err(ExtractError::Upstream("stream muerto".to_string()));
            }
            self.media.get(url).cloned().ok_or(ExtractError::NotFound)
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        plays: parking_lot::Mutex<Vec<(GuildId, String, f32)>>,
        stops: parking_lot::Mutex<Vec<(GuildId, bool)>>,
        skips: parking_lot::Mutex<Vec<GuildId>>,
        fail_join: AtomicBool,
        fail_play: AtomicBool,
    }

    #[async_trait]
    impl AudioBackend for FakeBackend {
        async fn join(&self, _guild_id: GuildId, _voice: ChannelId) -> Result<(), MusicError> {
            if self.fail_join.load(Ordering::SeqCst) {
                return Err(MusicError::ConnectError("join rechazado".to_string()));
            }
            Ok(())
        }

        async fn play(
            &self,
            guild_id: GuildId,
            track: &Track,
            volume: f32,
        ) -> Result<(), MusicError> {
            if self.fail_play.load(Ordering::SeqCst) {
                return Err(MusicError::Internal("el driver explotó".to_string()));
            }
            self.plays.lock().push((guild_id, track.video_id.clone(), volume));
            Ok(())
        }

        async fn stop(&self, guild_id: GuildId, cleanup: bool) -> Result<(), MusicError> {
            self.stops.lock().push((guild_id, cleanup));
            Ok(())
        }

        async fn skip(&self, guild_id: GuildId) -> Result<(), MusicError> {
            self.skips.lock().push(guild_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: parking_lot::Mutex<Vec<(ChannelId, String)>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send(&self, channel: ChannelId, text: &str) {
            self.sent.lock().push((channel, text.to_string()));
        }

        async fn delete_message(
            &self,
            _channel: ChannelId,
            _message: serenity::model::id::MessageId,
        ) {
        }
    }

    fn setup(
        extractor: TableExtractor,
    ) -> (Arc<Orchestrator>, Arc<FakeBackend>, Arc<FakeNotifier>) {
        let config = Config::default();
        let resolver = Arc::new(MetadataResolver::new(Arc::new(extractor), &config));
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(FakeNotifier::default());
        let orchestrator = Arc::new(Orchestrator::new(
            resolver,
            backend.clone(),
            notifier.clone(),
            &config,
        ));
        (orchestrator, backend, notifier)
    }

    /// Sala con el bot más `humans` oyentes sin sordera
    fn room(humans: u64) -> Vec<Listener> {
        let mut listeners = vec![Listener {
            user_id: UserId::new(1000),
            deaf: false,
            bot: true,
        }];
        for i in 0..humans {
            listeners.push(Listener {
                user_id: UserId::new(i + 1),
                deaf: false,
                bot: false,
            });
        }
        listeners
    }

    async fn connected(orchestrator: &Orchestrator) {
        orchestrator
            .connect(GUILD, Some(VOICE), Some(TEXT), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_play_queue_and_advance_scenario() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&["aaa", "bbb"]));
        connected(&orchestrator).await;

        // guild libre: arranca ya
        let first = orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();
        assert!(matches!(first, PlayOutcome::Started(_)));
        assert!(orchestrator.is_playing(GUILD).await);
        assert_eq!(backend.plays.lock().len(), 1);

        // guild ocupada: encola, sin segunda invocación al player
        let second = orchestrator
            .request_play(GUILD, UserId::new(2), &watch_url("bbb"))
            .await
            .unwrap();
        assert!(matches!(second, PlayOutcome::Queued(_)));
        assert_eq!(orchestrator.queue_len(GUILD), 1);
        assert_eq!(backend.plays.lock().len(), 1);
        assert_eq!(orchestrator.now_playing(GUILD).unwrap().video_id, "aaa");

        // fin del track: el avance desencola, re-resuelve y reproduce
        orchestrator.advance(GUILD, &room(2)).await.unwrap();
        let plays = backend.plays.lock();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[1].1, "bbb");
        drop(plays);
        assert_eq!(orchestrator.queue_len(GUILD), 0);
        assert_eq!(orchestrator.now_playing(GUILD).unwrap().video_id, "bbb");
    }

    #[tokio::test]
    async fn test_single_flight_under_concurrent_requests() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&["aaa", "bbb"]));
        connected(&orchestrator).await;

        let url_a = watch_url("aaa");
        let url_b = watch_url("bbb");
        let (a, b) = tokio::join!(
            orchestrator.request_play(GUILD, UserId::new(1), &url_a),
            orchestrator.request_play(GUILD, UserId::new(2), &url_b),
        );
        a.unwrap();
        b.unwrap();

        // exactamente una invocación directa; la otra petición quedó en cola
        assert_eq!(backend.plays.lock().len(), 1);
        assert_eq!(orchestrator.queue_len(GUILD), 1);
    }

    #[tokio::test]
    async fn test_advance_on_empty_queue_notifies_and_stops() {
        let (orchestrator, backend, notifier) = setup(TableExtractor::with(&["aaa"]));
        connected(&orchestrator).await;
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();

        orchestrator.advance(GUILD, &room(2)).await.unwrap();

        assert!(!orchestrator.is_playing(GUILD).await);
        assert_eq!(backend.stops.lock().as_slice(), &[(GUILD, false)]);
        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, TEXT);
        // el transporte sigue conectado y el vínculo intacto
        drop(sent);
        assert_eq!(orchestrator.bound_channel(GUILD), Some(TEXT));
    }

    #[tokio::test]
    async fn test_advance_skips_dead_entries_without_stalling() {
        let extractor = TableExtractor::with(&["aaa", "ccc"]).broken("bbb");
        let (orchestrator, backend, _) = setup(extractor);
        connected(&orchestrator).await;

        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();
        // "bbb" entra a la cola sin resolverse porque la resolución inicial
        // usa la tabla también: encolamos a mano para simular el stream muerto
        orchestrator
            .queues
            .enqueue(
                GUILD,
                QueuedTrack::new(watch_url("bbb"), "Track bbb".to_string(), UserId::new(2)),
            )
            .unwrap();
        orchestrator
            .request_play(GUILD, UserId::new(3), &watch_url("ccc"))
            .await
            .unwrap();

        orchestrator.advance(GUILD, &room(2)).await.unwrap();

        // la entrada muerta se salta, no se reinserta, y suena la siguiente
        let plays = backend.plays.lock();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[1].1, "ccc");
        drop(plays);
        assert_eq!(orchestrator.queue_len(GUILD), 0);
    }

    #[tokio::test]
    async fn test_advance_with_bot_alone_stops_with_cleanup() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&["aaa", "bbb"]));
        connected(&orchestrator).await;
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("bbb"))
            .await
            .unwrap();

        orchestrator.advance(GUILD, &room(0)).await.unwrap();

        assert_eq!(backend.stops.lock().as_slice(), &[(GUILD, true)]);
        assert_eq!(orchestrator.queue_len(GUILD), 0);
        assert!(!orchestrator.is_playing(GUILD).await);
    }

    #[tokio::test]
    async fn test_listeners_changed_stops_but_keeps_binding() {
        let (orchestrator, backend, notifier) = setup(TableExtractor::with(&["aaa"]));
        connected(&orchestrator).await;
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();

        // sala con gente: no pasa nada
        orchestrator.on_listeners_changed(GUILD, &room(2)).await.unwrap();
        assert!(orchestrator.is_playing(GUILD).await);

        // el bot quedó solo: aviso + stop con limpieza, vínculo intacto
        orchestrator.on_listeners_changed(GUILD, &room(0)).await.unwrap();
        assert!(!orchestrator.is_playing(GUILD).await);
        assert_eq!(backend.stops.lock().as_slice(), &[(GUILD, true)]);
        assert_eq!(notifier.sent.lock().len(), 1);
        assert_eq!(orchestrator.bound_channel(GUILD), Some(TEXT));
    }

    #[tokio::test]
    async fn test_connect_rejects_conflicting_binding() {
        let (orchestrator, _, _) = setup(TableExtractor::with(&[]));
        connected(&orchestrator).await;

        let err = orchestrator
            .connect(GUILD, Some(VOICE), Some(ChannelId::new(99)), true)
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::AlreadyBound));

        // re-vincular al mismo canal es idempotente
        connected(&orchestrator).await;
    }

    #[tokio::test]
    async fn test_connect_missing_inputs() {
        let (orchestrator, _, _) = setup(TableExtractor::with(&[]));
        let err = orchestrator.connect(GUILD, None, Some(TEXT), true).await.unwrap_err();
        assert!(matches!(err, MusicError::NotAChannel));
    }

    #[tokio::test]
    async fn test_connect_join_failure_rolls_back_fresh_binding() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&[]));
        backend.fail_join.store(true, Ordering::SeqCst);

        let err = orchestrator
            .connect(GUILD, Some(VOICE), Some(TEXT), true)
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::ConnectError(_)));
        assert_eq!(orchestrator.bound_channel(GUILD), None);
    }

    #[tokio::test]
    async fn test_connect_join_failure_preserves_existing_binding() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&[]));
        connected(&orchestrator).await;

        backend.fail_join.store(true, Ordering::SeqCst);
        let err = orchestrator
            .connect(GUILD, Some(VOICE), Some(TEXT), true)
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::ConnectError(_)));
        assert_eq!(orchestrator.bound_channel(GUILD), Some(TEXT));
    }

    #[tokio::test]
    async fn test_connect_without_perms_rolls_back_binding() {
        let (orchestrator, _, _) = setup(TableExtractor::with(&[]));
        let err = orchestrator
            .connect(GUILD, Some(VOICE), Some(TEXT), false)
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::NoPermission));
        assert_eq!(orchestrator.bound_channel(GUILD), None);
    }

    #[tokio::test]
    async fn test_skip_routes_through_vote_ledger() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&["aaa"]));
        connected(&orchestrator).await;
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();

        let listeners = room(5); // 5 elegibles sin el bot

        let first = orchestrator
            .skip(GUILD, UserId::new(1), &listeners, false)
            .await
            .unwrap();
        assert_eq!(first, SkipOutcome::VotePending { have: 1, needed: 3 });

        // voto duplicado
        let dup = orchestrator
            .skip(GUILD, UserId::new(1), &listeners, false)
            .await
            .unwrap_err();
        assert!(matches!(dup, MusicError::AlreadyVoted));

        let second = orchestrator
            .skip(GUILD, UserId::new(2), &listeners, false)
            .await
            .unwrap();
        assert_eq!(second, SkipOutcome::VotePending { have: 2, needed: 3 });
        assert!(backend.skips.lock().is_empty());

        let third = orchestrator
            .skip(GUILD, UserId::new(3), &listeners, false)
            .await
            .unwrap();
        assert_eq!(third, SkipOutcome::Skipped);
        assert_eq!(backend.skips.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_bypasses_vote_in_small_room_or_forced() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&["aaa"]));
        connected(&orchestrator).await;
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();

        // dos presentes en total: directo
        let small = orchestrator
            .skip(GUILD, UserId::new(1), &room(1), false)
            .await
            .unwrap();
        assert_eq!(small, SkipOutcome::Skipped);

        // forzado con sala llena: directo
        let forced = orchestrator
            .skip(GUILD, UserId::new(2), &room(5), true)
            .await
            .unwrap();
        assert_eq!(forced, SkipOutcome::Skipped);
        assert_eq!(backend.skips.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_set_volume_applies_to_next_play() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&["aaa"]));
        connected(&orchestrator).await;

        orchestrator.set_volume(GUILD, 25).await;
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();

        // 25% → 0.5 con la escala percent*2/100
        let plays = backend.plays.lock();
        assert!((plays[0].2 - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_request_play_normalizes_and_validates_input() {
        let (orchestrator, _, _) = setup(TableExtractor::with(&["aaa"]));
        connected(&orchestrator).await;

        // envoltura <...> de Discord
        let wrapped = format!("<{}>", watch_url("aaa"));
        let outcome = orchestrator
            .request_play(GUILD, UserId::new(1), &wrapped)
            .await
            .unwrap();
        assert!(matches!(outcome, PlayOutcome::Started(_)));

        let err = orchestrator
            .request_play(GUILD, UserId::new(1), "esto no es una url")
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_backend_play_failure_leaves_state_clean() {
        let (orchestrator, backend, _) = setup(TableExtractor::with(&["aaa"]));
        connected(&orchestrator).await;
        backend.fail_play.store(true, Ordering::SeqCst);

        let err = orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::Internal(_)));
        assert!(!orchestrator.is_playing(GUILD).await);
        assert_eq!(orchestrator.queue_len(GUILD), 0);
    }

    #[tokio::test]
    async fn test_transport_closed_drops_all_state() {
        let (orchestrator, _, _) = setup(TableExtractor::with(&["aaa", "bbb"]));
        connected(&orchestrator).await;
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("aaa"))
            .await
            .unwrap();
        orchestrator
            .request_play(GUILD, UserId::new(1), &watch_url("bbb"))
            .await
            .unwrap();

        orchestrator.on_transport_closed(GUILD).await;

        assert!(!orchestrator.is_playing(GUILD).await);
        assert_eq!(orchestrator.queue_len(GUILD), 0);
        assert_eq!(orchestrator.bound_channel(GUILD), None);
        assert!(orchestrator.now_playing(GUILD).is_none());
    }

    #[test]
    fn test_normalize_input_rejects_non_http_schemes() {
        assert!(normalize_input("ftp://archivo").is_err());
        assert!(normalize_input("").is_err());
        assert!(normalize_input("< >").is_err());
        assert!(normalize_input("<https://youtu.be/abc>").is_ok());
    }
}
