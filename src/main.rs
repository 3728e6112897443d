use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod resolver;
mod sources;
mod ui;

use crate::{
    audio::{backend::SongbirdBackend, orchestrator::Orchestrator},
    bot::{notify::SerenityNotifier, ResonaBot},
    config::Config,
    resolver::MetadataResolver,
    sources::YtDlpExtractor,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resona=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando resona v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    // El extractor tiene que estar disponible antes de arrancar
    let extractor = Arc::new(YtDlpExtractor::new(config.ytdlp_path.clone()));
    if let Err(e) = extractor.verify_available().await {
        anyhow::bail!("yt-dlp no disponible: {e}");
    }

    let resolver = Arc::new(MetadataResolver::new(extractor, &config));

    // Transporte de voz compartido entre el cliente y el backend
    let manager = Songbird::serenity();
    let (finished_tx, finished_rx) = mpsc::unbounded_channel();
    let backend = Arc::new(SongbirdBackend::new(manager.clone(), finished_tx));

    let http = Arc::new(serenity::http::Http::new(&config.discord_token));
    let notifier = Arc::new(SerenityNotifier::new(http));

    let orchestrator = Arc::new(Orchestrator::new(
        resolver.clone(),
        backend,
        notifier.clone(),
        &config,
    ));

    // Intents mínimos: guilds, estados de voz y mensajes (detección de links)
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = ResonaBot::new(config.clone(), orchestrator, resolver, notifier, finished_rx);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
