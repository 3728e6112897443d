use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_track_seconds: u64,

    // Resolución de metadata
    pub cache_ttl_seconds: u64,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string()) // punto medio del rango 0.0-2.0
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_track_seconds: std::env::var("MAX_TRACK_SECONDS")
                .unwrap_or_else(|_| "5400".to_string()) // 90 minutos
                .parse()?,

            // Resolución
            cache_ttl_seconds: std::env::var("CACHE_TTL")
                .unwrap_or_else(|_| "21600".to_string()) // 6 horas
                .parse()?,
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Chequeos de sanidad sobre los valores cargados.
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_track_seconds == 0 {
            anyhow::bail!("Max track duration must be greater than 0");
        }

        if self.cache_ttl_seconds == 0 {
            anyhow::bail!("Cache TTL must be greater than 0");
        }

        Ok(())
    }

    /// Resumen seguro para el log de arranque (sin token).
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {}% vol, cola máx {}, duración máx {}s\n  \
            Resolver: TTL {}s, yt-dlp en '{}'",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.max_track_seconds,
            self.cache_ttl_seconds,
            self.ytdlp_path,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin defaults, deben proveerse)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Reproducción
            default_volume: 1.0,
            max_queue_size: 1000,
            max_track_seconds: 5400,

            // Resolución
            cache_ttl_seconds: 21600,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
