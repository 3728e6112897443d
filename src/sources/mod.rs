pub mod oembed;
pub mod ytdlp;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use ytdlp::YtDlpExtractor;

/// Fallo de la capa de extracción upstream.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("video no encontrado")]
    NotFound,
    #[error("el extractor falló: {0}")]
    Upstream(String),
}

/// Formato crudo reportado por el extractor, antes de elegir el mejor audio.
#[derive(Debug, Clone, Default)]
pub struct RawFormat {
    pub itag: Option<u32>,
    pub container: Option<String>,
    /// Bitrate de audio en kbps; None o 0 = sin pista de audio utilizable
    pub audio_bitrate: Option<f64>,
    /// Bitrate de video; presente solo en formatos muxeados
    pub video_bitrate: Option<f64>,
    pub url: Option<String>,
}

/// Metadata cruda de un video, tal como la entrega el extractor.
#[derive(Debug, Clone)]
pub struct RawMedia {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration_seconds: Option<u64>,
    pub formats: Vec<RawFormat>,
}

/// Capacidad de extracción de metadata: URL → metadata cruda.
///
/// El resolver consume esto como caja negra; en tests se mockea.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<RawMedia, ExtractError>;
}
