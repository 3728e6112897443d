use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{ExtractError, MetadataExtractor, RawFormat, RawMedia};

/// Extractor de metadata basado en yt-dlp (`yt-dlp -J <url>`).
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: String,
}

#[derive(Debug, Deserialize)]
struct YtDlpJson {
    id: String,
    title: String,
    thumbnail: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: Option<String>,
    ext: Option<String>,
    abr: Option<f64>,
    vbr: Option<f64>,
    url: Option<String>,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Verifica que yt-dlp esté disponible y funcional
    pub async fn verify_available(&self) -> Result<(), ExtractError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                error!("❌ {} no está instalado o no está en PATH", self.binary);
                ExtractError::Upstream(format!("{} no disponible: {e}", self.binary))
            })?;

        if !output.status.success() {
            error!("❌ Error ejecutando {}", self.binary);
            return Err(ExtractError::Upstream(format!(
                "{} no puede ejecutarse correctamente",
                self.binary
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("✅ yt-dlp versión: {}", version.trim());
        Ok(())
    }
}

#[async_trait]
impl MetadataExtractor for YtDlpExtractor {
    async fn extract(&self, url: &str) -> Result<RawMedia, ExtractError> {
        debug!("🔍 Extrayendo metadata de {}", url);

        let output = Command::new(&self.binary)
            .args(["-J", "--no-playlist", "--no-warnings", url])
            .output()
            .await
            .map_err(|e| ExtractError::Upstream(format!("no se pudo ejecutar {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Err(ExtractError::NotFound);
            }
            let first_line = stderr.lines().next().unwrap_or("sin detalle").to_string();
            return Err(ExtractError::Upstream(first_line));
        }

        let parsed: YtDlpJson = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractError::Upstream(format!("JSON inválido de yt-dlp: {e}")))?;

        Ok(RawMedia {
            id: parsed.id,
            title: parsed.title,
            thumbnail: parsed.thumbnail,
            duration_seconds: parsed.duration.map(|d| d as u64),
            formats: parsed.formats.into_iter().map(convert_format).collect(),
        })
    }
}

fn convert_format(f: YtDlpFormat) -> RawFormat {
    RawFormat {
        itag: f.format_id.as_deref().and_then(|id| id.parse().ok()),
        container: f.ext,
        audio_bitrate: f.abr,
        video_bitrate: f.vbr,
        url: f.url,
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("video unavailable")
        || lower.contains("does not exist")
        || lower.contains("http error 404")
}
