use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

use crate::{
    cache::TrackCache,
    config::Config,
    error::MusicError,
    sources::{ExtractError, MetadataExtractor, RawFormat},
};

/// Margen de seguridad restado al hint de expiración del CDN (segundos).
const EXPIRY_SAFETY_MARGIN: u64 = 900;

/// Track resuelto y listo para entregar al reproductor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub video_id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    /// URL canónica del video
    pub url: String,
    /// URL directa del stream de audio
    pub audio_url: String,
    /// Contenedor elegido ("webm" o "mp4")
    pub audio_format: String,
    pub itag: Option<u32>,
    /// Expiración del stream en epoch segundos; None = sin hint
    pub expires_at: Option<u64>,
    /// Duración en segundos
    pub length: u64,
}

impl Track {
    /// Un stream vencido nunca se entrega al reproductor; se re-resuelve.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => now_epoch() >= expires_at,
            None => false,
        }
    }
}

/// Resuelve URLs a tracks reproducibles, con caché direccionado por huella.
pub struct MetadataResolver {
    cache: TrackCache,
    extractor: Arc<dyn MetadataExtractor>,
    max_track_seconds: u64,
    default_ttl: Duration,
}

impl MetadataResolver {
    pub fn new(extractor: Arc<dyn MetadataExtractor>, config: &Config) -> Self {
        Self {
            cache: TrackCache::new(),
            extractor,
            max_track_seconds: config.max_track_seconds,
            default_ttl: Duration::from_secs(config.cache_ttl_seconds),
        }
    }

    pub fn cache(&self) -> &TrackCache {
        &self.cache
    }

    /// Resuelve una URL a un Track.
    ///
    /// Orden de los chequeos: el techo de duración corta antes de escribir
    /// el caché, así un video demasiado largo nunca queda cacheado.
    pub async fn resolve(&self, url: &str) -> Result<Track, MusicError> {
        let key = fingerprint(url);

        if let Some(track) = self.cache.get(&key) {
            if !track.is_expired() {
                debug!("🎯 Cache hit para {}", track.video_id);
                return Ok(track);
            }
            // stream vencido: tratar como miss y re-extraer
        }

        let raw = self.extractor.extract(url).await.map_err(|e| match e {
            ExtractError::NotFound => MusicError::NotFound,
            ExtractError::Upstream(detail) => MusicError::UpstreamFailure(detail),
        })?;

        if raw.id.is_empty() {
            return Err(MusicError::NotFound);
        }

        let length = raw.duration_seconds.unwrap_or(0);
        if length > self.max_track_seconds {
            return Err(MusicError::TooLong {
                length,
                limit: self.max_track_seconds,
            });
        }

        let (best, container) = best_audio(&raw.formats).ok_or(MusicError::NoPlayableFormat)?;
        let audio_url = best.url.clone().ok_or(MusicError::NoPlayableFormat)?;
        let expires_at = parse_expiry(&audio_url);

        let track = Track {
            video_id: raw.id.clone(),
            title: raw.title,
            thumbnail: raw.thumbnail,
            url: format!("https://www.youtube.com/watch?v={}", raw.id),
            audio_url,
            audio_format: container.to_string(),
            itag: best.itag,
            expires_at,
            length,
        };

        // Escritura best-effort: un TTL ya vencido simplemente no se cachea
        match self.cache_ttl(expires_at) {
            Some(ttl) => {
                self.cache.insert_with_ttl(key, track.clone(), Some(ttl));
            }
            None => warn!("⏳ Stream de {} ya vencido al resolver, sin cachear", track.video_id),
        }

        Ok(track)
    }

    fn cache_ttl(&self, expires_at: Option<u64>) -> Option<Duration> {
        match expires_at {
            Some(expires_at) => {
                let remaining = expires_at.saturating_sub(now_epoch());
                (remaining > 0).then(|| Duration::from_secs(remaining))
            }
            None => Some(self.default_ttl),
        }
    }
}

/// Huella estable de la URL normalizada, clave del caché.
pub fn fingerprint(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    format!("music:info:{}", hex::encode(hasher.finalize()))
}

/// Elige el mejor audio con el orden de preferencia fijo:
/// itags 249/250/251 (webm opus), luego 141/140/139 (m4a),
/// luego cualquier contenedor mp4 con audio utilizable.
fn best_audio(formats: &[RawFormat]) -> Option<(&RawFormat, &'static str)> {
    let webm: Vec<&RawFormat> = formats
        .iter()
        .filter(|f| matches!(f.itag, Some(249 | 250 | 251)))
        .collect();
    if !webm.is_empty() {
        return pick_best(webm).map(|f| (f, "webm"));
    }

    let mut mp4: Vec<&RawFormat> = formats
        .iter()
        .filter(|f| matches!(f.itag, Some(139 | 140 | 141)))
        .collect();
    if mp4.is_empty() {
        mp4 = formats
            .iter()
            .filter(|f| matches!(f.container.as_deref(), Some("mp4") | Some("m4a")))
            .collect();
    }
    pick_best(mp4).map(|f| (f, "mp4"))
}

/// Mayor bitrate de audio primero, prefiriendo formatos sin pista de video.
fn pick_best(mut formats: Vec<&RawFormat>) -> Option<&RawFormat> {
    formats.sort_by(|a, b| {
        let (a_abr, b_abr) = (a.audio_bitrate.unwrap_or(0.0), b.audio_bitrate.unwrap_or(0.0));
        b_abr.partial_cmp(&a_abr).unwrap_or(std::cmp::Ordering::Equal)
    });

    formats
        .iter()
        .find(|f| f.audio_bitrate.unwrap_or(0.0) > 0.0 && f.video_bitrate.is_none())
        .copied()
        .or_else(|| {
            formats
                .iter()
                .find(|f| f.audio_bitrate.unwrap_or(0.0) > 0.0)
                .copied()
        })
}

/// Extrae el hint `expire=<epoch>` embebido en la URL del CDN.
fn parse_expiry(audio_url: &str) -> Option<u64> {
    let re = Regex::new(r"[?&]expire=(\d+)").ok()?;
    let hint: u64 = re.captures(audio_url)?.get(1)?.as_str().parse().ok()?;
    Some(hint.saturating_sub(EXPIRY_SAFETY_MARGIN))
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockMetadataExtractor, RawMedia};
    use pretty_assertions::assert_eq;

    fn format(itag: u32, container: &str, abr: f64, url: &str) -> RawFormat {
        RawFormat {
            itag: Some(itag),
            container: Some(container.to_string()),
            audio_bitrate: Some(abr),
            video_bitrate: None,
            url: Some(url.to_string()),
        }
    }

    fn sample_media(duration: u64) -> RawMedia {
        RawMedia {
            id: "dQw4w9WgXcQ".to_string(),
            title: "Cancion de prueba".to_string(),
            thumbnail: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/default.jpg".to_string()),
            duration_seconds: Some(duration),
            formats: vec![
                format(140, "m4a", 128.0, "https://cdn/140"),
                format(251, "webm", 160.0, "https://cdn/251"),
                format(250, "webm", 70.0, "https://cdn/250"),
            ],
        }
    }

    fn resolver_with(mock: MockMetadataExtractor) -> MetadataResolver {
        MetadataResolver::new(Arc::new(mock), &Config::default())
    }

    #[tokio::test]
    async fn test_resolve_twice_hits_upstream_once() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract()
            .times(1)
            .returning(|_| Ok(sample_media(180)));
        let resolver = resolver_with(mock);

        let first = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        let second = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(first.video_id, second.video_id);
    }

    #[tokio::test]
    async fn test_too_long_rejected_and_never_cached() {
        let mut mock = MockMetadataExtractor::new();
        // dos llamadas esperadas: el fallo no debe quedar cacheado
        mock.expect_extract()
            .times(2)
            .returning(|_| Ok(sample_media(5401)));
        let resolver = resolver_with(mock);

        for _ in 0..2 {
            let err = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap_err();
            assert!(matches!(err, MusicError::TooLong { length: 5401, limit: 5400 }));
        }
        assert_eq!(resolver.cache().len(), 0);
    }

    #[tokio::test]
    async fn test_ceiling_boundary_is_inclusive() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract()
            .times(1)
            .returning(|_| Ok(sample_media(5400)));
        let resolver = resolver_with(mock);

        assert!(resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.is_ok());
    }

    #[tokio::test]
    async fn test_prefers_webm_opus_itags() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract()
            .times(1)
            .returning(|_| Ok(sample_media(180)));
        let resolver = resolver_with(mock);

        let track = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(track.audio_format, "webm");
        assert_eq!(track.itag, Some(251)); // mayor bitrate del set preferido
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary_itags() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract().times(1).returning(|_| {
            let mut media = sample_media(180);
            media.formats = vec![format(140, "m4a", 128.0, "https://cdn/140")];
            Ok(media)
        });
        let resolver = resolver_with(mock);

        let track = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(track.audio_format, "mp4");
        assert_eq!(track.itag, Some(140));
    }

    #[tokio::test]
    async fn test_falls_back_to_muxed_mp4() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract().times(1).returning(|_| {
            let mut media = sample_media(180);
            media.formats = vec![RawFormat {
                itag: Some(18),
                container: Some("mp4".to_string()),
                audio_bitrate: Some(96.0),
                video_bitrate: Some(500.0),
                url: Some("https://cdn/18".to_string()),
            }];
            Ok(media)
        });
        let resolver = resolver_with(mock);

        let track = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(track.audio_format, "mp4");
        assert_eq!(track.itag, Some(18));
    }

    #[tokio::test]
    async fn test_selected_format_without_url_is_unplayable() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract().times(1).returning(|_| {
            let mut media = sample_media(180);
            media.formats = vec![RawFormat {
                itag: Some(251),
                container: Some("webm".to_string()),
                audio_bitrate: Some(160.0),
                video_bitrate: None,
                url: None,
            }];
            Ok(media)
        });
        let resolver = resolver_with(mock);

        let err = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap_err();
        assert!(matches!(err, MusicError::NoPlayableFormat));
    }

    #[tokio::test]
    async fn test_extract_not_found_maps_to_domain_error() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract()
            .times(1)
            .returning(|_| Err(ExtractError::NotFound));
        let resolver = resolver_with(mock);

        let err = resolver.resolve("https://youtu.be/xxxxxxxxxxx").await.unwrap_err();
        assert!(matches!(err, MusicError::NotFound));
    }

    #[tokio::test]
    async fn test_expiry_hint_derives_expires_at() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract().times(1).returning(|_| {
            let mut media = sample_media(180);
            media.formats =
                vec![format(251, "webm", 160.0, "https://cdn/audio?expire=9999999999&x=1")];
            Ok(media)
        });
        let resolver = resolver_with(mock);

        let track = resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(track.expires_at, Some(9_999_999_999 - EXPIRY_SAFETY_MARGIN));
        assert!(!track.is_expired());
    }

    #[test]
    fn test_parse_expiry_absent() {
        assert_eq!(parse_expiry("https://cdn/audio?x=1"), None);
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = fingerprint("https://youtu.be/abc");
        let b = fingerprint("https://youtu.be/abc");
        let c = fingerprint("https://youtu.be/def");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("music:info:"));
    }
}
