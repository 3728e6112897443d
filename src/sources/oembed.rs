use reqwest::StatusCode;
use tracing::debug;

use crate::error::MusicError;

/// Valida que un video exista consultando el endpoint oembed de YouTube.
///
/// Filtro barato previo a la extracción completa: un 404/302 significa que
/// el id no apunta a un video reproducible.
pub async fn validate(client: &reqwest::Client, video_id: &str) -> Result<(), MusicError> {
    let url = format!(
        "https://www.youtube.com/oembed?url=https://www.youtube.com/watch?v={video_id}&format=json"
    );

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| MusicError::UpstreamFailure(format!("oembed: {e}")))?;

    match response.status() {
        StatusCode::NOT_FOUND | StatusCode::FOUND => Err(MusicError::NotFound),
        status if status.is_success() => {
            debug!("✅ oembed ok para {}", video_id);
            Ok(())
        }
        status => Err(MusicError::UpstreamFailure(format!(
            "oembed respondió {status} para {video_id}"
        ))),
    }
}
