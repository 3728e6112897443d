use serenity::model::id::UserId;
use std::time::Duration;

use crate::{error::MusicError, resolver::Track};

/// Confirmación de encolado, con duración y quien la pidió.
pub fn queued(track: &Track, requested_by: UserId) -> String {
    let length = if track.length > 0 {
        format!("({}) ", format_duration(Duration::from_secs(track.length)))
    } else {
        String::new()
    };
    format!("✅  |  En cola: **{}** {}- <@{}>", track.title, length, requested_by)
}

pub fn now_playing(track: &Track) -> String {
    let length = if track.length > 0 {
        format!(" ({})", format_duration(Duration::from_secs(track.length)))
    } else {
        String::new()
    };
    format!("🎵  |  Reproduciendo: **{}**{}", track.title, length)
}

pub fn queue_finished() -> String {
    "ℹ️  |  Se terminó la cola de reproducción".to_string()
}

/// Aviso de salida cuando el bot queda solo en el canal.
pub fn left_alone() -> String {
    "🎧  |  Me quedé solo, detengo la música".to_string()
}

pub fn skipped() -> String {
    "⏭️  |  Canción saltada".to_string()
}

pub fn vote_registered(have: usize, needed: usize) -> String {
    format!("🗳️  |  Voto registrado ({have}/{needed} para saltar)")
}

pub fn volume_set(percent: u32) -> String {
    format!("🔊  |  Volumen fijado al {percent}%")
}

pub fn queue_listing(titles: &[String]) -> String {
    if titles.is_empty() {
        return "📭  |  La cola está vacía".to_string();
    }
    let mut out = format!("📜  |  {} en cola:\n", titles.len());
    for (i, title) in titles.iter().take(10).enumerate() {
        out.push_str(&format!("`{}.` {}\n", i + 1, title));
    }
    if titles.len() > 10 {
        out.push_str(&format!("… y {} más", titles.len() - 10));
    }
    out
}

/// Mensaje de error para el usuario: específico por variante de dominio,
/// opaco para fallos internos.
pub fn for_error(error: &MusicError) -> String {
    error.user_message()
}

/// Duración legible ("3m 32s"), sin los ceros a la izquierda.
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(length: u64) -> Track {
        Track {
            video_id: "abc".to_string(),
            title: "Una canción".to_string(),
            thumbnail: None,
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            audio_url: "https://cdn/abc".to_string(),
            audio_format: "webm".to_string(),
            itag: Some(251),
            expires_at: None,
            length,
        }
    }

    #[test]
    fn test_queued_includes_duration_and_mention() {
        let text = queued(&track(212), UserId::new(42));
        assert!(text.contains("Una canción"));
        assert!(text.contains("3m 32s"));
        assert!(text.contains("<@42>"));
    }

    #[test]
    fn test_queued_omits_unknown_duration() {
        let text = queued(&track(0), UserId::new(42));
        assert!(!text.contains("0s"));
    }

    #[test]
    fn test_queue_listing_truncates() {
        let titles: Vec<String> = (0..15).map(|i| format!("t{i}")).collect();
        let text = queue_listing(&titles);
        assert!(text.contains("`10.` t9"));
        assert!(text.contains("y 5 más"));
        assert!(!text.contains("t12"));
    }
}
