use thiserror::Error;

/// Error de dominio del scheduler de reproducción.
///
/// Taxonomía cerrada: todo camino disparado por un usuario termina en una
/// de estas variantes. `Internal` es el cajón para fallos inesperados que
/// no son de dominio; se loggea el contexto completo y el usuario recibe
/// un mensaje genérico.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("entrada inválida: {0}")]
    InvalidInput(String),

    #[error("canal de voz o de texto inexistente")]
    NotAChannel,

    #[error("ya existe un canal de texto vinculado para esta guild")]
    AlreadyBound,

    #[error("faltan permisos de conexión o de voz")]
    NoPermission,

    #[error("no se pudo conectar al canal de voz: {0}")]
    ConnectError(String),

    #[error("no se encontró el video")]
    NotFound,

    #[error("la extracción de metadata falló: {0}")]
    UpstreamFailure(String),

    #[error("la canción dura {length}s y el máximo es {limit}s")]
    TooLong { length: u64, limit: u64 },

    #[error("voto duplicado para la canción actual")]
    AlreadyVoted,

    #[error("la cola está llena (máximo {0})")]
    QueueFull(usize),

    #[error("no hay canal de texto vinculado")]
    NotInChannel,

    #[error("ningún formato de audio utilizable")]
    NoPlayableFormat,

    #[error("error interno: {0}")]
    Internal(String),
}

impl MusicError {
    /// Mensaje para el usuario, uno por variante de dominio.
    ///
    /// Los errores internos reciben un texto opaco; el detalle va al log,
    /// no al chat.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(_) => "❌ Eso no parece una URL válida".to_string(),
            Self::NotAChannel => "❌ Necesitas estar en un canal de voz".to_string(),
            Self::AlreadyBound => {
                "❌ Ya estoy vinculado a otro canal de texto en este servidor".to_string()
            }
            Self::NoPermission => {
                "❌ No tengo permisos para conectarme o hablar en ese canal".to_string()
            }
            Self::ConnectError(_) => "❌ No pude conectarme al canal de voz".to_string(),
            Self::NotFound => "❌ No encontré ese video".to_string(),
            Self::UpstreamFailure(_) => {
                "❌ No pude obtener la información del video, intenta de nuevo".to_string()
            }
            Self::TooLong { limit, .. } => {
                format!("⏱️ La canción supera el máximo permitido ({} minutos)", limit / 60)
            }
            Self::AlreadyVoted => "🗳️ Ya votaste para saltar esta canción".to_string(),
            Self::QueueFull(max) => format!("📦 La cola está llena (máximo {max} canciones)"),
            Self::NotInChannel => {
                "❌ No hay canal de texto vinculado, usa /join primero".to_string()
            }
            Self::NoPlayableFormat => {
                "❌ Ese video no tiene ningún formato de audio utilizable".to_string()
            }
            Self::Internal(_) => "⚠️ Ocurrió un error inesperado".to_string(),
        }
    }

    /// Errores de dominio vs. fallos inesperados: los segundos se loggean
    /// con contexto completo antes de responder.
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}
