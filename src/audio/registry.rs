use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use tracing::debug;

use crate::error::MusicError;

/// Vínculo guild → canal de texto para mensajes de estado.
///
/// Una guild admite exactamente un canal vinculado; la desvinculación es
/// siempre explícita (la pérdida de transporte no desvincula por sí sola,
/// eso lo decide el orquestador).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    bindings: DashMap<GuildId, ChannelId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// Vincula la guild al canal. Idempotente para el mismo canal;
    /// `AlreadyBound` si ya hay otro canal vinculado.
    pub fn bind(&self, guild_id: GuildId, text_channel: ChannelId) -> Result<(), MusicError> {
        match self.bindings.get(&guild_id) {
            Some(bound) if *bound != text_channel => Err(MusicError::AlreadyBound),
            Some(_) => Ok(()),
            None => {
                self.bindings.insert(guild_id, text_channel);
                debug!("🔗 Guild {} vinculada al canal {}", guild_id, text_channel);
                Ok(())
            }
        }
    }

    pub fn unbind(&self, guild_id: GuildId) {
        if self.bindings.remove(&guild_id).is_some() {
            debug!("🔗 Guild {} desvinculada", guild_id);
        }
    }

    pub fn bound_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.bindings.get(&guild_id).map(|c| *c)
    }
}
