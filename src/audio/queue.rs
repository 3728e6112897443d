use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::MusicError;

/// Entrada pendiente de reproducción, perteneciente a una sola guild.
#[derive(Debug, Clone)]
pub struct QueuedTrack {
    /// URL canónica; se re-resuelve al desencolar porque el stream expira
    pub url: String,
    pub title: String,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(url: String, title: String, requested_by: UserId) -> Self {
        Self {
            url,
            title,
            requested_by,
            added_at: Utc::now(),
        }
    }
}

/// Colas FIFO por guild, independientes entre sí.
///
/// El orden de inserción es la única prioridad. La capacidad está acotada
/// por `MAX_QUEUE_SIZE`: encolar por encima falla con `QueueFull` en vez
/// de descartar silenciosamente.
#[derive(Debug)]
pub struct TrackQueues {
    queues: DashMap<GuildId, VecDeque<QueuedTrack>>,
    max_size: usize,
}

impl TrackQueues {
    pub fn new(max_size: usize) -> Self {
        Self {
            queues: DashMap::new(),
            max_size,
        }
    }

    pub fn enqueue(&self, guild_id: GuildId, entry: QueuedTrack) -> Result<(), MusicError> {
        let mut queue = self.queues.entry(guild_id).or_default();
        if queue.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        info!("➕ Encolada en guild {}: {}", guild_id, entry.title);
        queue.push_back(entry);
        Ok(())
    }

    pub fn dequeue_front(&self, guild_id: GuildId) -> Option<QueuedTrack> {
        let entry = self.queues.get_mut(&guild_id)?.pop_front();
        if let Some(ref item) = entry {
            debug!("➡️ Siguiente en cola de guild {}: {}", guild_id, item.title);
        }
        entry
    }

    pub fn len(&self, guild_id: GuildId) -> usize {
        self.queues.get(&guild_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn clear(&self, guild_id: GuildId) {
        if let Some(mut queue) = self.queues.get_mut(&guild_id) {
            if !queue.is_empty() {
                info!("🗑️ Cola de guild {} limpiada", guild_id);
                queue.clear();
            }
        }
    }

    /// Títulos pendientes en orden, para mostrar la cola.
    pub fn titles(&self, guild_id: GuildId) -> Vec<String> {
        self.queues
            .get(&guild_id)
            .map(|q| q.iter().map(|e| e.title.clone()).collect())
            .unwrap_or_default()
    }
}
