use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::collections::HashSet;
use tracing::debug;

/// Resultado de registrar un voto de salto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Quórum alcanzado; el registro quedó limpio y el salto procede
    Passed,
    /// Voto registrado, faltan más
    Pending { have: usize, needed: usize },
    /// El votante ya había votado para esta canción
    AlreadyVoted,
}

/// Registro de votantes por guild para la canción actual.
///
/// Se limpia al alcanzar quórum, al arrancar una canción nueva o en un
/// salto forzado. Un votante cuenta una sola vez por canción.
#[derive(Debug, Default)]
pub struct SkipVotes {
    votes: DashMap<GuildId, HashSet<UserId>>,
}

impl SkipVotes {
    pub fn new() -> Self {
        Self {
            votes: DashMap::new(),
        }
    }

    /// Registra un voto y evalúa el quórum.
    ///
    /// `eligible` = oyentes con derecho a voto (sin el bot, sin sordos).
    /// El quórum exige más de la mitad de los *demás* oyentes: el que pide
    /// el salto queda fuera del denominador.
    pub fn cast(&self, guild_id: GuildId, voter: UserId, eligible: usize) -> VoteOutcome {
        let mut votes = self.votes.entry(guild_id).or_default();

        if votes.contains(&voter) {
            return VoteOutcome::AlreadyVoted;
        }
        votes.insert(voter);

        let others = eligible.saturating_sub(1).max(1);
        let have = votes.len();
        if have as f64 / others as f64 > 0.5 {
            drop(votes);
            self.votes.remove(&guild_id);
            debug!("🗳️ Quórum de salto alcanzado en guild {}", guild_id);
            VoteOutcome::Passed
        } else {
            VoteOutcome::Pending {
                have,
                needed: others / 2 + 1,
            }
        }
    }

    /// Nueva canción o salto forzado: época nueva de votos.
    pub fn clear(&self, guild_id: GuildId) {
        self.votes.remove(&guild_id);
    }
}
