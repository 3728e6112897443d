//! # Cache Module
//!
//! Metadata caching for resona.
//!
//! Resolved tracks are cached under a content-addressed key (a sha256
//! fingerprint of the normalized URL) so that repeated requests for the
//! same video hit the cache instead of spawning another extraction.
//!
//! ## TTL semantics
//!
//! Every entry carries its own TTL. When the resolved audio URL embeds an
//! expiry hint, the TTL is derived from it (minus a safety margin) so the
//! cache never serves a stream URL the upstream CDN already invalidated.
//! Entries without a hint fall back to `CACHE_TTL` (6 hours by default).
//!
//! ## Configuration
//!
//! ```env
//! CACHE_TTL=21600             # Default time-to-live in seconds
//! ```
//!
//! Expired entries are dropped on read; a background task calls
//! [`TrackCache::cleanup_old_entries`] hourly to sweep the rest.

pub mod ttl_cache;

use tracing::info;
use ttl_cache::TtlCache;

use crate::resolver::Track;

/// Caché proceso-global de metadata resuelta, clave = huella de la URL.
pub type TrackCache = TtlCache<String, Track>;

impl TrackCache {
    /// Barrido periódico de entradas vencidas (tarea de mantenimiento).
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }
}
