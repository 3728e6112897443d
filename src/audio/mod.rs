//! # Audio Module
//!
//! Núcleo de coordinación de reproducción por guild.
//!
//! - [`orchestrator`]: la máquina de estados que admite peticiones,
//!   garantiza una sola reproducción activa por guild y avanza la cola.
//! - [`queue`]: colas FIFO independientes por guild.
//! - [`votes`]: registro de votos de salto con quórum ponderado.
//! - [`registry`]: vínculo guild → canal de texto.
//! - [`backend`]: la capacidad de reproducción (songbird) detrás de un trait.
//! - [`notify`]: sink de avisos fire-and-forget.

pub mod backend;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod votes;
