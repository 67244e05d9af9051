//! huddle-core – Gemeinsame Typen fuer das E2EE-Subsystem
//!
//! Dieses Crate stellt die ID-Newtypes (Benutzer, Geraet, Kanal, Entity)
//! und die injizierbare Uhr bereit, die von allen anderen Huddle-Crates
//! gemeinsam genutzt werden.

pub mod types;
pub mod uhr;

// Re-Exporte fuer bequemen Zugriff
pub use types::{ChannelId, DeviceId, EntityId, EntityIdParseError, UserId};
pub use uhr::{FesteUhr, SystemUhr, Uhr};
