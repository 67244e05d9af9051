//! # huddle-e2ee
//!
//! Fassade des E2EE-Subsystems: Nachrichten pro Kanal bzw. Direktnachricht
//! ver- und entschluesseln, Klartext-Altbestand migrieren und nach
//! degradiertem Betrieb reparieren.
//!
//! ## Module
//! - `service` - `E2eeService` (encrypt/decrypt, Rotation, Zustellung)
//! - `migration` - Idempotente Klartext-Migration
//! - `reparatur` - Hintergrund-Task fuer Fallback-verschluesselte Nachrichten
//! - `aufbau` - Zusammenbau aus Konfiguration und Datenbank
//! - `config` - TOML-Konfiguration
//! - `error` - Fehlertypen

pub mod aufbau;
pub mod config;
pub mod error;
pub mod migration;
pub mod reparatur;
pub mod service;

#[cfg(test)]
mod tests;

pub use aufbau::{geraet_einrichten, manager_aus_config};
pub use config::E2eeConfig;
pub use error::{E2eeError, E2eeResult};
pub use migration::MigrationsBericht;
pub use reparatur::{ReparaturBericht, ReparaturTask};
pub use service::{E2eeService, PLATZHALTER};
