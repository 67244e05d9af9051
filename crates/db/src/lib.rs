//! huddle-db – SQLite-Speicher des E2EE-Subsystems
//!
//! `SqliteDb` implementiert alle Kollaborateur-Traits aus
//! `huddle_crypto::store` (Entity-Schluessel, Geraete-Verzeichnis,
//! Schluessel-Postfach, Teilnehmer, Nachrichten). Das Schema liegt unter
//! `migrations/` und wird beim Oeffnen angewendet.

pub mod config;
pub mod error;
pub mod sqlite;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use sqlite::SqliteDb;
