//! Datenbank-Konfiguration

use serde::{Deserialize, Serialize};

/// Verbindungsparameter fuer die SQLite-Datenbank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://huddle.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus aktiviert werden soll
    pub sqlite_wal: bool,
    /// Wartezeit bei gesperrter Datenbank, bevor ein Schreibzugriff scheitert
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://huddle.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
            busy_timeout_ms: 5_000,
        }
    }
}
