//! Pool fuer die E2EE-Datenbank
//!
//! Alle Compare-and-Set-Schreibzugriffe (Schluessel-Records, Envelopes,
//! Postfach-Entnahme) laufen ueber denselben Pool. Konkurrierende Schreiber
//! warten bis `busy_timeout_ms`, statt sofort mit `SQLITE_BUSY` zu scheitern;
//! erst danach landet der Fehler als Speicherfehler im Krypto-Subsystem.

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{DbError, DbResult};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Tabellen, ohne die das E2EE-Subsystem nicht arbeiten kann
const E2EE_TABELLEN: [&str; 5] = [
    "devices",
    "entity_keys",
    "wrapped_keys",
    "participants",
    "messages",
];

/// SQLite-Backend fuer alle Kollaborateur-Traits
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pub(crate) pool: SqlitePool,
}

impl SqliteDb {
    /// Oeffnet (bzw. erstellt) die Datenbank und bringt das Schema auf Stand
    pub async fn oeffnen(config: &DatabaseConfig) -> DbResult<Self> {
        let opts = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(if config.sqlite_wal {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            })
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_verbindungen)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.schema_vorbereiten().await?;

        info!(
            url = %config.url,
            wal = config.sqlite_wal,
            max_verbindungen = config.max_verbindungen,
            busy_timeout_ms = config.busy_timeout_ms,
            "E2EE-Datenbank bereit"
        );
        Ok(db)
    }

    /// In-Memory-Datenbank (Tests, kurzlebige Clients)
    ///
    /// Genau eine dauerhaft gehaltene Verbindung: jede neue Verbindung saehe
    /// eine leere Datenbank.
    pub async fn in_memory() -> DbResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.schema_vorbereiten().await?;
        Ok(db)
    }

    /// Fuehrt ausstehende Migrationen aus und prueft danach die Tabellen
    pub async fn schema_vorbereiten(&self) -> DbResult<()> {
        MIGRATOR.run(&self.pool).await?;
        debug!(migrationen = MIGRATOR.iter().count(), "E2EE-Migrationen angewendet");
        self.schema_pruefen().await
    }

    /// Prueft, dass alle E2EE-Tabellen vorhanden sind
    pub async fn schema_pruefen(&self) -> DbResult<()> {
        let vorhanden: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await?;

        let fehlend: Vec<&str> = E2EE_TABELLEN
            .iter()
            .copied()
            .filter(|t| !vorhanden.iter().any(|v| v == t))
            .collect();
        if !fehlend.is_empty() {
            return Err(DbError::intern(format!(
                "E2EE-Schema unvollstaendig, es fehlen: {}",
                fehlend.join(", ")
            )));
        }
        Ok(())
    }

    /// `true` wenn die Datenbank eine Anfrage beantwortet
    pub async fn erreichbar(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(fehler = %e, "E2EE-Datenbank nicht erreichbar");
                false
            }
        }
    }

    /// Interner Pool (fuer Tests)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schliesst den Pool; danach schlagen alle Zugriffe mit `Speicher` fehl
    pub async fn schliessen(&self) {
        self.pool.close().await;
        debug!("E2EE-Datenbank geschlossen");
    }
}
