//! SQLite-Backend-Implementierungen fuer alle Kollaborateur-Traits

pub mod devices;
pub mod entity_keys;
pub mod mailbox;
pub mod messages;
pub mod participants;
pub mod pool;

pub use pool::SqliteDb;

use chrono::{DateTime, Utc};
use huddle_core::EntityId;
use huddle_crypto::GroupKeyAlgorithm;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Zeitstempel-Format in allen Tabellen (lexikografisch sortierbar)
pub(crate) fn zeit_text(zeit: DateTime<Utc>) -> String {
    zeit.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub(crate) fn parse_timestamp(s: String) -> DbResult<DateTime<Utc>> {
    // Versuche ISO8601 / RFC3339
    chrono::DateTime::parse_from_rfc3339(&s)
        .or_else(|_| {
            // Fallback fuer SQLite datetime()-Format ohne 'T' und 'Z'
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc().fixed_offset())
        })
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::ungueltig(format!("Ungueltige Zeitangabe '{s}': {e}")))
}

pub(crate) fn parse_uuid(s: &str, feld: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::ungueltig(format!("Ungueltige {feld} UUID '{s}': {e}")))
}

pub(crate) fn parse_entity(s: &str) -> DbResult<EntityId> {
    s.parse().map_err(|e: huddle_core::EntityIdParseError| DbError::ungueltig(e.to_string()))
}

pub(crate) fn parse_algorithm(s: &str) -> DbResult<GroupKeyAlgorithm> {
    s.parse().map_err(DbError::ungueltig)
}

pub(crate) fn epoch_lesen(wert: i64) -> DbResult<u64> {
    u64::try_from(wert).map_err(|_| DbError::ungueltig(format!("Negative Epoch {wert}")))
}

pub(crate) fn epoch_schreiben(epoch: u64) -> DbResult<i64> {
    i64::try_from(epoch).map_err(|_| DbError::ungueltig(format!("Epoch {epoch} zu gross")))
}
