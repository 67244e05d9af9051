//! Fehlertypen fuer das Datenbank-Crate

use huddle_crypto::CryptoError;
use thiserror::Error;

/// Datenbank-Fehlertypen
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Datensatz nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("SQLx-Fehler: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration-Fehler: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Interner DB-Fehler: {0}")]
    Intern(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::UngueltigeDaten(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Datenbankfehler erreichen das Krypto-Subsystem als Speicherfehler,
/// damit der degradierte Modus greifen kann. Fehlende Datensaetze und
/// kaputte Zeilen behalten ihre Bedeutung.
impl From<DbError> for CryptoError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NichtGefunden(msg) => CryptoError::KeinSchluessel(msg),
            DbError::UngueltigeDaten(msg) => CryptoError::UngueltigeDaten(msg),
            andere => CryptoError::speicher(andere.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn umwandlung_in_crypto_error() {
        assert!(matches!(
            CryptoError::from(DbError::nicht_gefunden("device:x")),
            CryptoError::KeinSchluessel(_)
        ));
        assert!(matches!(
            CryptoError::from(DbError::Sqlx(sqlx::Error::PoolTimedOut)),
            CryptoError::Speicher(_)
        ));
        assert!(matches!(
            CryptoError::from(DbError::ungueltig("epoch")),
            CryptoError::UngueltigeDaten(_)
        ));
    }
}
