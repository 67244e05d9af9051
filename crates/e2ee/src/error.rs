//! Fehlertypen fuer das E2EE-Crate

use huddle_crypto::CryptoError;
use thiserror::Error;

/// E2EE-Fehlertypen
#[derive(Debug, Error)]
pub enum E2eeError {
    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] CryptoError),

    #[error("Datenbank-Fehler: {0}")]
    Datenbank(#[from] huddle_db::DbError),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type E2eeResult<T> = Result<T, E2eeError>;

impl E2eeError {
    /// Gibt true zurueck wenn die Nachricht nicht entschluesselt werden konnte
    /// (Aufrufer zeigt einen Platzhalter an)
    pub fn ist_entschluesselung(&self) -> bool {
        matches!(self, Self::Krypto(CryptoError::Entschluesselung(_)))
    }

    /// Gibt true zurueck wenn fuer die Entity (noch) kein Schluessel vorliegt
    pub fn ist_kein_schluessel(&self) -> bool {
        matches!(self, Self::Krypto(e) if e.ist_kein_schluessel())
    }
}
