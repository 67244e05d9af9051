//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Kein Schluessel vorhanden – loest Erstellung bzw. Austausch aus
    #[error("Kein Schluessel fuer {0}")]
    KeinSchluessel(String),

    /// Schluessel konnte nicht importiert werden (dauerhaft)
    #[error("Ungueltiges Schluesselformat: {0}")]
    SchluesselFormat(String),

    /// Eingewickelter Schluessel passt nicht zum privaten Schluessel (dauerhaft)
    #[error("Schluessel konnte nicht ausgepackt werden: {0}")]
    Unwrap(String),

    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    SchluesselGenerierung(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    /// Tag-Mismatch, falscher Schluessel oder korrupte Daten
    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    #[error("Ungueltige Nonce-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeNonce { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    /// Der Schluessel-Speicher (Kollaborateur) ist nicht erreichbar oder lieferte einen Fehler
    #[error("Speicherfehler: {0}")]
    Speicher(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CryptoError {
    pub fn speicher(msg: impl Into<String>) -> Self {
        Self::Speicher(msg.into())
    }

    /// Gibt true zurueck wenn ein erneuter Versuch das Ergebnis nicht aendern kann
    pub fn ist_dauerhaft(&self) -> bool {
        matches!(
            self,
            Self::SchluesselFormat(_)
                | Self::Unwrap(_)
                | Self::UngueltigeSchluesselLaenge { .. }
                | Self::Base64(_)
        )
    }

    /// Gibt true zurueck wenn der Schluessel erst erstellt/ausgetauscht werden muss
    pub fn ist_kein_schluessel(&self) -> bool {
        matches!(self, Self::KeinSchluessel(_))
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
