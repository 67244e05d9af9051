//! Ciphertext-Envelope
//!
//! Das, was der Nachrichten-Speicher pro Nachricht ablegt. Noch nicht
//! migrierte Alt-Nachrichten sind explizit als `Klartext` markiert, statt
//! ueber einen Sentinel-String erkannt zu werden.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{EncryptedPayload, EncryptionVersion, Nonce};

/// Gespeicherter Nachrichteninhalt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum Envelope {
    /// AEAD-verschluesselt; `content` und `nonce` sind Base64
    Verschluesselt {
        content: String,
        nonce: String,
        version: EncryptionVersion,
    },
    /// Unverschluesselter Altbestand (vor der Migration)
    Klartext { content: String },
}

impl Envelope {
    /// Baut ein Envelope aus einem verschluesselten Payload
    pub fn aus_payload(payload: &EncryptedPayload, version: EncryptionVersion) -> Self {
        Self::Verschluesselt {
            content: STANDARD.encode(&payload.ciphertext),
            nonce: STANDARD.encode(payload.nonce.as_bytes()),
            version,
        }
    }

    pub fn klartext(content: impl Into<String>) -> Self {
        Self::Klartext {
            content: content.into(),
        }
    }

    pub fn ist_verschluesselt(&self) -> bool {
        matches!(self, Self::Verschluesselt { .. })
    }

    /// Version bei verschluesselten Envelopes, `None` bei Klartext
    pub fn version(&self) -> Option<EncryptionVersion> {
        match self {
            Self::Verschluesselt { version, .. } => Some(*version),
            Self::Klartext { .. } => None,
        }
    }

    /// Dekodiert Ciphertext und Nonce (nur bei verschluesselten Envelopes)
    ///
    /// Ein beschaedigtes Envelope ist nicht entschluesselbar und liefert
    /// daher `Entschluesselung`.
    pub fn payload(&self) -> CryptoResult<Option<EncryptedPayload>> {
        match self {
            Self::Verschluesselt { content, nonce, .. } => {
                let ciphertext = STANDARD
                    .decode(content)
                    .map_err(|e| CryptoError::Entschluesselung(format!("Ciphertext: {e}")))?;
                let nonce_bytes = STANDARD
                    .decode(nonce)
                    .map_err(|e| CryptoError::Entschluesselung(format!("Nonce: {e}")))?;
                let nonce = Nonce::aus_slice(&nonce_bytes)
                    .map_err(|e| CryptoError::Entschluesselung(e.to_string()))?;
                Ok(Some(EncryptedPayload { nonce, ciphertext }))
            }
            Self::Klartext { .. } => Ok(None),
        }
    }
}
