//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use huddle_core::EntityId;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Laenge eines symmetrischen Entity-Schluessels (256 Bit)
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Laenge einer AEAD-Nonce (96 Bit)
pub const NONCE_LAENGE: usize = 12;

/// Laenge des AEAD-Auth-Tags (128 Bit)
pub const TAG_LAENGE: usize = 16;

/// Eine kryptografische Nonce (Number used once)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    pub bytes: [u8; NONCE_LAENGE],
}

impl Nonce {
    /// Erzeugt eine frische Nonce aus dem Betriebssystem-Zufall
    pub fn zufaellig() -> Self {
        let mut bytes = [0u8; NONCE_LAENGE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Erstellt eine Nonce aus beliebigen Bytes (prueft die Laenge)
    pub fn aus_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; NONCE_LAENGE] =
            bytes.try_into().map_err(|_| CryptoError::UngueltigeNonce {
                erwartet: NONCE_LAENGE,
                erhalten: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LAENGE] {
        &self.bytes
    }
}

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(pub Vec<u8>);

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretBytes {}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Erzeugt `len` zufaellige Bytes
    pub fn zufaellig(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Algorithmus fuer Entity-Schluessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupKeyAlgorithm {
    #[default]
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl GroupKeyAlgorithm {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes256gcm",
            Self::ChaCha20Poly1305 => "chacha20poly1305",
        }
    }
}

impl std::str::FromStr for GroupKeyAlgorithm {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes256gcm" => Ok(Self::Aes256Gcm),
            "chacha20poly1305" => Ok(Self::ChaCha20Poly1305),
            other => Err(format!("Unbekannter Algorithmus: {other}")),
        }
    }
}

/// Herkunft eines Entity-Schluessels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchluesselHerkunft {
    /// Zufaellig erzeugt und ueber den Schluessel-Speicher verteilt
    Kanonisch,
    /// Deterministisch abgeleitet, weil der Speicher nicht erreichbar war
    Abgeleitet,
}

/// Version eines verschluesselten Envelopes
///
/// Unterscheidet kanonisch verteilte von abgeleiteten (degradierten)
/// Schluesseln, damit ein Reparatur-Durchlauf betroffene Nachrichten findet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EncryptionVersion {
    Kanonisch = 1,
    Abgeleitet = 2,
}

impl EncryptionVersion {
    pub fn als_u8(self) -> u8 {
        self as u8
    }
}

impl From<EncryptionVersion> for u8 {
    fn from(v: EncryptionVersion) -> Self {
        v.als_u8()
    }
}

impl TryFrom<u8> for EncryptionVersion {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::Kanonisch),
            2 => Ok(Self::Abgeleitet),
            other => Err(format!("Unbekannte Verschluesselungsversion: {other}")),
        }
    }
}

impl From<SchluesselHerkunft> for EncryptionVersion {
    fn from(h: SchluesselHerkunft) -> Self {
        match h {
            SchluesselHerkunft::Kanonisch => Self::Kanonisch,
            SchluesselHerkunft::Abgeleitet => Self::Abgeleitet,
        }
    }
}

/// Symmetrischer Schluessel fuer eine Entity (Kanal oder DM-Paar)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    /// Entity, fuer die der Schluessel gilt
    pub entity: EntityId,
    /// Version des Schluessel-Records (erhoeht bei Rotation)
    pub epoch: u64,
    /// Der eigentliche Schluessel (32 Bytes)
    pub key_bytes: SecretBytes,
    /// Algorithmus
    pub algorithm: GroupKeyAlgorithm,
    /// Kanonisch verteilt oder abgeleitet
    pub herkunft: SchluesselHerkunft,
}

impl GroupKey {
    /// Gibt `true` zurueck wenn der Schluessel nur im degradierten Modus gilt
    pub fn ist_abgeleitet(&self) -> bool {
        self.herkunft == SchluesselHerkunft::Abgeleitet
    }

    /// Version, mit der Envelopes unter diesem Schluessel markiert werden
    pub fn version(&self) -> EncryptionVersion {
        self.herkunft.into()
    }
}

/// Verschluesselter Payload (Nonce + Ciphertext inkl. Auth-Tag)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// 12 Bytes Nonce
    pub nonce: Nonce,
    /// Verschluesselter Inhalt inkl. 16 Bytes Auth-Tag (angehaengt)
    pub ciphertext: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_bytes_debug_verraet_nichts() {
        let s = SecretBytes::new(vec![0xAB; 32]);
        let debug = format!("{s:?}");
        assert!(!debug.contains("171"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn secret_bytes_zeroize_leert_inhalt() {
        let mut s = SecretBytes::zufaellig(32);
        assert_eq!(s.len(), 32);
        s.zeroize();
        assert!(s.is_empty());
    }

    #[test]
    fn nonce_laenge_wird_geprueft() {
        assert!(Nonce::aus_slice(&[0u8; 12]).is_ok());
        assert!(matches!(
            Nonce::aus_slice(&[0u8; 8]),
            Err(CryptoError::UngueltigeNonce { erwartet: 12, erhalten: 8 })
        ));
    }

    #[test]
    fn version_als_zahl_serialisiert() {
        let json = serde_json::to_string(&EncryptionVersion::Abgeleitet).unwrap();
        assert_eq!(json, "2");
        let v: EncryptionVersion = serde_json::from_str("1").unwrap();
        assert_eq!(v, EncryptionVersion::Kanonisch);
        assert!(serde_json::from_str::<EncryptionVersion>("7").is_err());
    }

    #[test]
    fn algorithmus_parsen() {
        assert_eq!(
            "chacha20poly1305".parse::<GroupKeyAlgorithm>().unwrap(),
            GroupKeyAlgorithm::ChaCha20Poly1305
        );
        assert!("rot13".parse::<GroupKeyAlgorithm>().is_err());
    }
}
