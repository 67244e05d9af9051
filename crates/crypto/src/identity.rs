//! Geraete-Identitaetsschluessel (X25519)
//!
//! Jedes Geraet eines Benutzers erhaelt beim ersten Start ein eigenes
//! X25519-Schluessel-Paar. Der oeffentliche Schluessel wird im
//! Geraete-Verzeichnis veroeffentlicht, der private Schluessel verbleibt
//! auf dem Geraet (lokaler Speicher hinter `IdentitaetsSpeicher`).

use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use huddle_core::UserId;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};

use crate::error::{CryptoError, CryptoResult};

/// Identitaets-Schluesselpaar eines Geraets
#[derive(Clone)]
pub struct IdentityKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl IdentityKeyPair {
    /// Generiert ein neues Schluessel-Paar aus dem Betriebssystem-Zufall
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Erstellt ein Schluessel-Paar aus einem privaten Schluessel (32 Bytes)
    pub fn from_private_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Gibt den privaten Schluessel als Bytes zurueck (nur fuer lokale Persistenz)
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Oeffentlicher Schluessel als Base64 (fuer das Geraete-Verzeichnis)
    pub fn export_public(&self) -> String {
        export_public_key(&self.public_key_bytes())
    }

    /// Privater Schluessel als Base64
    pub fn export_private(&self) -> String {
        STANDARD.encode(self.private_key_bytes())
    }

    /// Importiert ein Schluessel-Paar aus dem exportierten privaten Schluessel
    pub fn import_private(encoded: &str) -> CryptoResult<Self> {
        Ok(Self::from_private_bytes(decode_32(encoded)?))
    }

    /// DH mit einem fremden oeffentlichen Schluessel
    pub(crate) fn diffie_hellman(&self, other_public: &[u8; 32]) -> SharedSecret {
        self.secret
            .diffie_hellman(&X25519PublicKey::from(*other_public))
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityKeyPair {{ public: {} }}", self.export_public())
    }
}

/// Serialisiert einen oeffentlichen Schluessel (32 Bytes -> Base64)
pub fn export_public_key(bytes: &[u8; 32]) -> String {
    STANDARD.encode(bytes)
}

/// Importiert einen oeffentlichen Schluessel aus Base64
pub fn import_public_key(encoded: &str) -> CryptoResult<[u8; 32]> {
    decode_32(encoded)
}

fn decode_32(encoded: &str) -> CryptoResult<[u8; 32]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::SchluesselFormat(format!("Base64: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::SchluesselFormat(format!(
            "erwartet 32 Bytes, erhalten {}",
            bytes.len()
        ))
    })
}

// ---------------------------------------------------------------------------
// Lokaler Speicher
// ---------------------------------------------------------------------------

/// Lokaler, geraete-gebundener Speicher fuer Identitaets-Schluessel
#[async_trait]
pub trait IdentitaetsSpeicher: Send + Sync {
    /// Speichert das Schluessel-Paar des Benutzers auf diesem Geraet
    async fn persist_local(&self, user: UserId, keypair: &IdentityKeyPair) -> CryptoResult<()>;

    /// Laedt das Schluessel-Paar; `KeinSchluessel` bedeutet "neues Geraet"
    async fn load_local(&self, user: UserId) -> CryptoResult<IdentityKeyPair>;
}

/// Laedt die Identitaet oder erzeugt (und speichert) eine neue
///
/// Gibt zusaetzlich `true` zurueck wenn ein neues Schluessel-Paar erzeugt wurde.
pub async fn load_or_generate(
    speicher: &dyn IdentitaetsSpeicher,
    user: UserId,
) -> CryptoResult<(IdentityKeyPair, bool)> {
    match speicher.load_local(user).await {
        Ok(keypair) => Ok((keypair, false)),
        Err(CryptoError::KeinSchluessel(_)) => {
            let keypair = IdentityKeyPair::generate();
            speicher.persist_local(user, &keypair).await?;
            tracing::info!(user = %user, "Neue Geraete-Identitaet erzeugt");
            Ok((keypair, true))
        }
        Err(e) => Err(e),
    }
}

/// In-Memory-Speicher (Tests, kurzlebige Clients)
#[derive(Debug, Default)]
pub struct SpeicherIdentitaeten {
    eintraege: DashMap<UserId, String>,
}

impl SpeicherIdentitaeten {
    pub fn neu() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentitaetsSpeicher for SpeicherIdentitaeten {
    async fn persist_local(&self, user: UserId, keypair: &IdentityKeyPair) -> CryptoResult<()> {
        self.eintraege.insert(user, keypair.export_private());
        Ok(())
    }

    async fn load_local(&self, user: UserId) -> CryptoResult<IdentityKeyPair> {
        let encoded = self
            .eintraege
            .get(&user)
            .map(|e| e.value().clone())
            .ok_or_else(|| CryptoError::KeinSchluessel(user.to_string()))?;
        IdentityKeyPair::import_private(&encoded)
    }
}

/// Dateiformat einer gespeicherten Identitaet
#[derive(Debug, Serialize, Deserialize)]
struct GespeicherteIdentitaet {
    user_id: UserId,
    public_key: String,
    private_key: String,
}

/// Datei-basierter Speicher
///
/// Legt pro Benutzer `base_dir/<uuid>.json` ab.
#[derive(Debug, Clone)]
pub struct DateiIdentitaeten {
    base_dir: PathBuf,
}

impl DateiIdentitaeten {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn pfad(&self, user: UserId) -> PathBuf {
        self.base_dir.join(format!("{}.json", user.inner()))
    }
}

#[async_trait]
impl IdentitaetsSpeicher for DateiIdentitaeten {
    async fn persist_local(&self, user: UserId, keypair: &IdentityKeyPair) -> CryptoResult<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let inhalt = serde_json::to_vec_pretty(&GespeicherteIdentitaet {
            user_id: user,
            public_key: keypair.export_public(),
            private_key: keypair.export_private(),
        })?;

        // Erst in eine Temp-Datei schreiben, dann atomar umbenennen
        let ziel = self.pfad(user);
        let temp = ziel.with_extension("json.tmp");
        tokio::fs::write(&temp, &inhalt).await?;
        tokio::fs::rename(&temp, &ziel).await?;

        tracing::debug!(pfad = %ziel.display(), "Identitaet gespeichert");
        Ok(())
    }

    async fn load_local(&self, user: UserId) -> CryptoResult<IdentityKeyPair> {
        let pfad = self.pfad(user);
        let inhalt = match tokio::fs::read(&pfad).await {
            Ok(inhalt) => inhalt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CryptoError::KeinSchluessel(user.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let gespeichert: GespeicherteIdentitaet = serde_json::from_slice(&inhalt)
            .map_err(|e| CryptoError::SchluesselFormat(format!("{}: {e}", pfad.display())))?;
        let keypair = IdentityKeyPair::import_private(&gespeichert.private_key)?;

        if keypair.export_public() != gespeichert.public_key {
            return Err(CryptoError::SchluesselFormat(format!(
                "{}: oeffentlicher Schluessel passt nicht zum privaten",
                pfad.display()
            )));
        }

        Ok(keypair)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
