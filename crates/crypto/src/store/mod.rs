//! Kollaborateur-Schnittstellen
//!
//! Das E2EE-Subsystem persistiert nichts selbst. Schluessel-Records,
//! Geraete-Verzeichnis, Zustellung eingewickelter Schluessel und der
//! Nachrichten-Speicher liegen hinter diesen Traits. `huddle-db` liefert die
//! SQLite-Implementierung, `memory` eine In-Memory-Variante.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_core::{DeviceId, EntityId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::CryptoResult;
use crate::types::{EncryptionVersion, GroupKeyAlgorithm};

pub use memory::{
    SpeicherNachrichten, SpeicherPostfach, SpeicherSchluesselStore, SpeicherTeilnehmer,
    SpeicherVerzeichnis,
};

// ---------------------------------------------------------------------------
// Entity-Schluessel
// ---------------------------------------------------------------------------

/// Persistierter, kanonischer Schluessel einer Entity
///
/// `wrapped_key` ist je nach `RecordSchutz` entweder unter dem Master-Key
/// eingewickelt oder (bei vertrauenswuerdigem Speicher) der rohe Schluessel,
/// jeweils Base64-kodiert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKeyRecord {
    pub entity: EntityId,
    pub wrapped_key: String,
    /// Compare-and-set-Version, steigt bei jeder Rotation um 1
    pub epoch: u64,
    pub algorithm: GroupKeyAlgorithm,
    pub created_at: DateTime<Utc>,
}

/// Ergebnis von `put_if_absent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EinfuegeErgebnis {
    Eingefuegt,
    /// Es existiert bereits ein Record; der Aufrufer muss neu lesen
    Konflikt,
}

/// Speicher fuer kanonische Entity-Schluessel
#[async_trait]
pub trait EntityKeyStore: Send + Sync {
    /// Legt den Record an, falls fuer die Entity noch keiner existiert
    async fn put_if_absent(&self, record: &EntityKeyRecord) -> CryptoResult<EinfuegeErgebnis>;

    async fn get(&self, entity: &EntityId) -> CryptoResult<Option<EntityKeyRecord>>;

    /// Ersetzt den Record nur, wenn die gespeicherte Epoch `erwartete_epoch` ist
    async fn replace_if_epoch(
        &self,
        record: &EntityKeyRecord,
        erwartete_epoch: u64,
    ) -> CryptoResult<bool>;
}

// ---------------------------------------------------------------------------
// Geraete-Verzeichnis
// ---------------------------------------------------------------------------

/// Oeffentlicher Eintrag eines Geraets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub user_id: UserId,
    pub device_id: DeviceId,
    /// X25519 Public Key (Base64)
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
}

/// Verzeichnis der oeffentlichen Geraete-Schluessel
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    /// Registriert ein neues Geraet (oder ueberschreibt ein bestehendes)
    async fn register_device(&self, record: &DeviceRecord) -> CryptoResult<()>;

    /// Oeffentlicher Schluessel eines Geraets; `KeinSchluessel` wenn unbekannt
    async fn get_public_key(&self, device: DeviceId) -> CryptoResult<String>;

    async fn devices_of_user(&self, user: UserId) -> CryptoResult<Vec<DeviceRecord>>;

    /// Setzt nach einer Identitaets-Rotation den neuen Public Key
    async fn update_public_key(
        &self,
        device: DeviceId,
        public_key: &str,
        rotated_at: DateTime<Utc>,
    ) -> CryptoResult<()>;
}

// ---------------------------------------------------------------------------
// Zustellung eingewickelter Schluessel
// ---------------------------------------------------------------------------

/// Ein fuer genau ein Geraet eingewickelter Entity-Schluessel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub entity: EntityId,
    pub device: DeviceId,
    pub epoch: u64,
    pub algorithm: GroupKeyAlgorithm,
    /// `[ephemeral_pub(32)][nonce(12)][ciphertext]`, Base64
    pub blob: String,
}

/// Postfach fuer eingewickelte Schluessel pro Geraet
#[async_trait]
pub trait KeyMailbox: Send + Sync {
    /// Stellt zu; ein Eintrag fuer (Entity, Geraet) mit hoeherer Epoch bleibt
    /// bestehen, sonst wird er ersetzt
    async fn deliver(&self, wrapped: &WrappedKey) -> CryptoResult<()>;

    /// Entnimmt alle ausstehenden Schluessel eines Geraets
    async fn take_for_device(&self, device: DeviceId) -> CryptoResult<Vec<WrappedKey>>;
}

/// Liefert die aktuellen Teilnehmer-Geraete einer Entity
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn participants(&self, entity: &EntityId) -> CryptoResult<Vec<DeviceId>>;
}

// ---------------------------------------------------------------------------
// Nachrichten
// ---------------------------------------------------------------------------

/// Eine gespeicherte Nachricht, wie der Nachrichten-Speicher sie liefert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub entity: EntityId,
    pub sender: UserId,
    pub envelope: Envelope,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Position dieser Nachricht fuer die seitenweise Suche
    pub fn cursor(&self) -> NachrichtenCursor {
        NachrichtenCursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Position in der Ordnung `(created_at, id)`
///
/// Eine Seite beginnt strikt nach dem Cursor. Nachrichten, die zwischen zwei
/// Seiten ihre Version wechseln, verschieben dadurch keine anderen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NachrichtenCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

/// Zugriff auf den Nachrichten-Speicher (Migration und Reparatur)
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Alle noch unverschluesselten Nachrichten eines Absenders
    async fn plaintext_messages_of(&self, sender: UserId) -> CryptoResult<Vec<StoredMessage>>;

    /// Nachrichten, deren Envelope mit der angegebenen Version verschluesselt ist
    ///
    /// Sortiert nach `(created_at, id)`, beginnend strikt nach `nach`.
    async fn messages_with_version(
        &self,
        version: EncryptionVersion,
        nach: Option<NachrichtenCursor>,
        limit: u32,
    ) -> CryptoResult<Vec<StoredMessage>>;

    /// Ersetzt das Envelope atomar, falls es noch `erwartet` entspricht
    async fn replace_if_envelope(
        &self,
        id: Uuid,
        erwartet: &Envelope,
        neu: &Envelope,
    ) -> CryptoResult<bool>;
}
