//! In-Memory-Implementierungen der Kollaborateur-Traits
//!
//! Fuer Tests und fuer Clients ohne eigenen persistenten Speicher.
//! `SpeicherSchluesselStore` kann per `set_erreichbar(false)` einen
//! Speicherausfall simulieren.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use huddle_core::{DeviceId, EntityId, UserId};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::{CryptoError, CryptoResult};
use crate::store::{
    DeviceRecord, EinfuegeErgebnis, EntityKeyRecord, EntityKeyStore, KeyMailbox, MessageStore,
    NachrichtenCursor, ParticipantDirectory, PublicKeyDirectory, StoredMessage, WrappedKey,
};
use crate::types::EncryptionVersion;

/// Entity-Schluessel im Speicher
#[derive(Debug)]
pub struct SpeicherSchluesselStore {
    records: DashMap<EntityId, EntityKeyRecord>,
    erreichbar: AtomicBool,
}

impl Default for SpeicherSchluesselStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            erreichbar: AtomicBool::new(true),
        }
    }
}

impl SpeicherSchluesselStore {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Simuliert einen Ausfall (`false`) bzw. die Wiederherstellung (`true`)
    pub fn set_erreichbar(&self, erreichbar: bool) {
        self.erreichbar.store(erreichbar, Ordering::SeqCst);
    }

    /// Anzahl gespeicherter Records
    pub fn anzahl(&self) -> usize {
        self.records.len()
    }

    fn pruefen(&self) -> CryptoResult<()> {
        if self.erreichbar.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CryptoError::speicher("Schluessel-Speicher nicht erreichbar"))
        }
    }
}

#[async_trait]
impl EntityKeyStore for SpeicherSchluesselStore {
    async fn put_if_absent(&self, record: &EntityKeyRecord) -> CryptoResult<EinfuegeErgebnis> {
        self.pruefen()?;
        match self.records.entry(record.entity) {
            Entry::Occupied(_) => Ok(EinfuegeErgebnis::Konflikt),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(EinfuegeErgebnis::Eingefuegt)
            }
        }
    }

    async fn get(&self, entity: &EntityId) -> CryptoResult<Option<EntityKeyRecord>> {
        self.pruefen()?;
        Ok(self.records.get(entity).map(|r| r.value().clone()))
    }

    async fn replace_if_epoch(
        &self,
        record: &EntityKeyRecord,
        erwartete_epoch: u64,
    ) -> CryptoResult<bool> {
        self.pruefen()?;
        match self.records.get_mut(&record.entity) {
            Some(mut aktuell) if aktuell.epoch == erwartete_epoch => {
                *aktuell = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Geraete-Verzeichnis im Speicher
#[derive(Debug, Default)]
pub struct SpeicherVerzeichnis {
    geraete: DashMap<DeviceId, DeviceRecord>,
}

impl SpeicherVerzeichnis {
    pub fn neu() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublicKeyDirectory for SpeicherVerzeichnis {
    async fn register_device(&self, record: &DeviceRecord) -> CryptoResult<()> {
        self.geraete.insert(record.device_id, record.clone());
        Ok(())
    }

    async fn get_public_key(&self, device: DeviceId) -> CryptoResult<String> {
        self.geraete
            .get(&device)
            .map(|r| r.public_key.clone())
            .ok_or_else(|| CryptoError::KeinSchluessel(device.to_string()))
    }

    async fn devices_of_user(&self, user: UserId) -> CryptoResult<Vec<DeviceRecord>> {
        let mut geraete: Vec<DeviceRecord> = self
            .geraete
            .iter()
            .filter(|r| r.user_id == user)
            .map(|r| r.value().clone())
            .collect();
        geraete.sort_by_key(|r| r.created_at);
        Ok(geraete)
    }

    async fn update_public_key(
        &self,
        device: DeviceId,
        public_key: &str,
        rotated_at: DateTime<Utc>,
    ) -> CryptoResult<()> {
        let mut record = self
            .geraete
            .get_mut(&device)
            .ok_or_else(|| CryptoError::KeinSchluessel(device.to_string()))?;
        record.public_key = public_key.to_string();
        record.rotated_at = Some(rotated_at);
        Ok(())
    }
}

/// Schluessel-Postfach im Speicher
#[derive(Debug, Default)]
pub struct SpeicherPostfach {
    faecher: DashMap<DeviceId, Vec<WrappedKey>>,
}

impl SpeicherPostfach {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Anzahl ausstehender Schluessel fuer ein Geraet
    pub fn ausstehend(&self, device: DeviceId) -> usize {
        self.faecher.get(&device).map(|f| f.len()).unwrap_or(0)
    }
}

#[async_trait]
impl KeyMailbox for SpeicherPostfach {
    async fn deliver(&self, wrapped: &WrappedKey) -> CryptoResult<()> {
        let mut fach = self.faecher.entry(wrapped.device).or_default();
        if fach
            .iter()
            .any(|w| w.entity == wrapped.entity && w.epoch > wrapped.epoch)
        {
            return Ok(());
        }
        fach.retain(|w| w.entity != wrapped.entity);
        fach.push(wrapped.clone());
        Ok(())
    }

    async fn take_for_device(&self, device: DeviceId) -> CryptoResult<Vec<WrappedKey>> {
        Ok(self
            .faecher
            .remove(&device)
            .map(|(_, fach)| fach)
            .unwrap_or_default())
    }
}

/// Teilnehmer-Verzeichnis im Speicher
#[derive(Debug, Default)]
pub struct SpeicherTeilnehmer {
    teilnehmer: DashMap<EntityId, Vec<DeviceId>>,
}

impl SpeicherTeilnehmer {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn hinzufuegen(&self, entity: EntityId, device: DeviceId) {
        let mut liste = self.teilnehmer.entry(entity).or_default();
        if !liste.contains(&device) {
            liste.push(device);
        }
    }

    pub fn entfernen(&self, entity: &EntityId, device: DeviceId) {
        if let Some(mut liste) = self.teilnehmer.get_mut(entity) {
            liste.retain(|d| *d != device);
        }
    }
}

#[async_trait]
impl ParticipantDirectory for SpeicherTeilnehmer {
    async fn participants(&self, entity: &EntityId) -> CryptoResult<Vec<DeviceId>> {
        Ok(self
            .teilnehmer
            .get(entity)
            .map(|l| l.value().clone())
            .unwrap_or_default())
    }
}

/// Nachrichten-Speicher im Speicher (Einfuegereihenfolge bleibt erhalten)
#[derive(Debug, Default)]
pub struct SpeicherNachrichten {
    nachrichten: Mutex<Vec<StoredMessage>>,
}

impl SpeicherNachrichten {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt eine Nachricht ab und gibt ihre ID zurueck
    pub fn einfuegen(&self, entity: EntityId, sender: UserId, envelope: Envelope) -> Uuid {
        let id = Uuid::new_v4();
        self.nachrichten.lock().push(StoredMessage {
            id,
            entity,
            sender,
            envelope,
            created_at: Utc::now(),
        });
        id
    }

    pub fn laden(&self, id: Uuid) -> Option<StoredMessage> {
        self.nachrichten.lock().iter().find(|n| n.id == id).cloned()
    }
}

#[async_trait]
impl MessageStore for SpeicherNachrichten {
    async fn plaintext_messages_of(&self, sender: UserId) -> CryptoResult<Vec<StoredMessage>> {
        Ok(self
            .nachrichten
            .lock()
            .iter()
            .filter(|n| n.sender == sender && !n.envelope.ist_verschluesselt())
            .cloned()
            .collect())
    }

    async fn messages_with_version(
        &self,
        version: EncryptionVersion,
        nach: Option<NachrichtenCursor>,
        limit: u32,
    ) -> CryptoResult<Vec<StoredMessage>> {
        let mut treffer: Vec<StoredMessage> = self
            .nachrichten
            .lock()
            .iter()
            .filter(|n| n.envelope.version() == Some(version))
            .filter(|n| nach.map_or(true, |c| n.cursor() > c))
            .cloned()
            .collect();
        treffer.sort_by_key(StoredMessage::cursor);
        treffer.truncate(limit as usize);
        Ok(treffer)
    }

    async fn replace_if_envelope(
        &self,
        id: Uuid,
        erwartet: &Envelope,
        neu: &Envelope,
    ) -> CryptoResult<bool> {
        let mut nachrichten = self.nachrichten.lock();
        match nachrichten.iter_mut().find(|n| n.id == id) {
            Some(n) if n.envelope == *erwartet => {
                n.envelope = neu.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
