//! Entity-Schluessel-Verwaltung (Key Manager)
//!
//! Verwaltet den aktiven Schluessel pro Entity:
//! - Lesen mit Cache (read-through ueber den `EntityKeyStore`)
//! - Idempotentes Erstellen (insert-if-absent, Verlierer liest neu)
//! - Uebernahme ausgetauschter Schluessel
//! - Rotation per Compare-and-Set auf die Epoch
//! - Degradierter Modus mit abgeleitetem Ersatzschluessel

use std::sync::Arc;

use dashmap::DashMap;
use huddle_core::{EntityId, SystemUhr, Uhr};
use tracing::{debug, info, warn};

use crate::e2e::fallback::derive_fallback_key;
use crate::e2e::group_key::{
    create_group_key, record_aus_schluessel, schluessel_aus_record, RecordSchutz,
};
use crate::error::{CryptoError, CryptoResult};
use crate::store::{EinfuegeErgebnis, EntityKeyStore};
use crate::types::{GroupKey, GroupKeyAlgorithm, SecretBytes};

/// Ergebnis einer Rotation
#[derive(Debug, Clone)]
pub struct RotationsErgebnis {
    /// Der nun aktive Schluessel
    pub key: Arc<GroupKey>,
    /// `false` wenn ein anderer Schreiber die Rotation zuerst abgeschlossen hat
    pub gewonnen: bool,
}

/// Verwaltet Entity-Schluessel fuer einen Akteur (Client oder Dienst)
pub struct GroupKeyManager {
    store: Arc<dyn EntityKeyStore>,
    schutz: RecordSchutz,
    algorithm: GroupKeyAlgorithm,
    fallback_secret: Option<SecretBytes>,
    uhr: Arc<dyn Uhr>,
    /// Aktuelle Schluessel pro Entity
    keys: DashMap<EntityId, Arc<GroupKey>>,
}

impl GroupKeyManager {
    pub fn new(store: Arc<dyn EntityKeyStore>, schutz: RecordSchutz) -> Self {
        Self {
            store,
            schutz,
            algorithm: GroupKeyAlgorithm::default(),
            fallback_secret: None,
            uhr: Arc::new(SystemUhr),
            keys: DashMap::new(),
        }
    }

    /// Algorithmus fuer neu erzeugte Schluessel
    pub fn with_algorithm(mut self, algorithm: GroupKeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Aktiviert den degradierten Modus mit dem angegebenen Backend-Geheimnis
    pub fn with_fallback(mut self, secret: SecretBytes) -> Self {
        self.fallback_secret = Some(secret);
        self
    }

    pub fn with_uhr(mut self, uhr: Arc<dyn Uhr>) -> Self {
        self.uhr = uhr;
        self
    }

    pub fn uhr(&self) -> &Arc<dyn Uhr> {
        &self.uhr
    }

    /// Gibt den aktiven Schluessel zurueck und erstellt ihn bei Bedarf
    ///
    /// Reihenfolge: Cache -> persistierter Record -> neu erzeugen.
    /// Ist der Speicher nicht erreichbar und ein Fallback-Geheimnis gesetzt,
    /// wird ein abgeleiteter Schluessel geliefert (markiert als `Abgeleitet`).
    pub async fn get_or_create_key(&self, entity: EntityId) -> CryptoResult<Arc<GroupKey>> {
        if let Some(key) = self.cached(&entity) {
            return Ok(key);
        }

        let key = match self.laden_oder_erstellen(entity).await {
            Ok(key) => key,
            Err(CryptoError::Speicher(grund)) => match &self.fallback_secret {
                Some(secret) => {
                    warn!(
                        entity = %entity,
                        grund = %grund,
                        "Schluessel-Speicher nicht erreichbar, verwende abgeleiteten Schluessel"
                    );
                    derive_fallback_key(entity, secret)?
                }
                None => return Err(CryptoError::Speicher(grund)),
            },
            Err(e) => return Err(e),
        };

        Ok(self.cachen_falls_leer(key))
    }

    /// Laedt den kanonischen Record oder legt ihn idempotent an
    async fn laden_oder_erstellen(&self, entity: EntityId) -> CryptoResult<GroupKey> {
        if let Some(record) = self.store.get(&entity).await? {
            return schluessel_aus_record(&record, &self.schutz);
        }

        let key = create_group_key(entity, 0, self.algorithm);
        let record = record_aus_schluessel(&key, &self.schutz, self.uhr.jetzt())?;

        match self.store.put_if_absent(&record).await? {
            EinfuegeErgebnis::Eingefuegt => {
                info!(entity = %entity, "Neuer Entity-Schluessel erstellt");
                Ok(key)
            }
            EinfuegeErgebnis::Konflikt => {
                // Anderer Akteur war schneller: dessen Record uebernehmen
                debug!(entity = %entity, "Erstellung verloren, lese kanonischen Record");
                self.kanonisch_laden(entity).await
            }
        }
    }

    async fn kanonisch_laden(&self, entity: EntityId) -> CryptoResult<GroupKey> {
        let record = self
            .store
            .get(&entity)
            .await?
            .ok_or_else(|| CryptoError::KeinSchluessel(entity.to_string()))?;
        schluessel_aus_record(&record, &self.schutz)
    }

    fn cachen_falls_leer(&self, key: GroupKey) -> Arc<GroupKey> {
        Arc::clone(
            self.keys
                .entry(key.entity)
                .or_insert_with(|| Arc::new(key))
                .value(),
        )
    }

    fn cachen(&self, key: GroupKey) -> Arc<GroupKey> {
        let key = Arc::new(key);
        self.keys.insert(key.entity, Arc::clone(&key));
        key
    }

    /// Gibt den Schluessel aus dem Cache zurueck (ohne Speicherzugriff)
    pub fn cached(&self, entity: &EntityId) -> Option<Arc<GroupKey>> {
        self.keys.get(entity).map(|entry| Arc::clone(&*entry))
    }

    /// Kanonischer Schluessel ohne Erzeugung (Entschluesseln)
    ///
    /// Ein abgeleiteter Cache-Eintrag zaehlt nicht; dann wird der Speicher
    /// gefragt. `KeinSchluessel` wenn die Entity noch keinen Record hat.
    pub async fn existing_key(&self, entity: EntityId) -> CryptoResult<Arc<GroupKey>> {
        if let Some(key) = self.cached(&entity).filter(|k| !k.ist_abgeleitet()) {
            return Ok(key);
        }

        match self.store.get(&entity).await? {
            Some(record) => {
                let key = schluessel_aus_record(&record, &self.schutz)?;
                Ok(self.cachen(key))
            }
            None => Err(CryptoError::KeinSchluessel(entity.to_string())),
        }
    }

    /// Verwirft den Cache-Eintrag; der naechste Zugriff liest neu
    pub fn invalidate(&self, entity: &EntityId) {
        if self.keys.remove(entity).is_some() {
            debug!(entity = %entity, "Schluessel-Cache invalidiert");
        }
    }

    /// Alle Entities, fuer die aktuell nur ein abgeleiteter Schluessel im Cache liegt
    pub fn degraded_entities(&self) -> Vec<EntityId> {
        self.keys
            .iter()
            .filter(|e| e.value().ist_abgeleitet())
            .map(|e| *e.key())
            .collect()
    }

    /// Abgeleiteter Schluessel einer Entity (fuer Envelopes mit Version `Abgeleitet`)
    pub fn fallback_key(&self, entity: EntityId) -> CryptoResult<GroupKey> {
        let secret = self.fallback_secret.as_ref().ok_or_else(|| {
            CryptoError::KeinSchluessel(format!("{entity} (kein Fallback-Geheimnis konfiguriert)"))
        })?;
        derive_fallback_key(entity, secret)
    }

    /// Uebernimmt einen per Key-Exchange empfangenen Schluessel
    ///
    /// Der Schluessel wird persistiert (insert-if-absent). Existiert bereits ein
    /// Record mit gleicher oder neuerer Epoch, gilt dieser.
    pub async fn install_key(&self, key: GroupKey) -> CryptoResult<Arc<GroupKey>> {
        let entity = key.entity;
        let record = record_aus_schluessel(&key, &self.schutz, self.uhr.jetzt())?;

        let ergebnis = match self.store.put_if_absent(&record).await {
            Ok(ergebnis) => ergebnis,
            Err(CryptoError::Speicher(grund)) => {
                warn!(entity = %entity, grund = %grund, "Empfangener Schluessel nur im Cache");
                return Ok(self.cachen(key));
            }
            Err(e) => return Err(e),
        };

        match ergebnis {
            EinfuegeErgebnis::Eingefuegt => {
                debug!(entity = %entity, epoch = key.epoch, "Empfangener Schluessel gespeichert");
                Ok(self.cachen(key))
            }
            EinfuegeErgebnis::Konflikt => {
                let gespeichert = self.kanonisch_laden(entity).await?;
                if gespeichert.epoch >= key.epoch {
                    if gespeichert.epoch > key.epoch {
                        warn!(
                            entity = %entity,
                            empfangen = key.epoch,
                            gespeichert = gespeichert.epoch,
                            "Empfangener Schluessel ist veraltet"
                        );
                    }
                    Ok(self.cachen(gespeichert))
                } else if self.store.replace_if_epoch(&record, gespeichert.epoch).await? {
                    debug!(entity = %entity, epoch = key.epoch, "Neuere Epoch empfangen, Record ersetzt");
                    Ok(self.cachen(key))
                } else {
                    // Gleichzeitig ersetzt: der Speicher entscheidet
                    let aktuell = self.kanonisch_laden(entity).await?;
                    Ok(self.cachen(aktuell))
                }
            }
        }
    }

    /// Ersetzt den kanonischen Schluessel durch einen neuen (destruktiv)
    ///
    /// Der Cache wird invalidiert, bevor der neue Record geschrieben wird.
    /// Verliert der Aufruf das Compare-and-Set, wird der Schluessel des
    /// Gewinners gelesen statt erneut zu schreiben.
    pub async fn rotate(&self, entity: EntityId) -> CryptoResult<RotationsErgebnis> {
        self.invalidate(&entity);

        let aktuell = self.store.get(&entity).await?;
        let neu = match &aktuell {
            Some(record) => create_group_key(entity, record.epoch + 1, record.algorithm),
            None => create_group_key(entity, 0, self.algorithm),
        };
        let record = record_aus_schluessel(&neu, &self.schutz, self.uhr.jetzt())?;

        let gewonnen = match &aktuell {
            Some(alt) => self.store.replace_if_epoch(&record, alt.epoch).await?,
            None => self.store.put_if_absent(&record).await? == EinfuegeErgebnis::Eingefuegt,
        };

        if gewonnen {
            info!(entity = %entity, epoch = neu.epoch, "Entity-Schluessel rotiert");
            Ok(RotationsErgebnis {
                key: self.cachen(neu),
                gewonnen,
            })
        } else {
            debug!(entity = %entity, "Rotation verloren, lese kanonischen Record");
            let gewinner = self.kanonisch_laden(entity).await?;
            Ok(RotationsErgebnis {
                key: self.cachen(gewinner),
                gewonnen,
            })
        }
    }
}

impl std::fmt::Debug for GroupKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeyManager")
            .field("algorithm", &self.algorithm)
            .field("fallback", &self.fallback_secret.is_some())
            .field("cached", &self.keys.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
