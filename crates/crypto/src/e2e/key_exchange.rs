//! Schluesselaustausch zwischen Geraeten
//!
//! Ein Entity-Schluessel wird fuer jedes Empfaenger-Geraet einzeln unter dessen
//! X25519-Public-Key eingewickelt und ueber das `KeyMailbox` zugestellt.
//!
//! ## Ablauf
//! 1. Sender: Public Key des Geraets im Verzeichnis nachschlagen
//! 2. Sender: Schluessel einwickeln (ephemeres X25519 + HKDF + AES-256-GCM)
//! 3. Postfach: Blob fuer genau dieses Geraet ablegen
//! 4. Empfaenger: Blob entnehmen, mit eigenem Private Key auspacken,
//!    persistieren (insert-if-absent) und cachen

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use huddle_core::{DeviceId, EntityId, UserId};
use parking_lot::RwLock;
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::e2e::group_key::{unwrap_key_for_recipient, wrap_key_for_recipient};
use crate::e2e::key_manager::GroupKeyManager;
use crate::e2e::rotation::rotate_identity;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::{import_public_key, IdentitaetsSpeicher, IdentityKeyPair};
use crate::store::{KeyMailbox, PublicKeyDirectory, WrappedKey};
use crate::types::GroupKey;

/// Schluesselaustausch eines Geraets
pub struct KeyExchange {
    manager: Arc<GroupKeyManager>,
    verzeichnis: Arc<dyn PublicKeyDirectory>,
    postfach: Arc<dyn KeyMailbox>,
    /// Eigene Geraete-Identitaet (wird bei Identitaets-Rotation ersetzt)
    identitaet: RwLock<IdentityKeyPair>,
    device: DeviceId,
}

impl KeyExchange {
    pub fn new(
        manager: Arc<GroupKeyManager>,
        verzeichnis: Arc<dyn PublicKeyDirectory>,
        postfach: Arc<dyn KeyMailbox>,
        identitaet: IdentityKeyPair,
        device: DeviceId,
    ) -> Self {
        Self {
            manager,
            verzeichnis,
            postfach,
            identitaet: RwLock::new(identitaet),
            device,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn manager(&self) -> &Arc<GroupKeyManager> {
        &self.manager
    }

    /// Ersetzt die eigene Identitaet nach einer Rotation
    ///
    /// Bereits zugestellte, unter dem alten Public Key eingewickelte Blobs
    /// sind danach nicht mehr auspackbar.
    pub fn identitaet_ersetzen(&self, identitaet: IdentityKeyPair) {
        *self.identitaet.write() = identitaet;
    }

    /// Public Key der aktuellen Identitaet (Base64)
    pub fn public_key(&self) -> String {
        self.identitaet.read().export_public()
    }

    /// Rotiert die eigene Identitaet: Verzeichnis, lokaler Speicher, aktive Identitaet
    ///
    /// Schlaegt ein Schritt fehl, bleibt die bisherige Identitaet aktiv.
    /// Gibt den neuen Public Key zurueck.
    pub async fn identitaet_rotieren(
        &self,
        speicher: &dyn IdentitaetsSpeicher,
        user: UserId,
    ) -> CryptoResult<String> {
        let neu = rotate_identity(
            speicher,
            self.verzeichnis.as_ref(),
            self.manager.uhr().as_ref(),
            user,
            self.device,
        )
        .await?;
        let public_key = neu.export_public();
        self.identitaet_ersetzen(neu);
        Ok(public_key)
    }

    /// Teilt den aktuellen Schluessel der Entity mit einem Geraet
    pub async fn share_key(
        &self,
        entity: EntityId,
        recipient_device: DeviceId,
    ) -> CryptoResult<WrappedKey> {
        let key = self.manager.get_or_create_key(entity).await?;
        self.share_group_key(&key, recipient_device).await
    }

    /// Wickelt einen konkreten Schluessel fuer ein Geraet ein und stellt ihn zu
    ///
    /// Abgeleitete Ersatzschluessel werden nie verteilt.
    pub async fn share_group_key(
        &self,
        key: &GroupKey,
        recipient_device: DeviceId,
    ) -> CryptoResult<WrappedKey> {
        if key.ist_abgeleitet() {
            return Err(CryptoError::speicher(format!(
                "{}: nur abgeleiteter Schluessel verfuegbar, Verteilung ausgesetzt",
                key.entity
            )));
        }

        let public_key = self.verzeichnis.get_public_key(recipient_device).await?;
        let public_key = import_public_key(&public_key)?;
        let blob = wrap_key_for_recipient(key, &public_key)?;

        let wrapped = WrappedKey {
            entity: key.entity,
            device: recipient_device,
            epoch: key.epoch,
            algorithm: key.algorithm,
            blob: STANDARD.encode(blob),
        };
        self.postfach.deliver(&wrapped).await?;

        debug!(
            entity = %key.entity,
            device = %recipient_device,
            epoch = key.epoch,
            "Schluessel zugestellt"
        );
        Ok(wrapped)
    }

    /// Teilt den Schluessel mit allen registrierten Geraeten eines Benutzers
    pub async fn share_with_user(
        &self,
        entity: EntityId,
        user: UserId,
    ) -> CryptoResult<Vec<WrappedKey>> {
        let key = self.manager.get_or_create_key(entity).await?;
        let geraete = self.verzeichnis.devices_of_user(user).await?;

        let mut zugestellt = Vec::with_capacity(geraete.len());
        for geraet in geraete {
            zugestellt.push(self.share_group_key(&key, geraet.device_id).await?);
        }

        info!(
            entity = %entity,
            user = %user,
            geraete = zugestellt.len(),
            "Schluessel mit Benutzer geteilt"
        );
        Ok(zugestellt)
    }

    /// Stellt sicher, dass ein Teilnehmer-Geraet den Schluessel der Entity hat
    ///
    /// Fuer das eigene Geraet reicht `get_or_create_key`; es wird nichts zugestellt.
    pub async fn ensure_participant_has_key(
        &self,
        entity: EntityId,
        device: DeviceId,
    ) -> CryptoResult<Option<WrappedKey>> {
        if device == self.device {
            self.manager.get_or_create_key(entity).await?;
            return Ok(None);
        }
        self.share_key(entity, device).await.map(Some)
    }

    /// Packt einen zugestellten Schluessel aus und uebernimmt ihn
    ///
    /// Fehler sind dauerhaft (`CryptoError::Unwrap`) und werden nicht wiederholt.
    pub async fn receive_key(
        &self,
        entity: EntityId,
        wrapped: &WrappedKey,
    ) -> CryptoResult<Arc<GroupKey>> {
        if wrapped.entity != entity {
            return Err(CryptoError::Unwrap(format!(
                "Schluessel gehoert zu {}, erwartet {entity}",
                wrapped.entity
            )));
        }
        if wrapped.device != self.device {
            return Err(CryptoError::Unwrap(format!(
                "Schluessel ist fuer {}, nicht fuer {}",
                wrapped.device, self.device
            )));
        }

        let blob = STANDARD
            .decode(&wrapped.blob)
            .map_err(|e| CryptoError::Unwrap(format!("Base64: {e}")))?;

        let key = {
            let identitaet = self.identitaet.read();
            unwrap_key_for_recipient(&blob, &identitaet, entity, wrapped.epoch, wrapped.algorithm)?
        };

        let key = self.manager.install_key(key).await?;
        info!(entity = %entity, epoch = key.epoch, "Schluessel empfangen");
        Ok(key)
    }

    /// Entnimmt und verarbeitet alle ausstehenden Schluessel dieses Geraets
    ///
    /// Dauerhaft nicht auspackbare Blobs landen in `abgelehnt` und werden
    /// nicht erneut zugestellt. Bei einem voruebergehenden Fehler gehen der
    /// betroffene und alle noch offenen Blobs zurueck ins Postfach.
    pub async fn receive_pending(&self) -> CryptoResult<Empfangsergebnis> {
        let mut ausstehend = self.postfach.take_for_device(self.device).await?.into_iter();
        let mut ergebnis = Empfangsergebnis::default();

        while let Some(wrapped) = ausstehend.next() {
            match self.receive_key(wrapped.entity, &wrapped).await {
                Ok(key) => ergebnis.empfangen.push(key),
                Err(e) if e.ist_dauerhaft() => {
                    warn!(
                        entity = %wrapped.entity,
                        epoch = wrapped.epoch,
                        fehler = %e,
                        "Zugestellter Schluessel abgelehnt"
                    );
                    ergebnis.abgelehnt.push((wrapped, e));
                }
                Err(e) => {
                    let offen: Vec<WrappedKey> =
                        std::iter::once(wrapped).chain(ausstehend).collect();
                    debug!(
                        anzahl = offen.len(),
                        fehler = %e,
                        "Empfang unterbrochen, Blobs zurueck ins Postfach"
                    );
                    for rest in &offen {
                        if let Err(zustellung) = self.postfach.deliver(rest).await {
                            warn!(
                                entity = %rest.entity,
                                fehler = %zustellung,
                                "Schluessel konnte nicht zurueckgelegt werden"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(ergebnis)
    }
}

/// Ergebnis von `KeyExchange::receive_pending`
#[derive(Debug, Default)]
pub struct Empfangsergebnis {
    /// Uebernommene Schluessel (so wie sie nach `install_key` gelten)
    pub empfangen: Vec<Arc<GroupKey>>,
    /// Dauerhaft abgelehnte Blobs samt Grund
    pub abgelehnt: Vec<(WrappedKey, CryptoError)>,
}

impl Empfangsergebnis {
    /// `true` wenn fuer die Entity ein Schluessel mit hoeherer Epoch ankam
    pub fn neuer_als(&self, entity: EntityId, epoch: u64) -> bool {
        self.empfangen
            .iter()
            .any(|k| k.entity == entity && k.epoch > epoch)
    }
}

impl std::fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExchange")
            .field("device", &self.device)
            .field("manager", &self.manager)
            .finish()
    }
}

/// HKDF-basierte Key Derivation (allgemein verwendbar)
///
/// Das Ergebnis wird beim Drop genullt.
pub fn hkdf_derive(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    len: usize,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new(vec![0u8; len]);
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
