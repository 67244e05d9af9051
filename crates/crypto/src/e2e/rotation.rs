//! Schluessel-Rotation
//!
//! - Entity-Schluessel: neuer Schluessel mit Epoch + 1, Compare-and-Set auf
//!   den Record, danach Neuverteilung an alle aktuellen Teilnehmer.
//!   Der alte Schluessel wird ersetzt, nicht archiviert.
//! - Geraete-Identitaet: neues X25519-Paar, Public Key zuerst im Verzeichnis,
//!   dann lokal gespeichert. Bestehende Schluessel werden nicht neu eingewickelt.

use std::sync::Arc;

use huddle_core::{DeviceId, EntityId, Uhr, UserId};
use tracing::{error, info, warn};

use crate::e2e::key_exchange::KeyExchange;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::{IdentitaetsSpeicher, IdentityKeyPair};
use crate::store::{ParticipantDirectory, PublicKeyDirectory};
use crate::types::GroupKey;

/// Ergebnis einer Entity-Rotation
#[derive(Debug, Clone)]
pub struct RotationsBericht {
    pub key: Arc<GroupKey>,
    /// `false` wenn ein gleichzeitiger Aufruf die Rotation durchgefuehrt hat
    pub gewonnen: bool,
    /// Geraete, denen der neue Schluessel zugestellt wurde
    pub verteilt: Vec<DeviceId>,
    /// Geraete, bei denen die Zustellung scheiterte
    pub fehlgeschlagen: Vec<DeviceId>,
}

/// Rotiert Entity-Schluessel und verteilt sie neu
pub struct SchluesselRotation {
    exchange: Arc<KeyExchange>,
    teilnehmer: Arc<dyn ParticipantDirectory>,
}

impl SchluesselRotation {
    pub fn new(exchange: Arc<KeyExchange>, teilnehmer: Arc<dyn ParticipantDirectory>) -> Self {
        Self {
            exchange,
            teilnehmer,
        }
    }

    /// Ersetzt den Schluessel der Entity und verteilt den neuen an alle Teilnehmer
    ///
    /// Nur der Gewinner des Compare-and-Set verteilt; der Verlierer uebernimmt
    /// lediglich den Schluessel des Gewinners.
    pub async fn rotate_entity_key(&self, entity: EntityId) -> CryptoResult<RotationsBericht> {
        let ergebnis = self.exchange.manager().rotate(entity).await?;

        let mut bericht = RotationsBericht {
            key: Arc::clone(&ergebnis.key),
            gewonnen: ergebnis.gewonnen,
            verteilt: Vec::new(),
            fehlgeschlagen: Vec::new(),
        };
        if !ergebnis.gewonnen {
            return Ok(bericht);
        }

        let eigenes = self.exchange.device();
        for device in self.teilnehmer.participants(&entity).await? {
            if device == eigenes {
                continue;
            }
            match self.exchange.share_group_key(&ergebnis.key, device).await {
                Ok(_) => bericht.verteilt.push(device),
                Err(e) => {
                    warn!(
                        entity = %entity,
                        device = %device,
                        fehler = %e,
                        "Neuer Schluessel konnte nicht zugestellt werden"
                    );
                    bericht.fehlgeschlagen.push(device);
                }
            }
        }

        info!(
            entity = %entity,
            epoch = ergebnis.key.epoch,
            verteilt = bericht.verteilt.len(),
            fehlgeschlagen = bericht.fehlgeschlagen.len(),
            "Rotation abgeschlossen"
        );
        Ok(bericht)
    }
}

/// Erzeugt eine neue Geraete-Identitaet und veroeffentlicht den Public Key
///
/// Reihenfolge: Verzeichnis (`rotated_at` = aktuelle Zeit der `Uhr`), dann
/// lokaler Speicher. Scheitert das lokale Speichern, wird der bisherige
/// Verzeichnis-Eintrag wiederhergestellt. Das Geraet ist danach weder unter
/// dem alten noch unter dem neuen Schluessel halb erreichbar.
pub async fn rotate_identity(
    speicher: &dyn IdentitaetsSpeicher,
    verzeichnis: &dyn PublicKeyDirectory,
    uhr: &dyn Uhr,
    user: UserId,
    device: DeviceId,
) -> CryptoResult<IdentityKeyPair> {
    let bisher = verzeichnis
        .devices_of_user(user)
        .await?
        .into_iter()
        .find(|r| r.device_id == device)
        .ok_or_else(|| CryptoError::KeinSchluessel(format!("Geraet {device} von {user}")))?;

    let neu = IdentityKeyPair::generate();
    verzeichnis
        .update_public_key(device, &neu.export_public(), uhr.jetzt())
        .await?;

    if let Err(e) = speicher.persist_local(user, &neu).await {
        match verzeichnis.register_device(&bisher).await {
            Ok(()) => warn!(device = %device, fehler = %e, "Identitaets-Rotation zurueckgenommen"),
            Err(rueckbau) => error!(
                device = %device,
                fehler = %e,
                rueckbau = %rueckbau,
                "Verzeichnis-Eintrag konnte nicht wiederhergestellt werden"
            ),
        }
        return Err(e);
    }

    info!(user = %user, device = %device, "Geraete-Identitaet rotiert");
    Ok(neu)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
