//! E2eeService – Ver- und Entschluesselung pro Entity fuer die Aufrufer
//!
//! Die umgebende Anwendung (Nachrichten speichern, Relay, Anzeige) sieht nur
//! diese Fassade: Klartext rein, `Envelope` raus und umgekehrt.

use std::sync::Arc;

use huddle_core::{DeviceId, EntityId, UserId};
use huddle_crypto::e2e::{decrypt_text, encrypt_message, GroupKeyManager, KeyExchange};
use huddle_crypto::store::{MessageStore, ParticipantDirectory, WrappedKey};
use huddle_crypto::{
    CryptoError, EncryptionVersion, Envelope, GroupKey, IdentitaetsSpeicher, RotationsBericht,
    SchluesselRotation,
};
use tracing::{debug, warn};

use crate::error::E2eeResult;
use crate::migration::{migrate_plaintext, MigrationsBericht};

/// Anzeigetext fuer Nachrichten, die nicht entschluesselt werden koennen
pub const PLATZHALTER: &str = "[Nachricht konnte nicht entschluesselt werden]";

/// Fassade des E2EE-Subsystems fuer ein Geraet
pub struct E2eeService {
    exchange: Arc<KeyExchange>,
    rotation: SchluesselRotation,
    nachrichten: Arc<dyn MessageStore>,
}

impl E2eeService {
    /// Erstellt einen neuen E2eeService
    pub fn neu(
        exchange: Arc<KeyExchange>,
        teilnehmer: Arc<dyn ParticipantDirectory>,
        nachrichten: Arc<dyn MessageStore>,
    ) -> Arc<Self> {
        let rotation = SchluesselRotation::new(Arc::clone(&exchange), teilnehmer);
        Arc::new(Self {
            exchange,
            rotation,
            nachrichten,
        })
    }

    pub fn manager(&self) -> &Arc<GroupKeyManager> {
        self.exchange.manager()
    }

    pub fn exchange(&self) -> &Arc<KeyExchange> {
        &self.exchange
    }

    /// Verschluesselt einen Klartext fuer die Entity
    ///
    /// Erstellt den Entity-Schluessel bei Bedarf. Im degradierten Modus traegt
    /// das Envelope die Version `Abgeleitet`.
    pub async fn encrypt_for_entity(&self, entity: EntityId, plaintext: &str) -> E2eeResult<Envelope> {
        let key = self.manager().get_or_create_key(entity).await?;
        let payload = encrypt_message(plaintext.as_bytes(), &key)?;
        Ok(Envelope::aus_payload(&payload, key.version()))
    }

    /// Entschluesselt ein Envelope der Entity
    ///
    /// Klartext-Envelopes (Altbestand) werden unveraendert zurueckgegeben.
    pub async fn decrypt_for_entity(&self, entity: EntityId, envelope: &Envelope) -> E2eeResult<String> {
        let (payload, version) = match envelope {
            Envelope::Klartext { content } => return Ok(content.clone()),
            Envelope::Verschluesselt { version, .. } => match envelope.payload()? {
                Some(payload) => (payload, *version),
                None => return Err(CryptoError::UngueltigeDaten("Envelope ohne Payload".into()).into()),
            },
        };

        let key = self.schluessel_fuer(entity, version).await?;
        match decrypt_text(&payload, &key) {
            Err(CryptoError::Entschluesselung(grund)) if version == EncryptionVersion::Kanonisch => {
                // Evtl. rotiert: der neue Schluessel liegt dann im Postfach
                let ergebnis = self.exchange.receive_pending().await?;
                if !ergebnis.neuer_als(entity, key.epoch) {
                    return Err(CryptoError::Entschluesselung(grund).into());
                }
                let aktuell = self.manager().existing_key(entity).await?;
                Ok(decrypt_text(&payload, &aktuell)?)
            }
            andere => Ok(andere?),
        }
    }

    /// Wie `decrypt_for_entity`, liefert bei Fehlern aber den Platzhalter
    pub async fn display_text(&self, entity: EntityId, envelope: &Envelope) -> String {
        match self.decrypt_for_entity(entity, envelope).await {
            Ok(text) => text,
            Err(e) => {
                warn!(entity = %entity, fehler = %e, "Nachricht nicht anzeigbar");
                PLATZHALTER.to_string()
            }
        }
    }

    async fn schluessel_fuer(
        &self,
        entity: EntityId,
        version: EncryptionVersion,
    ) -> E2eeResult<Arc<GroupKey>> {
        if version == EncryptionVersion::Abgeleitet {
            return Ok(Arc::new(self.manager().fallback_key(entity)?));
        }

        match self.manager().existing_key(entity).await {
            Err(e) if e.ist_kein_schluessel() => {
                // Vielleicht liegt der Schluessel schon im Postfach
                debug!(entity = %entity, "Kein Schluessel, pruefe Postfach");
                self.exchange.receive_pending().await?;
                Ok(self.manager().existing_key(entity).await?)
            }
            andere => Ok(andere?),
        }
    }

    /// Stellt sicher, dass das Geraet den Schluessel der Entity besitzt
    pub async fn ensure_participant_has_key(
        &self,
        entity: EntityId,
        device: DeviceId,
    ) -> E2eeResult<Option<WrappedKey>> {
        Ok(self.exchange.ensure_participant_has_key(entity, device).await?)
    }

    /// Verschluesselt alle Klartext-Nachrichten des Benutzers (idempotent)
    pub async fn migrate_plaintext(&self, user: UserId) -> E2eeResult<MigrationsBericht> {
        migrate_plaintext(self.manager(), self.nachrichten.as_ref(), user).await
    }

    /// Ersetzt den Schluessel der Entity und verteilt ihn an alle Teilnehmer
    pub async fn rotate_entity_key(&self, entity: EntityId) -> E2eeResult<RotationsBericht> {
        Ok(self.rotation.rotate_entity_key(entity).await?)
    }

    /// Ersetzt die Geraete-Identitaet und gibt den neuen Public Key zurueck
    ///
    /// Bereits zugestellte, aber noch nicht abgeholte Schluessel sind danach
    /// nicht mehr auspackbar; sie werden vorher aus dem Postfach uebernommen.
    pub async fn rotate_identity(
        &self,
        identitaeten: &dyn IdentitaetsSpeicher,
        user: UserId,
    ) -> E2eeResult<String> {
        let ergebnis = self.exchange.receive_pending().await?;
        if !ergebnis.empfangen.is_empty() {
            debug!(
                anzahl = ergebnis.empfangen.len(),
                "Postfach vor der Identitaets-Rotation geleert"
            );
        }
        Ok(self.exchange.identitaet_rotieren(identitaeten, user).await?)
    }
}

impl std::fmt::Debug for E2eeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("E2eeService")
            .field("exchange", &self.exchange)
            .finish()
    }
}
