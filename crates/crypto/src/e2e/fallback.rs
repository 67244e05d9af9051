//! Abgeleitete Ersatzschluessel (degradierter Modus)
//!
//! Ist der kanonische Entity-Record nicht erreichbar, kann ein Schluessel
//! deterministisch aus Entity-ID und einem Geheimnis des Backends abgeleitet
//! werden (PBKDF2-HMAC-SHA256, festes Salz). Solche Schluessel tragen
//! `SchluesselHerkunft::Abgeleitet`, damit betroffene Nachrichten spaeter
//! gefunden und neu verschluesselt werden koennen.

use std::num::NonZeroU32;

use huddle_core::EntityId;
use ring::pbkdf2;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{GroupKey, GroupKeyAlgorithm, SchluesselHerkunft, SecretBytes, SCHLUESSEL_LAENGE};

/// Festes Salz der Ableitung (aendern macht alle abgeleiteten Schluessel ungueltig)
pub const FALLBACK_SALZ: &[u8] = b"huddle-fallback-salt-v1";

/// PBKDF2-Iterationen
pub const FALLBACK_ITERATIONEN: u32 = 100_000;

/// Leitet den Ersatzschluessel einer Entity ab
///
/// Gleiche Eingaben ergeben immer denselben Schluessel.
pub fn derive_fallback_key(entity: EntityId, master_secret: &SecretBytes) -> CryptoResult<GroupKey> {
    if master_secret.is_empty() {
        return Err(CryptoError::KeyDerivation(
            "Fallback-Geheimnis ist leer".to_string(),
        ));
    }

    let iterationen = NonZeroU32::new(FALLBACK_ITERATIONEN)
        .ok_or_else(|| CryptoError::KeyDerivation("Iterationen muessen > 0 sein".to_string()))?;

    // Eingabe: entity_id || 0x00 || geheimnis
    let mut eingabe = entity.speicher_id().into_bytes();
    eingabe.push(0);
    eingabe.extend_from_slice(master_secret.as_bytes());
    let eingabe = SecretBytes::new(eingabe);

    let mut key_bytes = vec![0u8; SCHLUESSEL_LAENGE];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterationen,
        FALLBACK_SALZ,
        eingabe.as_bytes(),
        &mut key_bytes,
    );

    Ok(GroupKey {
        entity,
        epoch: 0,
        key_bytes: SecretBytes::new(key_bytes),
        algorithm: GroupKeyAlgorithm::Aes256Gcm,
        herkunft: SchluesselHerkunft::Abgeleitet,
    })
}
