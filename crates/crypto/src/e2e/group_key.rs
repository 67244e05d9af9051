//! Entity-Schluessel erzeugen und einwickeln
//!
//! Jede Entity (Kanal oder DM-Paar) hat einen symmetrischen 256-Bit-Schluessel.
//! Verlaesst der Schluessel das Geraet, wird er eingewickelt: fuer ein
//! Empfaenger-Geraet unter dessen X25519-Public-Key, fuer den Schluessel-Speicher
//! unter dem Master-Key (sofern der Speicher nicht voll vertrauenswuerdig ist).

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use huddle_core::EntityId;
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::e2e::decrypt::decrypt_aes256gcm;
use crate::e2e::encrypt::encrypt_aes256gcm;
use crate::e2e::key_exchange::hkdf_derive;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::IdentityKeyPair;
use crate::store::EntityKeyRecord;
use crate::types::{
    GroupKey, GroupKeyAlgorithm, Nonce as HuddleNonce, SchluesselHerkunft, SecretBytes,
    NONCE_LAENGE, SCHLUESSEL_LAENGE, TAG_LAENGE,
};

const WRAP_INFO: &[u8] = b"huddle-key-wrap-v1";

/// Erstellt einen neuen zufaelligen Schluessel fuer eine Entity
pub fn create_group_key(entity: EntityId, epoch: u64, algorithm: GroupKeyAlgorithm) -> GroupKey {
    GroupKey {
        entity,
        epoch,
        key_bytes: SecretBytes::zufaellig(SCHLUESSEL_LAENGE),
        algorithm,
        herkunft: SchluesselHerkunft::Kanonisch,
    }
}

/// Erzeugt den Nachfolger eines Schluessels (Epoch + 1, neue Bytes)
pub fn rotate_group_key(current: &GroupKey) -> GroupKey {
    create_group_key(current.entity, current.epoch + 1, current.algorithm)
}

/// Prueft Laenge und Inhalt eines ausgepackten Schluessels
fn schluessel_validieren(bytes: &[u8]) -> CryptoResult<()> {
    if bytes.len() != SCHLUESSEL_LAENGE {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: bytes.len(),
        });
    }
    if bytes.iter().all(|b| *b == 0) {
        return Err(CryptoError::SchluesselFormat(
            "Schluessel besteht nur aus Nullbytes".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Einwickeln fuer ein Empfaenger-Geraet
// ---------------------------------------------------------------------------

/// Verschluesselt einen Entity-Schluessel mit dem oeffentlichen X25519-Schluessel
/// eines Empfaenger-Geraets.
///
/// ECIES-aehnliches Schema:
/// 1. Ephemeres X25519-Schluessel-Paar generieren
/// 2. DH mit Empfaenger-Public-Key
/// 3. HKDF -> Wrapping Key
/// 4. AES-256-GCM verschluesseln (AAD = Entity-ID)
///
/// Output: `[ephemeral_public(32)] + [nonce(12)] + [ciphertext]`
pub fn wrap_key_for_recipient(
    group_key: &GroupKey,
    recipient_public_key: &[u8; 32],
) -> CryptoResult<Vec<u8>> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);

    let recipient_pk = X25519PublicKey::from(*recipient_public_key);
    let dh_output = ephemeral_secret.diffie_hellman(&recipient_pk);

    let wrapping_key = hkdf_derive(dh_output.as_bytes(), recipient_public_key, WRAP_INFO, 32)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&wrapping_key));
    let nonce = HuddleNonce::zufaellig();
    let aad = group_key.entity.speicher_id();

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: group_key.key_bytes.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut out = Vec::with_capacity(32 + NONCE_LAENGE + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(nonce.as_bytes());
    out.extend_from_slice(&ciphertext);

    Ok(out)
}

/// Packt einen eingewickelten Schluessel mit der eigenen Geraete-Identitaet aus
///
/// Jeder Fehler (falsches Geraet, korrupter Blob) ist ein dauerhafter
/// `CryptoError::Unwrap`.
pub fn unwrap_key_for_recipient(
    wrapped: &[u8],
    identity: &IdentityKeyPair,
    entity: EntityId,
    epoch: u64,
    algorithm: GroupKeyAlgorithm,
) -> CryptoResult<GroupKey> {
    if wrapped.len() < 32 + NONCE_LAENGE + TAG_LAENGE {
        return Err(CryptoError::Unwrap("Zu kurzer wrapped key".to_string()));
    }

    let (ephemeral_pub, rest) = wrapped.split_at(32);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LAENGE);
    let ephemeral_pub: [u8; 32] = ephemeral_pub
        .try_into()
        .map_err(|_| CryptoError::Unwrap("Ungueltiger ephemerer Schluessel".to_string()))?;

    let dh_output = identity.diffie_hellman(&ephemeral_pub);
    let wrapping_key = hkdf_derive(
        dh_output.as_bytes(),
        &identity.public_key_bytes(),
        WRAP_INFO,
        32,
    )?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&wrapping_key));
    let aad = entity.speicher_id();
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::Unwrap(e.to_string()))?;

    let key_bytes = SecretBytes::new(plaintext);
    schluessel_validieren(key_bytes.as_bytes())?;

    Ok(GroupKey {
        entity,
        epoch,
        key_bytes,
        algorithm,
        herkunft: SchluesselHerkunft::Kanonisch,
    })
}

// ---------------------------------------------------------------------------
// Schutz des persistierten Records
// ---------------------------------------------------------------------------

/// Wie der Schluessel im `EntityKeyStore` abgelegt wird
#[derive(Debug, Clone)]
pub enum RecordSchutz {
    /// Speicher ist voll vertrauenswuerdig (z.B. lokaler, verschluesselter Tresor)
    Vertrauenswuerdig,
    /// Schluessel wird unter diesem Master-Key eingewickelt
    MasterKey(SecretBytes),
}

fn record_aad(entity: &EntityId, epoch: u64) -> Vec<u8> {
    let mut aad = entity.speicher_id().into_bytes();
    aad.extend_from_slice(&epoch.to_be_bytes());
    aad
}

/// Baut den persistierbaren Record zu einem Schluessel
pub fn record_aus_schluessel(
    key: &GroupKey,
    schutz: &RecordSchutz,
    created_at: DateTime<Utc>,
) -> CryptoResult<EntityKeyRecord> {
    let material = match schutz {
        RecordSchutz::Vertrauenswuerdig => key.key_bytes.as_bytes().to_vec(),
        RecordSchutz::MasterKey(master) => {
            let nonce = HuddleNonce::zufaellig();
            let ciphertext = encrypt_aes256gcm(
                key.key_bytes.as_bytes(),
                master.as_bytes(),
                nonce.as_bytes(),
                &record_aad(&key.entity, key.epoch),
            )?;
            let mut out = Vec::with_capacity(NONCE_LAENGE + ciphertext.len());
            out.extend_from_slice(nonce.as_bytes());
            out.extend_from_slice(&ciphertext);
            out
        }
    };

    Ok(EntityKeyRecord {
        entity: key.entity,
        wrapped_key: STANDARD.encode(material),
        epoch: key.epoch,
        algorithm: key.algorithm,
        created_at,
    })
}

/// Stellt den Schluessel aus einem persistierten Record wieder her
pub fn schluessel_aus_record(
    record: &EntityKeyRecord,
    schutz: &RecordSchutz,
) -> CryptoResult<GroupKey> {
    let material = STANDARD
        .decode(&record.wrapped_key)
        .map_err(|e| CryptoError::SchluesselFormat(format!("Record {}: {e}", record.entity)))?;

    let key_bytes = match schutz {
        RecordSchutz::Vertrauenswuerdig => material,
        RecordSchutz::MasterKey(master) => {
            if material.len() < NONCE_LAENGE + TAG_LAENGE {
                return Err(CryptoError::Unwrap(format!(
                    "Record {} zu kurz",
                    record.entity
                )));
            }
            let (nonce, ciphertext) = material.split_at(NONCE_LAENGE);
            let nonce = HuddleNonce::aus_slice(nonce)?;
            decrypt_aes256gcm(
                ciphertext,
                master.as_bytes(),
                nonce.as_bytes(),
                &record_aad(&record.entity, record.epoch),
            )
            .map_err(|e| CryptoError::Unwrap(format!("Record {}: {e}", record.entity)))?
        }
    };

    let key_bytes = SecretBytes::new(key_bytes);
    schluessel_validieren(key_bytes.as_bytes())?;

    Ok(GroupKey {
        entity: record.entity,
        epoch: record.epoch,
        key_bytes,
        algorithm: record.algorithm,
        herkunft: SchluesselHerkunft::Kanonisch,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
