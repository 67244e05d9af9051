//! Nachrichten-Verschluesselung
//!
//! Verschluesselt einen Klartext mit dem Schluessel der Entity.
//!
//! ## Format
//! ```text
//! nonce(12) separat, ciphertext = [verschluesselter Inhalt + auth_tag(16)]
//! ```
//!
//! Die Nonce ist pro Aufruf frisch aus dem Betriebssystem-Zufall gezogen.
//! Als AAD dient die Speicherform der Entity-ID, damit ein Ciphertext nicht
//! unbemerkt in eine andere Konversation verschoben werden kann.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use huddle_core::EntityId;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{EncryptedPayload, GroupKey, GroupKeyAlgorithm, Nonce, SCHLUESSEL_LAENGE};

/// Verschluesselt einen Klartext mit dem Entity-Schluessel
pub fn encrypt_message(plaintext: &[u8], key: &GroupKey) -> CryptoResult<EncryptedPayload> {
    let nonce = Nonce::zufaellig();
    let aad = aad_fuer(&key.entity);

    let ciphertext = match key.algorithm {
        GroupKeyAlgorithm::Aes256Gcm => {
            encrypt_aes256gcm(plaintext, key.key_bytes.as_bytes(), nonce.as_bytes(), &aad)?
        }
        GroupKeyAlgorithm::ChaCha20Poly1305 => {
            encrypt_chacha20(plaintext, key.key_bytes.as_bytes(), nonce.as_bytes(), &aad)?
        }
    };

    Ok(EncryptedPayload { nonce, ciphertext })
}

/// AAD einer Nachricht: die Speicherform der Entity-ID
pub(crate) fn aad_fuer(entity: &EntityId) -> Vec<u8> {
    entity.speicher_id().into_bytes()
}

pub(crate) fn encrypt_aes256gcm(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; 12],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != SCHLUESSEL_LAENGE {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: key_bytes.len(),
        });
    }

    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = AesNonce::from_slice(nonce_bytes);

    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
}

fn encrypt_chacha20(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; 12],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != SCHLUESSEL_LAENGE {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: key_bytes.len(),
        });
    }

    let key = ChaChaKey::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);
    let nonce = ChaChaNonce::from_slice(nonce_bytes);

    cipher
        .encrypt(nonce, chacha20poly1305::aead::Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
