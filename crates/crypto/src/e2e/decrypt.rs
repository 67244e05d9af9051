//! Nachrichten-Entschluesselung
//!
//! Verifiziert dabei den Auth-Tag und die AAD (Entity-ID). Jeder Fehler
//! wird zu `CryptoError::Entschluesselung`; es wird nie ein verfaelschter
//! Klartext zurueckgegeben.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};

use crate::e2e::encrypt::aad_fuer;
use crate::error::{CryptoError, CryptoResult};
use crate::types::{EncryptedPayload, GroupKey, GroupKeyAlgorithm, SCHLUESSEL_LAENGE};

/// Entschluesselt einen Payload mit dem Entity-Schluessel
pub fn decrypt_message(payload: &EncryptedPayload, key: &GroupKey) -> CryptoResult<Vec<u8>> {
    let aad = aad_fuer(&key.entity);

    match key.algorithm {
        GroupKeyAlgorithm::Aes256Gcm => decrypt_aes256gcm(
            &payload.ciphertext,
            key.key_bytes.as_bytes(),
            payload.nonce.as_bytes(),
            &aad,
        ),
        GroupKeyAlgorithm::ChaCha20Poly1305 => decrypt_chacha20(
            &payload.ciphertext,
            key.key_bytes.as_bytes(),
            payload.nonce.as_bytes(),
            &aad,
        ),
    }
}

/// Entschluesselt und prueft auf gueltiges UTF-8
pub fn decrypt_text(payload: &EncryptedPayload, key: &GroupKey) -> CryptoResult<String> {
    let bytes = decrypt_message(payload, key)?;
    String::from_utf8(bytes)
        .map_err(|_| CryptoError::Entschluesselung("Klartext ist kein UTF-8".to_string()))
}

pub(crate) fn decrypt_aes256gcm(
    ciphertext: &[u8],
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
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

fn decrypt_chacha20(
    ciphertext: &[u8],
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
        .decrypt(
            nonce,
            chacha20poly1305::aead::Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e2e::encrypt::encrypt_message;
    use crate::e2e::group_key::create_group_key;
    use huddle_core::{ChannelId, EntityId, UserId};

    fn kanal() -> EntityId {
        EntityId::kanal(ChannelId::new())
    }

    #[test]
    fn roundtrip_aes256gcm() {
        let key = create_group_key(kanal(), 0, GroupKeyAlgorithm::Aes256Gcm);
        let plaintext = "Hallo zusammen – äöü 🎉";

        let payload = encrypt_message(plaintext.as_bytes(), &key).unwrap();
        assert_eq!(decrypt_text(&payload, &key).unwrap(), plaintext);
    }

    #[test]
    fn roundtrip_chacha20() {
        let key = create_group_key(kanal(), 0, GroupKeyAlgorithm::ChaCha20Poly1305);
        let payload = encrypt_message(b"ChaCha-Text", &key).unwrap();
        assert_eq!(decrypt_message(&payload, &key).unwrap(), b"ChaCha-Text");
    }

    #[test]
    fn roundtrip_verschiedene_laengen() {
        let key = create_group_key(kanal(), 0, GroupKeyAlgorithm::Aes256Gcm);
        for len in [0usize, 1, 15, 16, 17, 255, 4096, 65_537] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let payload = encrypt_message(&plaintext, &key).unwrap();
            assert_eq!(decrypt_message(&payload, &key).unwrap(), plaintext, "len={len}");
        }
    }

    #[test]
    fn falscher_schluessel_schlaegt_fehl() {
        let entity = kanal();
        let key1 = create_group_key(entity, 0, GroupKeyAlgorithm::Aes256Gcm);
        let key2 = create_group_key(entity, 0, GroupKeyAlgorithm::Aes256Gcm);

        let payload = encrypt_message(b"Geheim", &key1).unwrap();
        assert!(matches!(
            decrypt_message(&payload, &key2),
            Err(CryptoError::Entschluesselung(_))
        ));
    }

    #[test]
    fn jedes_gekippte_byte_wird_erkannt() {
        let key = create_group_key(kanal(), 0, GroupKeyAlgorithm::Aes256Gcm);
        let payload = encrypt_message(b"Original-Nachricht", &key).unwrap();

        for i in 0..payload.ciphertext.len() {
            let mut manipuliert = payload.clone();
            manipuliert.ciphertext[i] ^= 0x01;
            assert!(
                matches!(
                    decrypt_message(&manipuliert, &key),
                    Err(CryptoError::Entschluesselung(_))
                ),
                "Byte {i} manipuliert, trotzdem entschluesselt"
            );
        }
    }

    #[test]
    fn manipulierte_nonce_schlaegt_fehl() {
        let key = create_group_key(kanal(), 0, GroupKeyAlgorithm::ChaCha20Poly1305);
        let mut payload = encrypt_message(b"Nachricht", &key).unwrap();
        payload.nonce.bytes[0] ^= 0xFF;
        assert!(decrypt_message(&payload, &key).is_err());
    }

    #[test]
    fn ciphertext_gehoert_zur_entity() {
        let key = create_group_key(kanal(), 0, GroupKeyAlgorithm::Aes256Gcm);
        let payload = encrypt_message(b"nur hier", &key).unwrap();

        // Gleiche Schluessel-Bytes, aber andere Entity -> AAD stimmt nicht
        let mut fremd = key.clone();
        fremd.entity = EntityId::direkt(UserId::new(), UserId::new());
        assert!(decrypt_message(&payload, &fremd).is_err());
    }

    #[test]
    fn abgeschnittener_ciphertext_schlaegt_fehl() {
        let key = create_group_key(kanal(), 0, GroupKeyAlgorithm::Aes256Gcm);
        let mut payload = encrypt_message(b"abc", &key).unwrap();
        payload.ciphertext.truncate(5);
        assert!(decrypt_message(&payload, &key).is_err());
    }
}
