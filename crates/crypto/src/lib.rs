//! # huddle-crypto
//!
//! Ende-zu-Ende-Verschluesselung fuer Huddle.
//!
//! ## Module
//! - `identity` - X25519 Geraete-Identitaet und lokaler Schluessel-Speicher
//! - `e2e` - Nachrichten-Cipher, Schluessel-Verwaltung, Austausch, Rotation
//! - `envelope` - Gespeicherte Form einer Nachricht (verschluesselt oder Klartext)
//! - `store` - Kollaborateur-Traits und In-Memory-Implementierungen
//! - `types` - Gemeinsame Typen (Nonce, GroupKey, SecretBytes, etc.)
//! - `error` - Fehlertypen

pub mod e2e;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod store;
pub mod types;

// Bequeme Re-Exports
pub use envelope::Envelope;
pub use error::{CryptoError, CryptoResult};
pub use identity::{
    export_public_key, import_public_key, load_or_generate, DateiIdentitaeten,
    IdentitaetsSpeicher, IdentityKeyPair, SpeicherIdentitaeten,
};
pub use types::{
    EncryptedPayload, EncryptionVersion, GroupKey, GroupKeyAlgorithm, Nonce, SchluesselHerkunft,
    SecretBytes,
};

pub use e2e::{
    create_group_key, decrypt_message, decrypt_text, derive_fallback_key, encrypt_message,
    hkdf_derive, rotate_identity, unwrap_key_for_recipient, wrap_key_for_recipient,
    Empfangsergebnis, GroupKeyManager, KeyExchange, RecordSchutz, RotationsBericht,
    SchluesselRotation,
};
