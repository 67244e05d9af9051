//! E2E Verschluesselung (End-to-End)
//!
//! Geraet <-> Geraet Verschluesselung. Speicher und Relay sehen nur
//! Ciphertext, Nonce und eingewickelte Schluessel.
//!
//! ## Ablauf
//! 1. Jedes Geraet hat eine `IdentityKeyPair` (X25519 Langzeit-Key)
//! 2. Pro Entity (Kanal oder DM-Paar) existiert genau ein kanonischer Schluessel
//! 3. Der Schluessel wird pro Empfaenger-Geraet eingewickelt und zugestellt
//! 4. Nachrichten werden mit dem Entity-Schluessel (AES-256-GCM) verschluesselt
//! 5. Rotation ersetzt den Schluessel (neue Epoch) und verteilt ihn neu
//! 6. Ohne erreichbaren Speicher: abgeleiteter Ersatzschluessel (degradiert)

pub mod decrypt;
pub mod encrypt;
pub mod fallback;
pub mod group_key;
pub mod key_exchange;
pub mod key_manager;
pub mod rotation;

pub use decrypt::{decrypt_message, decrypt_text};
pub use encrypt::encrypt_message;
pub use fallback::derive_fallback_key;
pub use group_key::{
    create_group_key, record_aus_schluessel, rotate_group_key, schluessel_aus_record,
    unwrap_key_for_recipient, wrap_key_for_recipient, RecordSchutz,
};
pub use key_exchange::{hkdf_derive, Empfangsergebnis, KeyExchange};
pub use key_manager::{GroupKeyManager, RotationsErgebnis};
pub use rotation::{rotate_identity, RotationsBericht, SchluesselRotation};
