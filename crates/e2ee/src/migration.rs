//! Migration von Klartext-Altbestand
//!
//! Jede Nachricht wird einzeln per Compare-and-Set ersetzt: entweder ist sie
//! danach vollstaendig verschluesselt oder unveraendert. Ein zweiter Lauf
//! findet keinen Klartext mehr und aendert nichts.

use huddle_core::UserId;
use huddle_crypto::e2e::{encrypt_message, GroupKeyManager};
use huddle_crypto::store::{MessageStore, StoredMessage};
use huddle_crypto::Envelope;
use tracing::{info, warn};

use crate::error::E2eeResult;

/// Ergebnis eines Migrationslaufs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationsBericht {
    pub migriert: usize,
    /// Zwischenzeitlich von anderer Stelle geaendert
    pub uebersprungen: usize,
    pub fehlgeschlagen: usize,
}

/// Verschluesselt alle Klartext-Nachrichten eines Absenders
pub async fn migrate_plaintext(
    manager: &GroupKeyManager,
    nachrichten: &dyn MessageStore,
    user: UserId,
) -> E2eeResult<MigrationsBericht> {
    let offen = nachrichten.plaintext_messages_of(user).await?;
    let mut bericht = MigrationsBericht::default();

    for nachricht in &offen {
        match nachricht_migrieren(manager, nachrichten, nachricht).await {
            Ok(true) => bericht.migriert += 1,
            Ok(false) => bericht.uebersprungen += 1,
            Err(e) => {
                warn!(
                    nachricht = %nachricht.id,
                    entity = %nachricht.entity,
                    fehler = %e,
                    "Migration einer Nachricht fehlgeschlagen"
                );
                bericht.fehlgeschlagen += 1;
            }
        }
    }

    if !offen.is_empty() {
        info!(
            user = %user,
            migriert = bericht.migriert,
            uebersprungen = bericht.uebersprungen,
            fehlgeschlagen = bericht.fehlgeschlagen,
            "Klartext-Migration abgeschlossen"
        );
    }
    Ok(bericht)
}

async fn nachricht_migrieren(
    manager: &GroupKeyManager,
    nachrichten: &dyn MessageStore,
    nachricht: &StoredMessage,
) -> E2eeResult<bool> {
    let Envelope::Klartext { content } = &nachricht.envelope else {
        return Ok(false);
    };

    let key = manager.get_or_create_key(nachricht.entity).await?;
    let payload = encrypt_message(content.as_bytes(), &key)?;
    let neu = Envelope::aus_payload(&payload, key.version());

    Ok(nachrichten
        .replace_if_envelope(nachricht.id, &nachricht.envelope, &neu)
        .await?)
}
