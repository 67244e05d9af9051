//! Integration-Tests fuer den Nachrichten-Speicher

use chrono::{Duration, Utc};
use huddle_core::{ChannelId, EntityId, UserId};
use huddle_crypto::store::MessageStore;
use huddle_crypto::{
    create_group_key, derive_fallback_key, encrypt_message, EncryptionVersion, Envelope,
    GroupKeyAlgorithm, SecretBytes,
};
use huddle_db::SqliteDb;

async fn db() -> SqliteDb {
    SqliteDb::in_memory().await.expect("In-Memory DB konnte nicht erstellt werden")
}

fn verschluesselt(entity: EntityId, text: &str) -> Envelope {
    let key = create_group_key(entity, 0, GroupKeyAlgorithm::Aes256Gcm);
    let payload = encrypt_message(text.as_bytes(), &key).unwrap();
    Envelope::aus_payload(&payload, key.version())
}

#[tokio::test]
async fn nachricht_speichern_und_laden() {
    let db = db().await;
    let entity = EntityId::kanal(ChannelId::new());
    let sender = UserId::new();
    let envelope = verschluesselt(entity, "hallo");

    let id = db
        .nachricht_speichern(entity, sender, &envelope, Utc::now())
        .await
        .unwrap();
    let geladen = db.nachricht_laden(id).await.unwrap().unwrap();

    assert_eq!(geladen.id, id);
    assert_eq!(geladen.entity, entity);
    assert_eq!(geladen.sender, sender);
    assert_eq!(geladen.envelope, envelope);
}

#[tokio::test]
async fn klartext_nach_absender() {
    let db = db().await;
    let entity = EntityId::kanal(ChannelId::new());
    let alice = UserId::new();
    let bob = UserId::new();
    let jetzt = Utc::now();

    db.nachricht_speichern(entity, alice, &Envelope::klartext("eins"), jetzt)
        .await
        .unwrap();
    db.nachricht_speichern(entity, alice, &Envelope::klartext("zwei"), jetzt + Duration::seconds(1))
        .await
        .unwrap();
    db.nachricht_speichern(entity, alice, &verschluesselt(entity, "geheim"), jetzt)
        .await
        .unwrap();
    db.nachricht_speichern(entity, bob, &Envelope::klartext("bob"), jetzt)
        .await
        .unwrap();

    let klartext = db.plaintext_messages_of(alice).await.unwrap();
    assert_eq!(klartext.len(), 2);
    assert_eq!(klartext[0].envelope, Envelope::klartext("eins"));
    assert_eq!(klartext[1].envelope, Envelope::klartext("zwei"));
}

#[tokio::test]
async fn suche_nach_version_mit_limit() {
    let db = db().await;
    let entity = EntityId::kanal(ChannelId::new());
    let sender = UserId::new();
    let abgeleitet = derive_fallback_key(entity, &SecretBytes::new(b"s".to_vec())).unwrap();

    for i in 0..3 {
        let payload = encrypt_message(format!("notfall {i}").as_bytes(), &abgeleitet).unwrap();
        db.nachricht_speichern(
            entity,
            sender,
            &Envelope::aus_payload(&payload, abgeleitet.version()),
            Utc::now() + Duration::seconds(i),
        )
        .await
        .unwrap();
    }
    db.nachricht_speichern(entity, sender, &verschluesselt(entity, "normal"), Utc::now())
        .await
        .unwrap();

    let gefunden = db
        .messages_with_version(EncryptionVersion::Abgeleitet, None, 2)
        .await
        .unwrap();
    assert_eq!(gefunden.len(), 2);
    assert!(gefunden
        .iter()
        .all(|n| n.envelope.version() == Some(EncryptionVersion::Abgeleitet)));

    // Naechste Seite beginnt hinter der letzten Nachricht
    let rest = db
        .messages_with_version(EncryptionVersion::Abgeleitet, Some(gefunden[1].cursor()), 2)
        .await
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert!(rest[0].cursor() > gefunden[1].cursor());

    let kanonisch = db
        .messages_with_version(EncryptionVersion::Kanonisch, None, 10)
        .await
        .unwrap();
    assert_eq!(kanonisch.len(), 1);
}

#[tokio::test]
async fn cursor_bei_gleichem_zeitstempel() {
    let db = db().await;
    let entity = EntityId::kanal(ChannelId::new());
    let abgeleitet = derive_fallback_key(entity, &SecretBytes::new(b"s".to_vec())).unwrap();
    let zeitpunkt = Utc::now();

    for i in 0..3 {
        let payload = encrypt_message(format!("gleichzeitig {i}").as_bytes(), &abgeleitet).unwrap();
        db.nachricht_speichern(
            entity,
            UserId::new(),
            &Envelope::aus_payload(&payload, abgeleitet.version()),
            zeitpunkt,
        )
        .await
        .unwrap();
    }

    let mut gesehen = Vec::new();
    let mut cursor = None;
    loop {
        let seite = db
            .messages_with_version(EncryptionVersion::Abgeleitet, cursor, 1)
            .await
            .unwrap();
        let Some(letzte) = seite.last() else { break };
        cursor = Some(letzte.cursor());
        gesehen.extend(seite.iter().map(|n| n.id));
        assert!(gesehen.len() <= 3, "Cursor wiederholt Nachrichten");
    }
    assert_eq!(gesehen.len(), 3);
    gesehen.sort();
    gesehen.dedup();
    assert_eq!(gesehen.len(), 3);
}

#[tokio::test]
async fn envelope_ersetzen_ist_compare_and_set() {
    let db = db().await;
    let entity = EntityId::kanal(ChannelId::new());
    let sender = UserId::new();
    let original = Envelope::klartext("vorher");
    let id = db
        .nachricht_speichern(entity, sender, &original, Utc::now())
        .await
        .unwrap();

    let neu = verschluesselt(entity, "vorher");
    assert!(db.replace_if_envelope(id, &original, &neu).await.unwrap());

    // Zweiter Versuch mit veraltetem Erwartungswert aendert nichts
    let anderes = verschluesselt(entity, "vorher");
    assert!(!db.replace_if_envelope(id, &original, &anderes).await.unwrap());

    let geladen = db.nachricht_laden(id).await.unwrap().unwrap();
    assert_eq!(geladen.envelope, neu);
    assert!(db.plaintext_messages_of(sender).await.unwrap().is_empty());
}
