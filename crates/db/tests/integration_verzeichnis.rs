//! Integration-Tests fuer Geraete-Verzeichnis, Postfach und Teilnehmer

use chrono::{Duration, TimeZone, Utc};
use huddle_core::{ChannelId, DeviceId, EntityId, UserId};
use huddle_crypto::store::{
    DeviceRecord, KeyMailbox, ParticipantDirectory, PublicKeyDirectory, WrappedKey,
};
use huddle_crypto::{CryptoError, GroupKeyAlgorithm, IdentityKeyPair};
use huddle_db::SqliteDb;

async fn db() -> SqliteDb {
    SqliteDb::in_memory().await.expect("In-Memory DB konnte nicht erstellt werden")
}

fn geraet(user: UserId, minute: u32) -> DeviceRecord {
    DeviceRecord {
        user_id: user,
        device_id: DeviceId::new(),
        public_key: IdentityKeyPair::generate().export_public(),
        created_at: Utc.with_ymd_and_hms(2026, 5, 1, 10, minute, 0).unwrap(),
        rotated_at: None,
    }
}

fn wrapped(entity: EntityId, device: DeviceId, epoch: u64, blob: &str) -> WrappedKey {
    WrappedKey {
        entity,
        device,
        epoch,
        algorithm: GroupKeyAlgorithm::Aes256Gcm,
        blob: blob.into(),
    }
}

#[tokio::test]
async fn geraete_registrieren_und_laden() {
    let db = db().await;
    let user = UserId::new();
    let spaet = geraet(user, 30);
    let frueh = geraet(user, 5);
    db.register_device(&spaet).await.unwrap();
    db.register_device(&frueh).await.unwrap();
    db.register_device(&geraet(UserId::new(), 0)).await.unwrap();

    let geraete = db.devices_of_user(user).await.unwrap();
    assert_eq!(geraete, vec![frueh.clone(), spaet]);
    assert_eq!(
        db.get_public_key(frueh.device_id).await.unwrap(),
        frueh.public_key
    );
}

#[tokio::test]
async fn unbekanntes_geraet() {
    let db = db().await;
    let result = db.get_public_key(DeviceId::new()).await;
    assert!(matches!(result, Err(CryptoError::KeinSchluessel(_))));

    let result = db
        .update_public_key(DeviceId::new(), "AAAA", Utc::now())
        .await;
    assert!(matches!(result, Err(CryptoError::KeinSchluessel(_))));
}

#[tokio::test]
async fn public_key_rotation() {
    let db = db().await;
    let record = geraet(UserId::new(), 0);
    db.register_device(&record).await.unwrap();

    let neu = IdentityKeyPair::generate().export_public();
    let zeitpunkt = record.created_at + Duration::days(30);
    db.update_public_key(record.device_id, &neu, zeitpunkt)
        .await
        .unwrap();

    let geladen = &db.devices_of_user(record.user_id).await.unwrap()[0];
    assert_eq!(geladen.public_key, neu);
    assert_eq!(geladen.rotated_at, Some(zeitpunkt));
    assert_eq!(geladen.created_at, record.created_at);
}

#[tokio::test]
async fn postfach_ersetzt_und_leert() {
    let db = db().await;
    let device = DeviceId::new();
    let kanal = EntityId::kanal(ChannelId::new());
    let dm = EntityId::direkt(UserId::new(), UserId::new());

    db.deliver(&wrapped(kanal, device, 0, "alt")).await.unwrap();
    db.deliver(&wrapped(kanal, device, 1, "neu")).await.unwrap();
    db.deliver(&wrapped(dm, device, 0, "dm")).await.unwrap();
    db.deliver(&wrapped(kanal, DeviceId::new(), 0, "fremd")).await.unwrap();

    let mut ausstehend = db.take_for_device(device).await.unwrap();
    ausstehend.sort_by_key(|w| w.blob.clone());
    assert_eq!(ausstehend.len(), 2);
    assert_eq!(ausstehend[0].blob, "dm");
    assert_eq!(ausstehend[1].blob, "neu");
    assert_eq!(ausstehend[1].epoch, 1);

    // Zweites Abholen ist leer
    assert!(db.take_for_device(device).await.unwrap().is_empty());
}

#[tokio::test]
async fn postfach_behaelt_hoehere_epoch() {
    let db = db().await;
    let device = DeviceId::new();
    let kanal = EntityId::kanal(ChannelId::new());

    db.deliver(&wrapped(kanal, device, 2, "neu")).await.unwrap();
    db.deliver(&wrapped(kanal, device, 1, "zurueckgelegt")).await.unwrap();

    let ausstehend = db.take_for_device(device).await.unwrap();
    assert_eq!(ausstehend.len(), 1);
    assert_eq!(ausstehend[0].blob, "neu");
    assert_eq!(ausstehend[0].epoch, 2);
}

#[tokio::test]
async fn teilnehmer_verwalten() {
    let db = db().await;
    let entity = EntityId::kanal(ChannelId::new());
    let a = DeviceId::new();
    let b = DeviceId::new();

    db.teilnehmer_hinzufuegen(entity, a).await.unwrap();
    db.teilnehmer_hinzufuegen(entity, b).await.unwrap();
    db.teilnehmer_hinzufuegen(entity, a).await.unwrap();

    let teilnehmer = db.participants(&entity).await.unwrap();
    assert_eq!(teilnehmer.len(), 2);
    assert!(teilnehmer.contains(&a) && teilnehmer.contains(&b));

    assert!(db.teilnehmer_entfernen(entity, a).await.unwrap());
    assert!(!db.teilnehmer_entfernen(entity, a).await.unwrap());
    assert_eq!(db.participants(&entity).await.unwrap(), vec![b]);
}
