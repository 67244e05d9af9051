//! Tests fuer den Aufbau auf der SQLite-Datenbank

use std::sync::Arc;

use chrono::Utc;
use huddle_core::{ChannelId, DeviceId, EntityId, SystemUhr, UserId};
use huddle_crypto::store::PublicKeyDirectory;
use huddle_crypto::{EncryptionVersion, Envelope, SpeicherIdentitaeten};
use huddle_db::SqliteDb;

use crate::aufbau::{geraet_einrichten, manager_aus_config};
use crate::config::{E2eeConfig, SchutzModus};
use crate::reparatur::ReparaturTask;

async fn test_db() -> Arc<SqliteDb> {
    Arc::new(SqliteDb::in_memory().await.expect("In-Memory-DB konnte nicht geoeffnet werden"))
}

fn test_config() -> E2eeConfig {
    let mut config = E2eeConfig::default();
    config.krypto.record_schutz = SchutzModus::Vertrauenswuerdig;
    config
}

#[tokio::test]
async fn test_geraet_einrichten_registriert_einmal() {
    let db = test_db().await;
    let identitaeten = SpeicherIdentitaeten::neu();
    let user = UserId::new();
    let device = DeviceId::new();
    let config = test_config();

    geraet_einrichten(&config, db.clone(), &identitaeten, Arc::new(SystemUhr), user, device)
        .await
        .unwrap();
    let erster = db.devices_of_user(user).await.unwrap();
    assert_eq!(erster.len(), 1);

    // Zweiter Start mit derselben Identitaet aendert nichts
    geraet_einrichten(&config, db.clone(), &identitaeten, Arc::new(SystemUhr), user, device)
        .await
        .unwrap();
    let zweiter = db.devices_of_user(user).await.unwrap();
    assert_eq!(erster, zweiter);
}

#[tokio::test]
async fn test_ende_zu_ende_ueber_sqlite() {
    let db = test_db().await;
    let config = test_config();
    let a_user = UserId::new();
    let b_user = UserId::new();
    let a_device = DeviceId::new();
    let b_device = DeviceId::new();

    let a = geraet_einrichten(
        &config,
        db.clone(),
        &SpeicherIdentitaeten::neu(),
        Arc::new(SystemUhr),
        a_user,
        a_device,
    )
    .await
    .unwrap();
    let c = EntityId::kanal(ChannelId::new());
    db.teilnehmer_hinzufuegen(c, a_device).await.unwrap();
    db.teilnehmer_hinzufuegen(c, b_device).await.unwrap();

    // B wird eingerichtet, nachdem A den Kanal schon nutzt
    let envelope = a.encrypt_for_entity(c, "hello").await.unwrap();
    let b = geraet_einrichten(
        &config,
        db.clone(),
        &SpeicherIdentitaeten::neu(),
        Arc::new(SystemUhr),
        b_user,
        b_device,
    )
    .await
    .unwrap();
    assert!(a.ensure_participant_has_key(c, b_device).await.unwrap().is_some());

    assert_eq!(b.decrypt_for_entity(c, &envelope).await.unwrap(), "hello");

    let bericht = a.rotate_entity_key(c).await.unwrap();
    assert_eq!(bericht.verteilt, vec![b_device]);
    let nachher = a.encrypt_for_entity(c, "nach der Rotation").await.unwrap();
    assert_eq!(
        b.decrypt_for_entity(c, &nachher).await.unwrap(),
        "nach der Rotation"
    );
}

#[tokio::test]
async fn test_migration_ueber_sqlite() {
    let db = test_db().await;
    let user = UserId::new();
    let service = geraet_einrichten(
        &test_config(),
        db.clone(),
        &SpeicherIdentitaeten::neu(),
        Arc::new(SystemUhr),
        user,
        DeviceId::new(),
    )
    .await
    .unwrap();
    let c = EntityId::kanal(ChannelId::new());
    let id = db
        .nachricht_speichern(c, user, &Envelope::klartext("alt"), Utc::now())
        .await
        .unwrap();

    assert_eq!(service.migrate_plaintext(user).await.unwrap().migriert, 1);
    assert_eq!(service.migrate_plaintext(user).await.unwrap().migriert, 0);

    let gespeichert = db.nachricht_laden(id).await.unwrap().unwrap();
    assert_eq!(gespeichert.envelope.version(), Some(EncryptionVersion::Kanonisch));
    assert_eq!(
        service.decrypt_for_entity(c, &gespeichert.envelope).await.unwrap(),
        "alt"
    );
}

#[tokio::test]
async fn test_manager_aus_config_mit_fallback() {
    let db = test_db().await;
    let mut config = test_config();
    config.fallback.aktiviert = true;
    config.fallback.geheimnis_env = "HD_TEST_FALLBACK_AUFBAU".into();

    std::env::remove_var("HD_TEST_FALLBACK_AUFBAU");
    assert!(manager_aus_config(&config, db.clone(), Arc::new(SystemUhr)).is_err());

    std::env::set_var("HD_TEST_FALLBACK_AUFBAU", "backend-geheimnis");
    let manager = Arc::new(manager_aus_config(&config, db.clone(), Arc::new(SystemUhr)).unwrap());
    std::env::remove_var("HD_TEST_FALLBACK_AUFBAU");

    // Abgeleitete Nachricht in der DB, danach Reparatur gegen SQLite
    let c = EntityId::kanal(ChannelId::new());
    let key = manager.fallback_key(c).unwrap();
    let payload = huddle_crypto::encrypt_message(b"degradiert", &key).unwrap();
    let id = db
        .nachricht_speichern(
            c,
            UserId::new(),
            &Envelope::aus_payload(&payload, key.version()),
            Utc::now(),
        )
        .await
        .unwrap();

    let task = ReparaturTask::neu(
        manager.clone(),
        db.clone(),
        Arc::new(SystemUhr),
        &config.reparatur,
    );
    let bericht = task.durchlauf().await.unwrap();
    assert_eq!(bericht.repariert, 1);

    let repariert = db.nachricht_laden(id).await.unwrap().unwrap();
    assert_eq!(repariert.envelope.version(), Some(EncryptionVersion::Kanonisch));
}

#[tokio::test]
async fn test_master_key_fehlt_ist_konfigurationsfehler() {
    let db = test_db().await;
    let mut config = E2eeConfig::default();
    config.krypto.master_key_env = "HD_TEST_MASTER_KEY_AUFBAU".into();
    std::env::remove_var("HD_TEST_MASTER_KEY_AUFBAU");

    let fehler = manager_aus_config(&config, db, Arc::new(SystemUhr)).unwrap_err();
    assert!(matches!(fehler, crate::error::E2eeError::Konfiguration(_)));
}
