//! Integration-Tests fuer Oeffnen, Schema-Pruefung und Schliessen

use huddle_db::{DatabaseConfig, DbError, SqliteDb};

#[tokio::test]
async fn datei_datenbank_mit_busy_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("e2ee.db").display()),
        busy_timeout_ms: 250,
        ..Default::default()
    };

    let db = SqliteDb::oeffnen(&config).await.unwrap();
    assert!(db.erreichbar().await);
    db.schema_pruefen().await.unwrap();

    // Zweites Oeffnen wendet keine Migration doppelt an
    db.schliessen().await;
    let db = SqliteDb::oeffnen(&config).await.unwrap();
    db.schema_pruefen().await.unwrap();
}

#[tokio::test]
async fn fehlende_tabelle_wird_gemeldet() {
    let db = SqliteDb::in_memory().await.unwrap();
    sqlx::query("DROP TABLE wrapped_keys")
        .execute(db.pool())
        .await
        .unwrap();

    let fehler = db.schema_pruefen().await.unwrap_err();
    assert!(matches!(&fehler, DbError::Intern(msg) if msg.contains("wrapped_keys")));
}

#[tokio::test]
async fn geschlossene_datenbank_ist_nicht_erreichbar() {
    let db = SqliteDb::in_memory().await.unwrap();
    assert!(db.erreichbar().await);

    db.schliessen().await;
    assert!(!db.erreichbar().await);
}
