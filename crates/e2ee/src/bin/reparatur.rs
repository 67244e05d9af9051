//! Huddle Reparatur-Dienst – Einstiegspunkt
//!
//! Verschluesselt Nachrichten, die im degradierten Modus mit dem
//! Fallback-Schluessel geschrieben wurden, periodisch neu.

use std::sync::Arc;

use anyhow::Result;
use huddle_core::SystemUhr;
use huddle_db::SqliteDb;
use huddle_e2ee::{manager_aus_config, E2eeConfig, ReparaturTask};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("HD_CONFIG").unwrap_or_else(|_| "huddle.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = E2eeConfig::laden(&config_pfad)?;
    config.validieren()?;

    huddle_observability::logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Huddle Reparatur-Dienst wird initialisiert"
    );

    if !config.reparatur.aktiviert {
        tracing::info!("Reparatur ist deaktiviert, beende");
        return Ok(());
    }
    if !config.fallback.aktiviert {
        tracing::warn!("Fallback ist deaktiviert, abgeleitete Nachrichten koennen nicht gelesen werden");
    }

    let db = Arc::new(SqliteDb::oeffnen(&config.datenbank).await?);
    let uhr = Arc::new(SystemUhr);
    let manager = Arc::new(manager_aus_config(&config, db.clone(), uhr.clone())?);

    let task = ReparaturTask::neu(manager, db.clone(), uhr, &config.reparatur);
    task.starten();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Signal empfangen, fahre herunter");

    task.stoppen().await;
    db.schliessen().await;
    Ok(())
}
