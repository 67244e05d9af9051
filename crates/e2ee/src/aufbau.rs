//! Aufbau des Subsystems aus der Konfiguration

use std::sync::Arc;

use huddle_core::{DeviceId, Uhr, UserId};
use huddle_crypto::e2e::{GroupKeyManager, KeyExchange};
use huddle_crypto::store::{DeviceRecord, EntityKeyStore, PublicKeyDirectory};
use huddle_crypto::{load_or_generate, CryptoError, IdentitaetsSpeicher};
use huddle_db::SqliteDb;
use tracing::info;

use crate::config::E2eeConfig;
use crate::error::{E2eeError, E2eeResult};
use crate::service::E2eeService;

/// Baut den GroupKeyManager (Algorithmus, Record-Schutz, Fallback)
pub fn manager_aus_config(
    config: &E2eeConfig,
    store: Arc<dyn EntityKeyStore>,
    uhr: Arc<dyn Uhr>,
) -> E2eeResult<GroupKeyManager> {
    let schutz = config
        .record_schutz()
        .map_err(|e| E2eeError::Konfiguration(e.to_string()))?;

    let mut manager = GroupKeyManager::new(store, schutz)
        .with_algorithm(config.krypto.algorithmus)
        .with_uhr(uhr);

    if let Some(geheimnis) = config
        .fallback_geheimnis()
        .map_err(|e| E2eeError::Konfiguration(e.to_string()))?
    {
        manager = manager.with_fallback(geheimnis);
    }
    Ok(manager)
}

/// Richtet das lokale Geraet ein und baut den Service auf der Datenbank
///
/// Laedt die Geraete-Identitaet (oder erzeugt sie) und traegt den Public Key
/// ins Verzeichnis ein, falls er dort fehlt oder abweicht.
pub async fn geraet_einrichten(
    config: &E2eeConfig,
    db: Arc<SqliteDb>,
    identitaeten: &dyn IdentitaetsSpeicher,
    uhr: Arc<dyn Uhr>,
    user: UserId,
    device: DeviceId,
) -> E2eeResult<Arc<E2eeService>> {
    let (identitaet, neu) = load_or_generate(identitaeten, user).await?;
    let public_key = identitaet.export_public();

    let registriert = match db.get_public_key(device).await {
        Ok(vorhanden) => vorhanden == public_key,
        Err(CryptoError::KeinSchluessel(_)) => false,
        Err(e) => return Err(e.into()),
    };
    if !registriert {
        db.register_device(&DeviceRecord {
            user_id: user,
            device_id: device,
            public_key,
            created_at: uhr.jetzt(),
            rotated_at: None,
        })
        .await?;
        info!(user = %user, device = %device, neue_identitaet = neu, "Geraet registriert");
    }

    let manager = Arc::new(manager_aus_config(config, db.clone(), uhr)?);
    let exchange = Arc::new(KeyExchange::new(
        manager,
        db.clone(),
        db.clone(),
        identitaet,
        device,
    ));
    Ok(E2eeService::neu(exchange, db.clone(), db))
}
