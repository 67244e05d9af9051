//! SQLite-Implementierung des Teilnehmer-Verzeichnisses

use async_trait::async_trait;
use chrono::Utc;
use huddle_core::{DeviceId, EntityId};
use huddle_crypto::store::ParticipantDirectory;
use huddle_crypto::CryptoResult;
use sqlx::Row as _;

use crate::error::DbResult;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{parse_uuid, zeit_text};

impl SqliteDb {
    /// Fuegt ein Geraet als Teilnehmer hinzu (idempotent)
    pub async fn teilnehmer_hinzufuegen(&self, entity: EntityId, device: DeviceId) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO participants (entity_id, device_id, added_at)
             VALUES (?, ?, ?)
             ON CONFLICT(entity_id, device_id) DO NOTHING",
        )
        .bind(entity.speicher_id())
        .bind(device.inner().to_string())
        .bind(zeit_text(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entfernt ein Geraet; gibt `false` zurueck wenn es kein Teilnehmer war
    pub async fn teilnehmer_entfernen(&self, entity: EntityId, device: DeviceId) -> DbResult<bool> {
        let affected = sqlx::query("DELETE FROM participants WHERE entity_id = ? AND device_id = ?")
            .bind(entity.speicher_id())
            .bind(device.inner().to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn teilnehmer_laden(&self, entity: &EntityId) -> DbResult<Vec<DeviceId>> {
        let rows = sqlx::query(
            "SELECT device_id FROM participants WHERE entity_id = ? ORDER BY added_at ASC",
        )
        .bind(entity.speicher_id())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let device: String = r.try_get("device_id")?;
                Ok(DeviceId(parse_uuid(&device, "device_id")?))
            })
            .collect()
    }
}

#[async_trait]
impl ParticipantDirectory for SqliteDb {
    async fn participants(&self, entity: &EntityId) -> CryptoResult<Vec<DeviceId>> {
        Ok(self.teilnehmer_laden(entity).await?)
    }
}
