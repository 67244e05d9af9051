//! SQLite-Implementierung des Schluessel-Postfachs

use async_trait::async_trait;
use chrono::Utc;
use huddle_core::DeviceId;
use huddle_crypto::store::{KeyMailbox, WrappedKey};
use huddle_crypto::CryptoResult;
use sqlx::Row as _;
use tracing::debug;

use crate::error::DbResult;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{epoch_lesen, epoch_schreiben, parse_algorithm, parse_entity, parse_uuid, zeit_text};

impl SqliteDb {
    async fn schluessel_zustellen(&self, wrapped: &WrappedKey) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO wrapped_keys (device_id, entity_id, epoch, algorithm, blob, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(device_id, entity_id) DO UPDATE SET
                 epoch = excluded.epoch,
                 algorithm = excluded.algorithm,
                 blob = excluded.blob,
                 delivered_at = excluded.delivered_at
             WHERE excluded.epoch >= wrapped_keys.epoch",
        )
        .bind(wrapped.device.inner().to_string())
        .bind(wrapped.entity.speicher_id())
        .bind(epoch_schreiben(wrapped.epoch)?)
        .bind(wrapped.algorithm.als_str())
        .bind(&wrapped.blob)
        .bind(zeit_text(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Liest und loescht in einer Transaktion
    async fn postfach_leeren(&self, device: DeviceId) -> DbResult<Vec<WrappedKey>> {
        let device_str = device.inner().to_string();
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT device_id, entity_id, epoch, algorithm, blob
             FROM wrapped_keys WHERE device_id = ?
             ORDER BY delivered_at ASC",
        )
        .bind(&device_str)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM wrapped_keys WHERE device_id = ?")
            .bind(&device_str)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let schluessel: Vec<WrappedKey> = rows.iter().map(row_to_wrapped).collect::<DbResult<_>>()?;
        debug!(device = %device, anzahl = schluessel.len(), "Postfach geleert");
        Ok(schluessel)
    }
}

#[async_trait]
impl KeyMailbox for SqliteDb {
    async fn deliver(&self, wrapped: &WrappedKey) -> CryptoResult<()> {
        Ok(self.schluessel_zustellen(wrapped).await?)
    }

    async fn take_for_device(&self, device: DeviceId) -> CryptoResult<Vec<WrappedKey>> {
        Ok(self.postfach_leeren(device).await?)
    }
}

fn row_to_wrapped(row: &sqlx::sqlite::SqliteRow) -> DbResult<WrappedKey> {
    let device: String = row.try_get("device_id")?;
    let entity: String = row.try_get("entity_id")?;
    let algorithm: String = row.try_get("algorithm")?;

    Ok(WrappedKey {
        entity: parse_entity(&entity)?,
        device: DeviceId(parse_uuid(&device, "device_id")?),
        epoch: epoch_lesen(row.try_get("epoch")?)?,
        algorithm: parse_algorithm(&algorithm)?,
        blob: row.try_get("blob")?,
    })
}
