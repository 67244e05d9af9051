//! SQLite-Implementierung des Geraete-Verzeichnisses

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_core::{DeviceId, UserId};
use huddle_crypto::store::{DeviceRecord, PublicKeyDirectory};
use huddle_crypto::CryptoResult;
use sqlx::Row as _;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{parse_timestamp, parse_uuid, zeit_text};

impl SqliteDb {
    async fn geraet_registrieren(&self, record: &DeviceRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO devices (device_id, user_id, public_key, created_at, rotated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(device_id) DO UPDATE SET
                 user_id = excluded.user_id,
                 public_key = excluded.public_key,
                 rotated_at = excluded.rotated_at",
        )
        .bind(record.device_id.inner().to_string())
        .bind(record.user_id.inner().to_string())
        .bind(&record.public_key)
        .bind(zeit_text(record.created_at))
        .bind(record.rotated_at.map(zeit_text))
        .execute(&self.pool)
        .await?;

        info!(user = %record.user_id, device = %record.device_id, "Geraet registriert");
        Ok(())
    }

    async fn public_key_laden(&self, device: DeviceId) -> DbResult<String> {
        let row = sqlx::query("SELECT public_key FROM devices WHERE device_id = ?")
            .bind(device.inner().to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(r.try_get("public_key")?),
            None => Err(DbError::nicht_gefunden(device.to_string())),
        }
    }

    async fn geraete_laden(&self, user: UserId) -> DbResult<Vec<DeviceRecord>> {
        let rows = sqlx::query(
            "SELECT device_id, user_id, public_key, created_at, rotated_at
             FROM devices WHERE user_id = ?
             ORDER BY created_at ASC",
        )
        .bind(user.inner().to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_device).collect()
    }

    async fn public_key_setzen(
        &self,
        device: DeviceId,
        public_key: &str,
        rotated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let affected = sqlx::query(
            "UPDATE devices SET public_key = ?, rotated_at = ? WHERE device_id = ?",
        )
        .bind(public_key)
        .bind(zeit_text(rotated_at))
        .bind(device.inner().to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(DbError::nicht_gefunden(device.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PublicKeyDirectory for SqliteDb {
    async fn register_device(&self, record: &DeviceRecord) -> CryptoResult<()> {
        Ok(self.geraet_registrieren(record).await?)
    }

    async fn get_public_key(&self, device: DeviceId) -> CryptoResult<String> {
        Ok(self.public_key_laden(device).await?)
    }

    async fn devices_of_user(&self, user: UserId) -> CryptoResult<Vec<DeviceRecord>> {
        Ok(self.geraete_laden(user).await?)
    }

    async fn update_public_key(
        &self,
        device: DeviceId,
        public_key: &str,
        rotated_at: DateTime<Utc>,
    ) -> CryptoResult<()> {
        Ok(self.public_key_setzen(device, public_key, rotated_at).await?)
    }
}

fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> DbResult<DeviceRecord> {
    let device: String = row.try_get("device_id")?;
    let user: String = row.try_get("user_id")?;
    let rotated_at: Option<String> = row.try_get("rotated_at")?;

    Ok(DeviceRecord {
        user_id: UserId(parse_uuid(&user, "user_id")?),
        device_id: DeviceId(parse_uuid(&device, "device_id")?),
        public_key: row.try_get("public_key")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        rotated_at: rotated_at.map(parse_timestamp).transpose()?,
    })
}
