//! SQLite-Implementierung des EntityKeyStore

use async_trait::async_trait;
use huddle_core::EntityId;
use huddle_crypto::store::{EinfuegeErgebnis, EntityKeyRecord, EntityKeyStore};
use huddle_crypto::CryptoResult;
use sqlx::Row as _;
use tracing::debug;

use crate::error::DbResult;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{
    epoch_lesen, epoch_schreiben, parse_algorithm, parse_entity, parse_timestamp, zeit_text,
};

impl SqliteDb {
    async fn entity_key_einfuegen(&self, record: &EntityKeyRecord) -> DbResult<EinfuegeErgebnis> {
        let affected = sqlx::query(
            "INSERT INTO entity_keys (entity_id, wrapped_key, epoch, algorithm, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(entity_id) DO NOTHING",
        )
        .bind(record.entity.speicher_id())
        .bind(&record.wrapped_key)
        .bind(epoch_schreiben(record.epoch)?)
        .bind(record.algorithm.als_str())
        .bind(zeit_text(record.created_at))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 1 {
            Ok(EinfuegeErgebnis::Eingefuegt)
        } else {
            debug!(entity = %record.entity, "Entity-Schluessel existiert bereits");
            Ok(EinfuegeErgebnis::Konflikt)
        }
    }

    async fn entity_key_laden(&self, entity: &EntityId) -> DbResult<Option<EntityKeyRecord>> {
        let row = sqlx::query(
            "SELECT entity_id, wrapped_key, epoch, algorithm, created_at
             FROM entity_keys WHERE entity_id = ?",
        )
        .bind(entity.speicher_id())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn entity_key_ersetzen(
        &self,
        record: &EntityKeyRecord,
        erwartete_epoch: u64,
    ) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE entity_keys
             SET wrapped_key = ?, epoch = ?, algorithm = ?, created_at = ?
             WHERE entity_id = ? AND epoch = ?",
        )
        .bind(&record.wrapped_key)
        .bind(epoch_schreiben(record.epoch)?)
        .bind(record.algorithm.als_str())
        .bind(zeit_text(record.created_at))
        .bind(record.entity.speicher_id())
        .bind(epoch_schreiben(erwartete_epoch)?)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }
}

#[async_trait]
impl EntityKeyStore for SqliteDb {
    async fn put_if_absent(&self, record: &EntityKeyRecord) -> CryptoResult<EinfuegeErgebnis> {
        Ok(self.entity_key_einfuegen(record).await?)
    }

    async fn get(&self, entity: &EntityId) -> CryptoResult<Option<EntityKeyRecord>> {
        Ok(self.entity_key_laden(entity).await?)
    }

    async fn replace_if_epoch(
        &self,
        record: &EntityKeyRecord,
        erwartete_epoch: u64,
    ) -> CryptoResult<bool> {
        Ok(self.entity_key_ersetzen(record, erwartete_epoch).await?)
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> DbResult<EntityKeyRecord> {
    let entity: String = row.try_get("entity_id")?;
    let algorithm: String = row.try_get("algorithm")?;

    Ok(EntityKeyRecord {
        entity: parse_entity(&entity)?,
        wrapped_key: row.try_get("wrapped_key")?,
        epoch: epoch_lesen(row.try_get("epoch")?)?,
        algorithm: parse_algorithm(&algorithm)?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
    })
}
