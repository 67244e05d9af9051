//! SQLite-Implementierung des Nachrichten-Speichers
//!
//! Das Envelope liegt als JSON in `messages.envelope`; die Spalte `version`
//! spiegelt `Envelope::version()` und ist `NULL` fuer Klartext.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_core::{EntityId, UserId};
use huddle_crypto::store::{MessageStore, NachrichtenCursor, StoredMessage};
use huddle_crypto::{CryptoResult, EncryptionVersion, Envelope};
use sqlx::Row as _;
use uuid::Uuid;

use crate::error::DbResult;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{parse_entity, parse_timestamp, parse_uuid, zeit_text};

fn version_spalte(envelope: &Envelope) -> Option<i64> {
    envelope.version().map(|v| i64::from(v.als_u8()))
}

impl SqliteDb {
    /// Speichert eine Nachricht und gibt ihre ID zurueck
    pub async fn nachricht_speichern(
        &self,
        entity: EntityId,
        sender: UserId,
        envelope: &Envelope,
        created_at: DateTime<Utc>,
    ) -> DbResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO messages (id, entity_id, sender_id, envelope, version, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(entity.speicher_id())
        .bind(sender.inner().to_string())
        .bind(serde_json::to_string(envelope)?)
        .bind(version_spalte(envelope))
        .bind(zeit_text(created_at))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn nachricht_laden(&self, id: Uuid) -> DbResult<Option<StoredMessage>> {
        let row = sqlx::query(
            "SELECT id, entity_id, sender_id, envelope, created_at FROM messages WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_message(&r)).transpose()
    }

    async fn klartext_nachrichten(&self, sender: UserId) -> DbResult<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT id, entity_id, sender_id, envelope, created_at
             FROM messages
             WHERE sender_id = ? AND version IS NULL
             ORDER BY created_at ASC",
        )
        .bind(sender.inner().to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn nachrichten_mit_version(
        &self,
        version: EncryptionVersion,
        nach: Option<NachrichtenCursor>,
        limit: u32,
    ) -> DbResult<Vec<StoredMessage>> {
        let version = i64::from(version.als_u8());
        let rows = match nach {
            None => {
                sqlx::query(
                    "SELECT id, entity_id, sender_id, envelope, created_at
                     FROM messages
                     WHERE version = ?
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?",
                )
                .bind(version)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            Some(cursor) => {
                let zeit = zeit_text(cursor.created_at);
                sqlx::query(
                    "SELECT id, entity_id, sender_id, envelope, created_at
                     FROM messages
                     WHERE version = ?
                       AND (created_at > ? OR (created_at = ? AND id > ?))
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?",
                )
                .bind(version)
                .bind(&zeit)
                .bind(&zeit)
                .bind(cursor.id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_message).collect()
    }

    async fn envelope_ersetzen(&self, id: Uuid, erwartet: &Envelope, neu: &Envelope) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE messages SET envelope = ?, version = ? WHERE id = ? AND envelope = ?",
        )
        .bind(serde_json::to_string(neu)?)
        .bind(version_spalte(neu))
        .bind(id.to_string())
        .bind(serde_json::to_string(erwartet)?)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }
}

#[async_trait]
impl MessageStore for SqliteDb {
    async fn plaintext_messages_of(&self, sender: UserId) -> CryptoResult<Vec<StoredMessage>> {
        Ok(self.klartext_nachrichten(sender).await?)
    }

    async fn messages_with_version(
        &self,
        version: EncryptionVersion,
        nach: Option<NachrichtenCursor>,
        limit: u32,
    ) -> CryptoResult<Vec<StoredMessage>> {
        Ok(self.nachrichten_mit_version(version, nach, limit).await?)
    }

    async fn replace_if_envelope(
        &self,
        id: Uuid,
        erwartet: &Envelope,
        neu: &Envelope,
    ) -> CryptoResult<bool> {
        Ok(self.envelope_ersetzen(id, erwartet, neu).await?)
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> DbResult<StoredMessage> {
    let id: String = row.try_get("id")?;
    let entity: String = row.try_get("entity_id")?;
    let sender: String = row.try_get("sender_id")?;
    let envelope: String = row.try_get("envelope")?;

    Ok(StoredMessage {
        id: parse_uuid(&id, "Nachrichten")?,
        entity: parse_entity(&entity)?,
        sender: UserId(parse_uuid(&sender, "sender_id")?),
        envelope: serde_json::from_str(&envelope)?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
    })
}
