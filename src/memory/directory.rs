//! Read-side collaborators: partner lookup and message lookup.
//!
//! The chat product owns partners and messages. The engine only reads them,
//! so the traits are lookup-only; the inherent `create_*` helpers on
//! [`SqliteStore`] exist to seed a standalone database.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::error::StoreError;
use super::store::{partner_exists, timestamp_column, SqliteStore};
use super::types::{format_timestamp, Message, MessageSender, Partner};

pub trait PartnerDirectory: Send + Sync {
    fn find_partner(&self, partner_id: &str) -> Result<Option<Partner>, StoreError>;

    fn find_partners_by_user(&self, user_id: &str) -> Result<Vec<Partner>, StoreError>;
}

pub trait MessageSource: Send + Sync {
    /// Messages with the given ids, in no particular order. Unknown ids are skipped.
    fn find_messages_by_ids(&self, ids: &[String]) -> Result<Vec<Message>, StoreError>;
}

fn partner_from_row(row: &Row<'_>) -> rusqlite::Result<Partner> {
    Ok(Partner {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let sender: String = row.get(2)?;
    let sender = sender.parse::<MessageSender>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Message {
        id: row.get(0)?,
        partner_id: row.get(1)?,
        sender,
        content: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

impl PartnerDirectory for SqliteStore {
    fn find_partner(&self, partner_id: &str) -> Result<Option<Partner>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, name, created_at FROM partners WHERE id = ?1",
                    [partner_id],
                    partner_from_row,
                )
                .optional()?)
        })
    }

    fn find_partners_by_user(&self, user_id: &str) -> Result<Vec<Partner>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, created_at FROM partners
                 WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([user_id], partner_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl MessageSource for SqliteStore {
    fn find_messages_by_ids(&self, ids: &[String]) -> Result<Vec<Message>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT id, partner_id, sender, content, created_at FROM messages WHERE id IN ({})",
            placeholders.join(", ")
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl SqliteStore {
    pub fn create_partner(&self, user_id: &str, name: &str) -> Result<Partner, StoreError> {
        let partner = Partner {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO partners (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    partner.id,
                    partner.user_id,
                    partner.name,
                    format_timestamp(&partner.created_at)
                ],
            )?;
            Ok(())
        })?;
        Ok(partner)
    }

    /// Append a chat turn. `created_at` defaults to now.
    pub fn create_message(
        &self,
        partner_id: &str,
        sender: MessageSender,
        content: &str,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Message, StoreError> {
        let message = Message {
            id: uuid::Uuid::now_v7().to_string(),
            partner_id: partner_id.to_string(),
            sender,
            content: content.to_string(),
            created_at: created_at.unwrap_or_else(Utc::now).trunc_subsecs(6),
        };
        self.with_conn(|conn| {
            if !partner_exists(conn, partner_id)? {
                return Err(StoreError::PartnerNotFound(partner_id.to_string()));
            }
            conn.execute(
                "INSERT INTO messages (id, partner_id, sender, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id,
                    message.partner_id,
                    message.sender.as_str(),
                    message.content,
                    format_timestamp(&message.created_at)
                ],
            )?;
            Ok(())
        })?;
        Ok(message)
    }
}
