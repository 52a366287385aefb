//! Database repository for the owner -> server mapping.

use sqlx::SqliteConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::servers::{ServerRecord, ServerRecordCreateDBRequest},
    },
    types::ServerId,
};

pub struct Servers<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Servers<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Record a created server. Recording the same (owner, id) again overwrites the name.
    #[instrument(skip(self, request), fields(owner = %request.owner_id, server_id = request.server_id), err)]
    pub async fn record(&mut self, request: &ServerRecordCreateDBRequest) -> Result<ServerRecord> {
        let record = sqlx::query_as::<_, ServerRecord>(
            r#"
            INSERT INTO server_map (owner_id, server_id, server_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (owner_id, server_id) DO UPDATE SET server_name = excluded.server_name
            RETURNING owner_id, server_id, server_name
            "#,
        )
        .bind(&request.owner_id)
        .bind(request.server_id)
        .bind(&request.server_name)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(record)
    }

    /// Find one of the owner's servers.
    ///
    /// An all-digit query matches the server id only; anything else matches the exact name.
    /// When several servers share a name, the most recently recorded one wins.
    #[instrument(skip(self), err)]
    pub async fn find(&mut self, owner_id: &str, query: &str) -> Result<Option<ServerId>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let found = if query.chars().all(|c| c.is_ascii_digit()) {
            let Ok(server_id) = query.parse::<ServerId>() else {
                return Ok(None);
            };
            sqlx::query_scalar::<_, ServerId>("SELECT server_id FROM server_map WHERE owner_id = ?1 AND server_id = ?2")
                .bind(owner_id)
                .bind(server_id)
                .fetch_optional(&mut *self.db)
                .await?
        } else {
            sqlx::query_scalar::<_, ServerId>(
                "SELECT server_id FROM server_map WHERE owner_id = ?1 AND server_name = ?2 ORDER BY rowid DESC LIMIT 1",
            )
            .bind(owner_id)
            .bind(query)
            .fetch_optional(&mut *self.db)
            .await?
        };

        Ok(found)
    }
}
