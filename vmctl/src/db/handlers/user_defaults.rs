//! Database repository for per-user default resources.

use sqlx::SqliteConnection;
use tracing::instrument;

use crate::db::{errors::Result, models::user_defaults::UserDefaults};

pub struct UserDefaultsRepo<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> UserDefaultsRepo<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Stored defaults of an owner; all fields `None` when nothing was stored.
    #[instrument(skip(self), err)]
    pub async fn get(&mut self, owner_id: &str) -> Result<UserDefaults> {
        let defaults = sqlx::query_as::<_, UserDefaults>(
            "SELECT network_id, ssh_key_id, firewall_id FROM user_defaults WHERE owner_id = ?1",
        )
        .bind(owner_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(defaults.unwrap_or_default())
    }

    /// Overwrite all three defaults of an owner. `None` fields are stored as "no override".
    #[instrument(skip(self, defaults), err)]
    pub async fn set(&mut self, owner_id: &str, defaults: &UserDefaults) -> Result<UserDefaults> {
        let stored = sqlx::query_as::<_, UserDefaults>(
            r#"
            INSERT INTO user_defaults (owner_id, network_id, ssh_key_id, firewall_id)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (owner_id) DO UPDATE SET
                network_id = excluded.network_id,
                ssh_key_id = excluded.ssh_key_id,
                firewall_id = excluded.firewall_id
            RETURNING network_id, ssh_key_id, firewall_id
            "#,
        )
        .bind(owner_id)
        .bind(defaults.network_id)
        .bind(defaults.ssh_key_id)
        .bind(defaults.firewall_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_owner_has_no_overrides(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = UserDefaultsRepo::new(&mut conn);

        assert_eq!(repo.get("nobody").await.unwrap(), UserDefaults::default());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_overwrites_every_field(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = UserDefaultsRepo::new(&mut conn);

        let first = UserDefaults {
            network_id: Some(1),
            ssh_key_id: Some(2),
            firewall_id: Some(3),
        };
        repo.set("alice", &first).await.unwrap();
        assert_eq!(repo.get("alice").await.unwrap(), first);

        let second = UserDefaults {
            network_id: Some(10),
            ssh_key_id: None,
            firewall_id: Some(30),
        };
        let stored = repo.set("alice", &second).await.unwrap();
        assert_eq!(stored, second);
        assert_eq!(repo.get("alice").await.unwrap(), second);

        // other owners are untouched
        assert_eq!(repo.get("bob").await.unwrap(), UserDefaults::default());
    }
}
