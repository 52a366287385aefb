//! Mapping store: which servers an owner created, and the owner's default resources.
//!
//! The provisioning core only sees [`MappingStore`]. The production implementation runs the
//! [`crate::db::handlers`] repositories against a SQLite pool.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::{
    db::{
        errors::Result,
        handlers::{Servers, UserDefaultsRepo},
        models::{servers::ServerRecordCreateDBRequest, user_defaults::UserDefaults},
    },
    types::ServerId,
};

#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Record a server created for `owner_id`
    async fn put_server(&self, owner_id: &str, server_id: ServerId, server_name: &str) -> Result<()>;

    /// Look up one of the owner's servers by id (all-digit query) or exact name
    async fn find_server(&self, owner_id: &str, query: &str) -> Result<Option<ServerId>>;

    /// Stored defaults, all `None` when the owner never set any
    async fn get_defaults(&self, owner_id: &str) -> Result<UserDefaults>;

    /// Overwrite the owner's defaults wholesale
    async fn set_defaults(&self, owner_id: &str, defaults: UserDefaults) -> Result<()>;
}

#[async_trait]
impl MappingStore for SqlitePool {
    async fn put_server(&self, owner_id: &str, server_id: ServerId, server_name: &str) -> Result<()> {
        let mut conn = self.acquire().await?;
        Servers::new(&mut conn)
            .record(&ServerRecordCreateDBRequest {
                owner_id: owner_id.to_string(),
                server_id,
                server_name: server_name.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn find_server(&self, owner_id: &str, query: &str) -> Result<Option<ServerId>> {
        let mut conn = self.acquire().await?;
        Servers::new(&mut conn).find(owner_id, query).await
    }

    async fn get_defaults(&self, owner_id: &str) -> Result<UserDefaults> {
        let mut conn = self.acquire().await?;
        UserDefaultsRepo::new(&mut conn).get(owner_id).await
    }

    async fn set_defaults(&self, owner_id: &str, defaults: UserDefaults) -> Result<()> {
        let mut conn = self.acquire().await?;
        UserDefaultsRepo::new(&mut conn).set(owner_id, &defaults).await?;
        Ok(())
    }
}
