//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection or transaction and returns models from
//! [`crate::db::models`]:
//!
//! - [`Servers`]: servers created by each owner, looked up by id or name
//! - [`UserDefaultsRepo`]: per-owner default network, ssh key and firewall
//!
//! ```ignore
//! use vmctl::db::handlers::Servers;
//!
//! async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut repo = Servers::new(&mut conn);
//!
//!     if let Some(id) = repo.find("1234", "WEB").await? {
//!         println!("WEB is server {id}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod servers;
pub mod user_defaults;

pub use servers::Servers;
pub use user_defaults::UserDefaultsRepo;
