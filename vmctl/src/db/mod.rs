//! Database layer for the mapping store.
//!
//! This module implements data access using SQLx with SQLite. It follows the Repository pattern:
//!
//! ```text
//! ┌──────────────┐
//! │ MappingStore │  (crate::store - what the provisioning core sees)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │ Repositories │  (db::handlers - queries)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │    Models    │  (db::models - database records)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │    SQLite    │
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Migrations
//!
//! The schema lives in `migrations/` and is embedded with [`crate::migrator`]. It is applied at
//! startup; `#[sqlx::test]` applies it to every test database.

pub mod errors;
pub mod handlers;
pub mod models;
