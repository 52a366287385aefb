//! Database models for per-user default resources.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::ResourceId;

/// Stored default ids of one owner. `None` means "no override" for that category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserDefaults {
    pub network_id: Option<ResourceId>,
    pub ssh_key_id: Option<ResourceId>,
    pub firewall_id: Option<ResourceId>,
}
