//! Database models for the owner -> server mapping.

use sqlx::FromRow;

use crate::types::{OwnerId, ServerId};

/// Database entity model
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ServerRecord {
    pub owner_id: OwnerId,
    pub server_id: ServerId,
    pub server_name: String,
}

/// Request for recording a newly created server
#[derive(Debug, Clone)]
pub struct ServerRecordCreateDBRequest {
    pub owner_id: OwnerId,
    pub server_id: ServerId,
    pub server_name: String,
}
