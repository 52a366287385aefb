//! Common type definitions.
//!
//! # ID Types
//!
//! - [`OwnerId`]: opaque chat-platform user identifier. Stored as text so platforms with
//!   64-bit snowflakes or string handles fit the same column.
//! - [`ServerId`]: provider-assigned server identifier
//! - [`ResourceId`]: provider-assigned identifier of networks, ssh keys, firewalls and images
//!
//! # Utility Functions
//!
//! - [`abbrev_owner`]: Abbreviate owner ids for more readable logs and traces

pub type OwnerId = String;
pub type ServerId = i64;
pub type ResourceId = i64;

/// Abbreviate an owner id to its first 8 characters for logs and traces
/// Example: "318272981290123264" -> "31827298"
pub fn abbrev_owner(owner: &str) -> String {
    owner.chars().take(8).collect()
}
