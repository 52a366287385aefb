//! Database record models matching table schemas.
//!
//! - [`servers`]: servers created by each owner (`server_map` table)
//! - [`user_defaults`]: per-owner default network, ssh key and firewall (`user_defaults` table)

pub mod servers;
pub mod user_defaults;
