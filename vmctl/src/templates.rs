//! App templates: cloud-init user data installed on first boot.

use std::{fmt, str::FromStr};

use crate::errors::Error;

const COOLIFY_CLOUD_CONFIG: &str = "#cloud-config
package_update: true
packages:
  - curl
runcmd:
  - curl -fsSL https://get.docker.com | sh
  - curl -fsSL https://cdn.coollabs.io/coolify/install.sh | bash
";

const WIREGUARD_CLOUD_CONFIG: &str = "#cloud-config
package_update: true
packages:
  - wireguard
  - qrencode
runcmd:
  - sysctl -w net.ipv4.ip_forward=1
  - sysctl -w net.ipv6.conf.all.forwarding=1
";

/// Fixed catalog of app templates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppTemplate {
    #[default]
    None,
    Coolify,
    Wireguard,
}

impl AppTemplate {
    pub const ALL: [AppTemplate; 3] = [AppTemplate::None, AppTemplate::Coolify, AppTemplate::Wireguard];

    pub fn key(&self) -> &'static str {
        match self {
            AppTemplate::None => "none",
            AppTemplate::Coolify => "coolify",
            AppTemplate::Wireguard => "wireguard",
        }
    }

    /// Comma-separated list of accepted keys
    pub fn supported() -> String {
        Self::ALL.iter().map(AppTemplate::key).collect::<Vec<_>>().join(", ")
    }

    /// cloud-init user data, `None` for a bare server
    pub fn boot_script(&self) -> Option<&'static str> {
        match self {
            AppTemplate::None => None,
            AppTemplate::Coolify => Some(COOLIFY_CLOUD_CONFIG),
            AppTemplate::Wireguard => Some(WIREGUARD_CLOUD_CONFIG),
        }
    }
}

impl fmt::Display for AppTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AppTemplate {
    type Err = Error;

    /// Keys are trimmed and case-insensitive; an empty key means [`AppTemplate::None`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        if key.is_empty() {
            return Ok(AppTemplate::None);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.key() == key)
            .ok_or(Error::UnknownTemplate { template: key })
    }
}
