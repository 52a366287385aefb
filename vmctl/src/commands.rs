//! Command surface: one subcommand per chat command, rendered to the text reply the user sees.

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::{
    Application,
    config::Args,
    db::models::user_defaults::UserDefaults,
    errors::{Error, Result},
    provider::{CreatedServer, ServerDetails},
    provisioning::ProvisionRequest,
    types::ResourceId,
};

#[derive(Parser, Debug)]
#[command(name = "vmctl", author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub args: Args,

    /// Chat user the command runs as; servers and defaults are namespaced by it
    #[arg(long, env = "VMCTL_USER", global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create one or more VMs
    Create {
        /// Base name; uppercased, batches get numeric suffixes
        name: String,
        /// Location name (see `locations`)
        #[arg(long)]
        location: String,
        /// x86 image name (see `images`)
        #[arg(long)]
        image: String,
        /// App installed via cloud-init: none, coolify or wireguard
        #[arg(long, default_value = "none")]
        app: String,
        /// Number of VMs to create (1-10)
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Get info about one of your servers by name or id
    Server { query: String },
    /// Rebuild the provider inventory cache
    Refresh,
    /// List all x86 image names
    Images,
    /// List locations
    Locations,
    /// List networks
    Networks,
    /// List ssh keys
    SshKeys,
    /// List firewalls
    Firewalls,
    /// Set the default network, ssh key and firewall (only needed when there are several)
    SetDefaults {
        #[arg(long)]
        network_id: Option<ResourceId>,
        #[arg(long)]
        ssh_key_id: Option<ResourceId>,
        #[arg(long)]
        firewall_id: Option<ResourceId>,
    },
    /// Suggest image or location names matching a partial input
    Complete {
        #[arg(value_enum)]
        field: CompletionField,
        #[arg(default_value = "")]
        current: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionField {
    Image,
    Location,
}

fn require_user(user: Option<&str>) -> Result<&str> {
    user.map(str::trim).filter(|u| !u.is_empty()).ok_or_else(|| Error::Validation {
        message: "This command needs a user. Pass --user or set VMCTL_USER.".to_string(),
    })
}

/// Run a command and render its reply
pub async fn execute(app: &Application, user: Option<&str>, command: Command) -> Result<String> {
    match command {
        Command::Create {
            name,
            location,
            image,
            app: template,
            count,
        } => {
            let owner = require_user(user)?;
            let request = ProvisionRequest::builder()
                .owner_id(owner)
                .name(name)
                .location(location)
                .image(image)
                .app(template)
                .count(count)
                .build();
            let report = app.provision(&request).await?;

            let delay = app.settle_delay();
            if !delay.is_zero() {
                info!(?delay, "Waiting for servers to settle");
                tokio::time::sleep(delay).await;
            }
            let details = app.fetch_details(&report.created).await;
            Ok(render_created(&report.created, &details))
        }
        Command::Server { query } => {
            let owner = require_user(user)?;
            Ok(app.server_details(owner, &query).await?.summary())
        }
        Command::Refresh => {
            let summary = app.refresh_inventory().await?;
            Ok(format!("Refreshed.\n{summary}"))
        }
        Command::Images => Ok(format!("x86 Images:\n{}", app.list_x86_images().await?.join("\n"))),
        Command::Locations => Ok(format!("Locations:\n{}", app.list_locations().await?.join("\n"))),
        Command::Networks => Ok(render_listing("Networks", app.list_networks().await?)),
        Command::SshKeys => Ok(render_listing("SSH keys", app.list_ssh_keys().await?)),
        Command::Firewalls => Ok(render_listing("Firewalls", app.list_firewalls().await?)),
        Command::SetDefaults {
            network_id,
            ssh_key_id,
            firewall_id,
        } => {
            let owner = require_user(user)?;
            let saved = app
                .set_defaults(
                    owner,
                    UserDefaults {
                        network_id,
                        ssh_key_id,
                        firewall_id,
                    },
                )
                .await?;
            Ok(render_defaults(&saved))
        }
        Command::Complete { field, current } => {
            // a one-shot process has no warm cache
            app.inventory().get_or_build().await?;
            let names = match field {
                CompletionField::Image => app.suggest_images(&current),
                CompletionField::Location => app.suggest_locations(&current),
            };
            Ok(names.join("\n"))
        }
    }
}

fn render_listing(title: &str, lines: Option<String>) -> String {
    format!("{title}:\n{}", lines.as_deref().unwrap_or("None"))
}

fn render_defaults(defaults: &UserDefaults) -> String {
    let show = |id: Option<ResourceId>| id.map_or_else(|| "None".to_string(), |id| id.to_string());
    format!(
        "Defaults saved:\n- network_id: {}\n- ssh_key_id: {}\n- firewall_id: {}",
        show(defaults.network_id),
        show(defaults.ssh_key_id),
        show(defaults.firewall_id)
    )
}

/// One block per server that could be read back, a warning line for each that could not.
pub fn render_created(created: &[CreatedServer], details: &[Result<ServerDetails>]) -> String {
    let mut blocks = Vec::new();
    let mut warnings = Vec::new();
    for (server, detail) in created.iter().zip(details) {
        match detail {
            Ok(detail) => blocks.push(detail.summary()),
            Err(e) => warnings.push(format!("Created server {}, but fetch failed: {e}", server.id)),
        }
    }
    if blocks.is_empty() {
        warnings.push("VMs created, but I couldn't fetch details.".to_string());
    }
    blocks.extend(warnings);
    blocks.join("\n\n")
}
