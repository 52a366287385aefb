use crate::db::errors::DbError;
use crate::provider::{CreatedServer, ProviderError};
use crate::templates::AppTemplate;
use crate::types::ServerId;
use thiserror::Error as ThisError;

/// How many names an "unknown location/image" message lists
pub const SUGGESTION_LIMIT: usize = 25;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request shape (empty name, count out of range, bad config)
    #[error("{message}")]
    Validation { message: String },

    /// App template key outside the fixed catalog
    #[error("Unknown app \"{template}\". Supported: {}", AppTemplate::supported())]
    UnknownTemplate { template: String },

    /// An inventory listing failed; the cache rebuild was abandoned
    #[error("Failed to list {resource} from the provider: {source}")]
    ProviderFetch {
        resource: &'static str,
        #[source]
        source: ProviderError,
    },

    /// The provider reported a quota and it cannot hold the request
    #[error("{}", quota_message(*requested, *remaining))]
    QuotaExceeded { requested: u32, remaining: i64 },

    /// Location key not in the inventory. `available` holds the first sorted names.
    #[error(
        "Unknown location \"{location}\". Try a different location. Available (first {}): {}",
        SUGGESTION_LIMIT,
        suggestion_list(available, *total)
    )]
    UnknownLocation {
        location: String,
        available: Vec<String>,
        total: usize,
    },

    /// Image key not among x86 images. `architecture` is set when the image exists with
    /// another architecture.
    #[error("{}", unknown_image_message(image, architecture.as_deref(), x86_images, *total))]
    UnknownImage {
        image: String,
        architecture: Option<String>,
        x86_images: Vec<String>,
        total: usize,
    },

    /// The configured machine type is not offered by the provider
    #[error("Server type {name} not found in the provider inventory")]
    MachineTypeNotFound { name: String },

    /// Nothing to pick from for a category
    #[error("No {category} exists in the provider account.")]
    NoResource { category: String },

    /// Several candidates and no usable stored default. `candidates` are sorted
    /// `"- name (id N)"` lines.
    #[error(
        "Multiple {category}s exist, and no default is set.\nUse set-defaults to choose IDs.\n\nAvailable {category}s:\n{}",
        candidates.join("\n")
    )]
    AmbiguousResource { category: String, candidates: Vec<String> },

    /// The create call itself failed
    #[error("Failed to create server {name}: {source}")]
    ProviderCreate {
        name: String,
        #[source]
        source: ProviderError,
    },

    /// Reading a server back failed
    #[error("Failed to fetch server {id}: {source}")]
    ProviderRead {
        id: ServerId,
        #[source]
        source: ProviderError,
    },

    /// A batch stopped after creating some servers. `created` is in creation order.
    #[error("Batch stopped at {failed_name} after creating {} server(s): {cause}", created.len())]
    BatchAborted {
        created: Vec<CreatedServer>,
        failed_name: String,
        cause: Box<Error>,
    },

    /// Requested resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn quota_message(requested: u32, remaining: i64) -> String {
    if remaining <= 0 {
        "Server limit reached on this account.".to_string()
    } else {
        format!("You requested {requested} VM(s), but the account only has quota for {remaining} more.")
    }
}

fn suggestion_list(names: &[String], total: usize) -> String {
    let mut list = names.join(", ");
    if total > names.len() {
        list.push_str(" …");
    }
    list
}

fn unknown_image_message(image: &str, architecture: Option<&str>, x86_images: &[String], total: usize) -> String {
    let suggestions = format!(
        "Valid x86 images (first {SUGGESTION_LIMIT}): {}",
        suggestion_list(x86_images, total)
    );
    match architecture {
        Some(arch) => format!(
            "Image \"{image}\" is not x86-compatible (architecture: {arch}). Pick an x86 image; use `images` to list them.\n{suggestions}"
        ),
        None => format!("Unknown image \"{image}\". Use `images` to list valid x86 options.\n{suggestions}"),
    }
}

impl Error {
    /// Whether the failure comes from the account running out of server quota.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            Error::QuotaExceeded { .. } => true,
            Error::ProviderCreate { source, .. } => source.is_resource_limit(),
            Error::BatchAborted { cause, .. } => cause.is_quota_exhausted(),
            _ => false,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::ProviderCreate { .. } if self.is_quota_exhausted() => "Server limit reached on this account.".to_string(),
            Error::ProviderCreate { source, .. } => format!("Failed creating VM:\n`{source}`"),
            Error::BatchAborted { created, cause, .. } => {
                let names: Vec<&str> = created.iter().map(|s| s.name.as_str()).collect();
                let reason = if cause.is_quota_exhausted() {
                    "Server limit reached on this account.".to_string()
                } else {
                    format!("Error: {}", cause.user_message())
                };
                format!("Failed creating one of the VMs.\nCreated so far: {}\n\n{reason}", names.join(", "))
            }
            Error::NotFound { .. } => "I can't find that server under your user.".to_string(),
            Error::Database(_) => "Database error occurred".to_string(),
            Error::Other(_) => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Log the error at a level that matches its severity
    pub fn log(&self) {
        match self {
            Error::Database(_) | Error::Other(_) => {
                tracing::error!("Internal error: {:#}", self);
            }
            Error::ProviderFetch { .. } | Error::ProviderCreate { .. } | Error::ProviderRead { .. } | Error::BatchAborted { .. } => {
                tracing::warn!("Provider error: {}", self);
            }
            _ => {
                tracing::debug!("Request error: {}", self);
            }
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
