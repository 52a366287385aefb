//! Lifecycle of the active inventory snapshot.
//!
//! The snapshot is built lazily on first use and replaced only by an explicit refresh. Readers load
//! an `Arc` of the current snapshot without locking; rebuilds are serialized by a mutex and
//! published with a single atomic swap, so a reader sees the old or the new snapshot, never a
//! partial one.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{InventorySnapshot, InventorySummary};
use crate::{errors::Result, provider::CloudProvider};

#[derive(Debug, Clone)]
pub enum CacheState {
    Uninitialized,
    Ready(Arc<InventorySnapshot>),
}

pub struct InventoryCacheService {
    provider: Arc<dyn CloudProvider>,
    active: ArcSwapOption<InventorySnapshot>,
    rebuild: Mutex<()>,
}

impl InventoryCacheService {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            active: ArcSwapOption::empty(),
            rebuild: Mutex::new(()),
        }
    }

    pub fn state(&self) -> CacheState {
        match self.active.load_full() {
            Some(snapshot) => CacheState::Ready(snapshot),
            None => CacheState::Uninitialized,
        }
    }

    /// The active snapshot, without building one
    pub fn current(&self) -> Option<Arc<InventorySnapshot>> {
        self.active.load_full()
    }

    /// The active snapshot, building it first if none exists.
    ///
    /// Concurrent first callers wait for a single build.
    pub async fn get_or_build(&self) -> Result<Arc<InventorySnapshot>> {
        if let Some(snapshot) = self.active.load_full() {
            return Ok(snapshot);
        }

        let _guard = self.rebuild.lock().await;
        // another caller may have finished the build while we waited
        if let Some(snapshot) = self.active.load_full() {
            return Ok(snapshot);
        }

        info!("Inventory cache empty, building");
        let snapshot = Arc::new(InventorySnapshot::build(self.provider.as_ref()).await?);
        self.active.store(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Rebuild unconditionally. On failure the previous snapshot stays active.
    #[instrument(skip(self), err)]
    pub async fn refresh(&self) -> Result<InventorySummary> {
        let _guard = self.rebuild.lock().await;

        let snapshot = match InventorySnapshot::build(self.provider.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(kept_previous = self.active.load().is_some(), "Inventory refresh failed: {e}");
                return Err(e);
            }
        };

        let summary = snapshot.summary();
        self.active.store(Some(Arc::new(snapshot)));
        info!(?summary, "Inventory refreshed");
        Ok(summary)
    }
}
