//! Process-wide catalog cache.
//!
//! `get()` returns the published catalog, running a full cycle (initialize,
//! fetch, reconcile) only when nothing was published yet or after
//! `invalidate()`. Publication swaps one `Arc`, so readers see either the old
//! or the new catalog in full.
//!
//! Two counters keep concurrent cycles honest:
//! - the invalidation generation, captured when a cycle starts, tells whether
//!   the published catalog still answers the latest `invalidate()`;
//! - the cycle number orders publications, so a slow cycle never replaces a
//!   catalog from a cycle that started after it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PriceError, Result};
use crate::fetch::fetch_all;
use crate::model::Catalog;
use crate::reconcile::reconcile;
use crate::registry::IntegrationRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Populating,
    Ready,
}

#[derive(Default)]
struct Slot {
    catalog: Option<Arc<Catalog>>,
    /// Invalidation generation the published catalog was fetched under.
    generation: u64,
    /// Generation whose cycle failed outright and fell back to `catalog`.
    kept_through: Option<u64>,
}

pub struct CatalogCache {
    registry: Arc<IntegrationRegistry>,
    slot: RwLock<Slot>,
    generation: AtomicU64,
    cycles: AtomicU64,
    in_flight: AtomicUsize,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CatalogCache {
    pub fn new(registry: Arc<IntegrationRegistry>) -> Self {
        Self {
            registry,
            slot: RwLock::new(Slot::default()),
            generation: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<IntegrationRegistry> {
        &self.registry
    }

    /// The current catalog, fetching first if it is missing or invalidated.
    ///
    /// When every provider fails, the previous catalog is returned if there
    /// is one; otherwise this is [`PriceError::AggregateEmpty`].
    pub async fn get(&self) -> Result<Arc<Catalog>> {
        if let Some(catalog) = self.fresh() {
            return Ok(catalog);
        }

        // Callers that found the cache stale share one cycle.
        let _guard = self.refresh_lock.lock().await;
        if let Some(catalog) = self.fresh() {
            return Ok(catalog);
        }
        self.run_cycle().await
    }

    /// Force the next `get()` to run a full cycle.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "catalog invalidated");
    }

    /// Run one cycle now, regardless of cache freshness.
    pub async fn refresh(&self) -> Result<Arc<Catalog>> {
        self.run_cycle().await
    }

    /// The published catalog, without fetching.
    pub fn peek(&self) -> Option<Arc<Catalog>> {
        self.read_slot(|s| s.catalog.clone())
    }

    /// `Populating` while a cycle runs and also after `invalidate()` until
    /// a cycle answers it. A cycle that failed outright but kept the previous
    /// catalog leaves the cache `Ready`, though the next `get()` still retries.
    pub fn state(&self) -> CacheState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return CacheState::Populating;
        }
        let current = self.generation.load(Ordering::SeqCst);
        self.read_slot(|s| match &s.catalog {
            None => CacheState::Empty,
            Some(_) if s.generation == current || s.kept_through == Some(current) => {
                CacheState::Ready
            }
            Some(_) => CacheState::Populating,
        })
    }

    fn fresh(&self) -> Option<Arc<Catalog>> {
        let current = self.generation.load(Ordering::SeqCst);
        self.read_slot(|s| {
            s.catalog
                .as_ref()
                .filter(|_| s.generation == current)
                .cloned()
        })
    }

    async fn run_cycle(&self) -> Result<Arc<Catalog>> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.load(Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _populating = InFlight(&self.in_flight);

        self.registry.ensure_initialized().await;
        let providers = self.registry.snapshot();
        let report = fetch_all(&providers).await;
        self.registry.record_fetch(&report);

        if report.is_total_failure() {
            let failed = report.failed();
            return match self.peek() {
                Some(previous) => {
                    warn!(cycle, failed, "every provider failed, keeping previous catalog");
                    self.write_slot().kept_through = Some(generation);
                    Ok(previous)
                }
                None => {
                    warn!(cycle, failed, "every provider failed, no catalog to fall back on");
                    Err(PriceError::AggregateEmpty { failed })
                }
            };
        }

        let catalog = Arc::new(reconcile(report, cycle));
        Ok(self.publish(catalog, generation))
    }

    /// Swap in `catalog` unless a newer cycle already published. Returns
    /// whichever catalog is current afterwards.
    fn publish(&self, catalog: Arc<Catalog>, generation: u64) -> Arc<Catalog> {
        let mut slot = self.write_slot();
        if let Some(current) = &slot.catalog {
            if current.cycle > catalog.cycle {
                debug!(
                    stale = catalog.cycle,
                    current = current.cycle,
                    "discarding catalog from superseded cycle"
                );
                return Arc::clone(current);
            }
        }
        info!(cycle = catalog.cycle, models = catalog.len(), "catalog published");
        slot.catalog = Some(Arc::clone(&catalog));
        slot.generation = generation;
        slot.kept_through = None;
        catalog
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Slot> {
        match self.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_slot<T>(&self, f: impl FnOnce(&Slot) -> T) -> T {
        match self.slot.read() {
            Ok(slot) => f(&slot),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
