//! # Asset Repository Sync
//!
//! Pulls every asset identifier and record from the ledger, normalizes them
//! into [`AssetRecord`]s and publishes an immutable [`AssetSnapshot`].
//!
//! ## Core Principles
//!
//! - **Ledger is Truth**: local state is only ever replaced by a fresh sync,
//!   never patched optimistically.
//! - **Partial Success**: a record that fails to load is logged and
//!   omitted; it does not abort the sync.
//! - **No Destructive Failure**: if identifiers cannot be listed the
//!   previous snapshot stays in place.
//! - **Atomic Publish**: readers hold an `Arc<AssetSnapshot>`; a sync swaps
//!   the pointer, so no reader sees a half-updated set.
//!
//! ## Concurrency
//!
//! Overlapping `refresh` calls are allowed. Each publishes on completion,
//! so the call that finishes last determines the final snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use ctrack_common::{AggregateCounters, AssetRecord, LedgerContract, LedgerError};

use crate::error::ClientError;
use crate::notifier::TxStatusNotifier;

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ════════════════════════════════════════════════════════════════════════════
// SNAPSHOT
// ════════════════════════════════════════════════════════════════════════════

/// Immutable view of the asset set produced by one sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetSnapshot {
    pub records: Vec<AssetRecord>,
    pub counters: AggregateCounters,
    /// Unix seconds at which the sync normalized the records. 0 = never synced.
    pub synced_at: u64,
}

impl AssetSnapshot {
    pub fn new(records: Vec<AssetRecord>, synced_at: u64) -> Self {
        let counters = AggregateCounters::from_records(&records);
        Self {
            records,
            counters,
            synced_at,
        }
    }

    pub fn get(&self, asset_id: &str) -> Option<&AssetRecord> {
        self.records.iter().find(|r| r.id == asset_id)
    }

    /// Records whose name or description contains `term`, ignoring case.
    pub fn search(&self, term: &str) -> Vec<&AssetRecord> {
        self.records.iter().filter(|r| r.matches(term)).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub loaded: usize,
    /// Identifiers whose record could not be fetched.
    pub skipped: Vec<String>,
    pub counters: AggregateCounters,
}

// ════════════════════════════════════════════════════════════════════════════
// REPOSITORY
// ════════════════════════════════════════════════════════════════════════════

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AssetRepository {
    ledger: Arc<dyn LedgerContract>,
    notifier: Arc<TxStatusNotifier>,
    alert_after_secs: u64,
    snapshot: RwLock<Arc<AssetSnapshot>>,
    in_flight: AtomicUsize,
}

impl AssetRepository {
    pub fn new(
        ledger: Arc<dyn LedgerContract>,
        notifier: Arc<TxStatusNotifier>,
        alert_after_secs: u64,
    ) -> Self {
        Self {
            ledger,
            notifier,
            alert_after_secs,
            snapshot: RwLock::new(Arc::new(AssetSnapshot::default())),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Full sync against the ledger.
    pub async fn refresh(&self) -> Result<SyncReport, ClientError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let ids = match self.ledger.get_all_business_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("failed to list asset identifiers: {}", e);
                self.notifier.error("Failed to load data");
                return Err(ClientError::Sync(e.to_string()));
            }
        };
        debug!(count = ids.len(), "listed asset identifiers");

        let now = now_secs();
        let mut records = Vec::with_capacity(ids.len());
        let mut skipped = Vec::new();
        for id in ids {
            match self.ledger.get_business_data(&id).await {
                Ok(data) => {
                    records.push(AssetRecord::from_ledger(&id, &data, now, self.alert_after_secs))
                }
                Err(e) => {
                    warn!(business_id = %id, "error loading business data: {}", e);
                    skipped.push(id);
                }
            }
        }

        let snapshot = Arc::new(AssetSnapshot::new(records, now));
        let report = SyncReport {
            loaded: snapshot.len(),
            skipped,
            counters: snapshot.counters,
        };
        *self.snapshot.write() = snapshot;

        info!(
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "asset sync complete"
        );
        Ok(report)
    }

    /// Reads one record straight from the ledger, bypassing the snapshot.
    pub async fn fetch_record(&self, asset_id: &str) -> Result<AssetRecord, LedgerError> {
        let data = self.ledger.get_business_data(asset_id).await?;
        Ok(AssetRecord::from_ledger(
            asset_id,
            &data,
            now_secs(),
            self.alert_after_secs,
        ))
    }

    pub fn snapshot(&self) -> Arc<AssetSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn counters(&self) -> AggregateCounters {
        self.snapshot.read().counters
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
