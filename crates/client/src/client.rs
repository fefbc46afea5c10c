//! # Tracker Client
//!
//! Coordinator that wires the sequencer, repository, both pipelines and the
//! status notifier around one ledger, one engine and one wallet session.
//!
//! ## Component Ownership
//!
//! ```text
//!                       ┌───────────────────┐
//!                       │   TrackerClient   │
//!                       └─────────┬─────────┘
//!        ┌──────────────┬─────────┼──────────────┬───────────────┐
//!        ▼              ▼         ▼              ▼               ▼
//!  InitSequencer  AssetRepository CreationPipeline RevealPipeline TxStatusNotifier
//!        │              │         │              │               ▲
//!        └──────────────┴─────────┴──────────────┴── status ─────┘
//! ```
//!
//! All components share the notifier, so the single status slot always
//! reflects the most recent step of whichever operation ran last.
//!
//! ## Session Changes
//!
//! [`TrackerClient::on_session_change`] runs `ensure_ready` then `refresh`
//! when a session is connected. [`start_session_watcher`] drives it from a
//! `watch` channel until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use ctrack_common::{
    Address, AggregateCounters, AssetRecord, ClientConfig, ConfigError, EncryptionEngine,
    LedgerContract, SessionSnapshot, WalletSession,
};

use crate::asset_sync::{AssetRepository, AssetSnapshot, SyncReport};
use crate::creation::{AssetDraft, CreatedAsset, CreationPipeline};
use crate::error::ClientError;
use crate::initializer::{InitOutcome, InitSequencer};
use crate::notifier::{TxStatus, TxStatusNotifier};
use crate::reveal::{RevealPipeline, RevealedValue};

pub struct TrackerClient {
    config: ClientConfig,
    ledger: Arc<dyn LedgerContract>,
    session: Arc<dyn WalletSession>,
    notifier: Arc<TxStatusNotifier>,
    sequencer: Arc<InitSequencer>,
    repository: Arc<AssetRepository>,
    creation: CreationPipeline,
    reveal: RevealPipeline,
}

impl TrackerClient {
    /// Builds a client. A configured contract address must match the
    /// ledger's.
    pub fn new(
        config: ClientConfig,
        ledger: Arc<dyn LedgerContract>,
        engine: Arc<dyn EncryptionEngine>,
        session: Arc<dyn WalletSession>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if let Some(configured) = config.contract()? {
            if configured != ledger.address() {
                return Err(ConfigError::Invalid(format!(
                    "configured contract {} does not match ledger {}",
                    configured,
                    ledger.address()
                )));
            }
        }

        let notifier = Arc::new(TxStatusNotifier::new(
            config.success_clear(),
            config.error_clear(),
        ));
        let sequencer = Arc::new(InitSequencer::new(
            engine.clone(),
            session.clone(),
            notifier.clone(),
        ));
        let repository = Arc::new(AssetRepository::new(
            ledger.clone(),
            notifier.clone(),
            config.alert_after_secs,
        ));
        let creation = CreationPipeline::new(
            ledger.clone(),
            engine.clone(),
            session.clone(),
            sequencer.clone(),
            repository.clone(),
            notifier.clone(),
            config.id_prefix.clone(),
        );
        let reveal = RevealPipeline::new(
            ledger.clone(),
            engine,
            session.clone(),
            sequencer.clone(),
            repository.clone(),
            notifier.clone(),
        );

        info!(contract = %ledger.address(), "tracker client created");
        Ok(Self {
            config,
            ledger,
            session,
            notifier,
            sequencer,
            repository,
            creation,
            reveal,
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // OPERATIONS
    // ════════════════════════════════════════════════════════════════════════

    /// Connected: initialize the engine (if needed) and sync. Disconnected:
    /// no-op. Initialization failure does not prevent the sync.
    pub async fn on_session_change(&self) -> Result<(), ClientError> {
        if !self.session.is_connected() {
            debug!("session disconnected; nothing to do");
            return Ok(());
        }
        let init = self.sequencer.ensure_ready().await;
        if let Err(e) = &init {
            warn!("engine not ready after session change: {}", e);
        }
        self.repository.refresh().await?;
        init.map(|_| ())
    }

    pub async fn ensure_ready(&self) -> Result<InitOutcome, ClientError> {
        self.sequencer.ensure_ready().await
    }

    pub async fn refresh(&self) -> Result<SyncReport, ClientError> {
        self.repository.refresh().await
    }

    pub async fn create_asset(&self, draft: &mut AssetDraft) -> Result<CreatedAsset, ClientError> {
        self.creation.create_asset(draft).await
    }

    pub async fn reveal_value(&self, asset_id: &str) -> Result<RevealedValue, ClientError> {
        self.reveal.reveal_value(asset_id).await
    }

    /// Probes the contract. `Ok(false)` is reported silently.
    pub async fn check_availability(&self) -> Result<bool, ClientError> {
        match self.ledger.is_available().await {
            Ok(true) => {
                self.notifier.success("Contract is available and working!");
                Ok(true)
            }
            Ok(false) => {
                info!("contract reports unavailable");
                Ok(false)
            }
            Err(e) => {
                warn!("availability check failed: {}", e);
                self.notifier.error("Availability check failed");
                Err(ClientError::Ledger(e))
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ════════════════════════════════════════════════════════════════════════

    pub fn snapshot(&self) -> Arc<AssetSnapshot> {
        self.repository.snapshot()
    }

    pub fn counters(&self) -> AggregateCounters {
        self.repository.counters()
    }

    pub fn search(&self, term: &str) -> Vec<AssetRecord> {
        self.repository
            .snapshot()
            .search(term)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn status(&self) -> TxStatus {
        self.notifier.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<TxStatus> {
        self.notifier.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.sequencer.is_ready()
    }

    pub fn is_refreshing(&self) -> bool {
        self.repository.is_refreshing()
    }

    pub fn contract_address(&self) -> Address {
        self.ledger.address()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Runs [`TrackerClient::on_session_change`] on every session change until
/// `shutdown_rx` turns true or either channel closes.
pub fn start_session_watcher(
    client: Arc<TrackerClient>,
    mut session_rx: watch::Receiver<SessionSnapshot>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("session watcher started");
        loop {
            tokio::select! {
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let snapshot = *session_rx.borrow_and_update();
            debug!(connected = snapshot.connected, "session changed");
            if let Err(e) = client.on_session_change().await {
                warn!("session change handling failed: {}", e);
            }
        }
        info!("session watcher stopped");
    })
}
