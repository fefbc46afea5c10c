//! # Initialization Sequencer
//!
//! Brings the encryption engine to a ready state once a wallet session
//! exists, and gates both pipelines behind that readiness.
//!
//! ## Guarantees
//!
//! - At most one `initialize` call in flight. Calls made while one is
//!   running return [`InitOutcome::InProgress`] immediately; they are not
//!   queued.
//! - On failure an error status is shown and readiness stays false, so a
//!   later call (e.g. after a session change) retries.
//! - Readiness never reverts once reached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use ctrack_common::{EncryptionEngine, WalletSession};

use crate::error::{ClientError, PreconditionError};
use crate::notifier::TxStatusNotifier;

/// What `ensure_ready` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Engine was already initialized; nothing happened.
    AlreadyReady,
    /// Another call is initializing; this one was suppressed.
    InProgress,
    /// No connected session yet; nothing happened.
    AwaitingSession,
    /// This call initialized the engine.
    Initialized,
}

/// Resets the in-flight flag when the attempt ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct InitSequencer {
    engine: Arc<dyn EncryptionEngine>,
    session: Arc<dyn WalletSession>,
    notifier: Arc<TxStatusNotifier>,
    ready: AtomicBool,
    in_progress: AtomicBool,
}

impl InitSequencer {
    pub fn new(
        engine: Arc<dyn EncryptionEngine>,
        session: Arc<dyn WalletSession>,
        notifier: Arc<TxStatusNotifier>,
    ) -> Self {
        Self {
            engine,
            session,
            notifier,
            ready: AtomicBool::new(false),
            in_progress: AtomicBool::new(false),
        }
    }

    pub async fn ensure_ready(&self) -> Result<InitOutcome, ClientError> {
        if !self.session.is_connected() {
            return Ok(InitOutcome::AwaitingSession);
        }
        if self.ready.load(Ordering::SeqCst) {
            return Ok(InitOutcome::AlreadyReady);
        }
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(InitOutcome::InProgress);
        }
        let _in_flight = InFlight(&self.in_progress);

        info!("initializing encryption engine");
        match self.engine.initialize().await {
            Ok(()) => {
                self.ready.store(true, Ordering::SeqCst);
                info!("encryption engine ready");
                Ok(InitOutcome::Initialized)
            }
            Err(e) => {
                error!("encryption engine initialization failed: {}", e);
                self.notifier.error("Encryption engine initialization failed");
                Err(ClientError::Engine(e))
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_initializing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Precondition check used by the pipelines.
    pub fn require_ready(&self) -> Result<(), PreconditionError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(PreconditionError::EngineNotReady)
        }
    }
}
