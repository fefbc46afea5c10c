//! # Transaction Status Notifier
//!
//! Single-slot, user-visible status channel shared by the pipelines.
//!
//! ## Semantics
//!
//! | Phase | Auto-clear |
//! |-------|------------|
//! | `Pending` | never; replaced by the next `show` |
//! | `Success` | after `success_clear` (default 2 s) |
//! | `Error` | after `error_clear` (default 3 s) |
//!
//! ## Stale Timer Suppression
//!
//! Every `show` bumps a submission counter and aborts the previous clear
//! task. A clear task only hides the slot if the counter still equals the
//! value it was scheduled with, so a late timer never hides a newer message.
//!
//! ```text
//! show(Success,"a")  gen=1 ──timer(gen=1)──────────────▶ gen==2? no-op
//! show(Pending,"b")  gen=2 ── (no timer) ── visible until replaced
//! ```
//!
//! Consumers read [`current`](TxStatusNotifier::current) or
//! [`subscribe`](TxStatusNotifier::subscribe) to a `watch` channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ════════════════════════════════════════════════════════════════════════════
// STATUS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Pending,
    Success,
    Error,
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxPhase::Pending => f.write_str("pending"),
            TxPhase::Success => f.write_str("success"),
            TxPhase::Error => f.write_str("error"),
        }
    }
}

/// Contents of the status slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatus {
    pub visible: bool,
    pub phase: TxPhase,
    pub message: String,
}

impl TxStatus {
    /// The empty slot.
    pub fn hidden() -> Self {
        Self {
            visible: false,
            phase: TxPhase::Pending,
            message: String::new(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// NOTIFIER
// ════════════════════════════════════════════════════════════════════════════

struct Slot {
    /// Monotonic submission counter.
    generation: u64,
    clear_task: Option<JoinHandle<()>>,
}

pub struct TxStatusNotifier {
    slot: Arc<Mutex<Slot>>,
    status: Arc<watch::Sender<TxStatus>>,
    success_clear: Duration,
    error_clear: Duration,
}

impl TxStatusNotifier {
    pub fn new(success_clear: Duration, error_clear: Duration) -> Self {
        let (status, _) = watch::channel(TxStatus::hidden());
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                clear_task: None,
            })),
            status: Arc::new(status),
            success_clear,
            error_clear,
        }
    }

    /// Replaces the current status immediately.
    ///
    /// `Success` and `Error` schedule a clear on the current Tokio runtime.
    /// Outside a runtime the status stays until replaced.
    pub fn show(&self, phase: TxPhase, message: impl Into<String>) {
        let message = message.into();
        let mut slot = self.slot.lock();

        slot.generation += 1;
        let generation = slot.generation;
        if let Some(task) = slot.clear_task.take() {
            task.abort();
        }

        debug!(%phase, %message, generation, "status");
        self.status.send_replace(TxStatus {
            visible: true,
            phase,
            message,
        });

        let delay = match phase {
            TxPhase::Pending => return,
            TxPhase::Success => self.success_clear,
            TxPhase::Error => self.error_clear,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let slot_ref = Arc::clone(&self.slot);
                let status = Arc::clone(&self.status);
                slot.clear_task = Some(runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let slot = slot_ref.lock();
                    if slot.generation == generation {
                        status.send_replace(TxStatus::hidden());
                    }
                }));
            }
            Err(_) => warn!("no async runtime; status will not auto-clear"),
        }
    }

    pub fn pending(&self, message: impl Into<String>) {
        self.show(TxPhase::Pending, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.show(TxPhase::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.show(TxPhase::Error, message);
    }

    pub fn current(&self) -> TxStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TxStatus> {
        self.status.subscribe()
    }
}

impl fmt::Debug for TxStatusNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxStatusNotifier")
            .field("status", &*self.status.borrow())
            .field("success_clear", &self.success_clear)
            .field("error_clear", &self.error_clear)
            .finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
