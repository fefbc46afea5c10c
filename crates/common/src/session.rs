//! Wallet session: connection status and the active identity.
//!
//! [`SessionState`] is the in-process implementation. Every change is
//! published on a `watch` channel so consumers can react to reconnects.

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::ledger::Address;

/// Read side of the wallet/session layer.
pub trait WalletSession: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Active identity. `None` while disconnected.
    fn identity(&self) -> Option<Address>;
}

/// Snapshot published on every session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub identity: Option<Address>,
}

pub struct SessionState {
    current: RwLock<SessionSnapshot>,
    changes: watch::Sender<SessionSnapshot>,
}

impl SessionState {
    /// Creates a disconnected session.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(SessionSnapshot::default());
        Self {
            current: RwLock::new(SessionSnapshot::default()),
            changes,
        }
    }

    pub fn connect(&self, identity: Address) {
        self.set(SessionSnapshot {
            connected: true,
            identity: Some(identity),
        });
    }

    pub fn disconnect(&self) {
        self.set(SessionSnapshot::default());
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.current.read()
    }

    fn set(&self, snapshot: SessionSnapshot) {
        *self.current.write() = snapshot;
        // No receivers is fine.
        self.changes.send_replace(snapshot);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletSession for SessionState {
    fn is_connected(&self) -> bool {
        self.current.read().connected
    }

    fn identity(&self) -> Option<Address> {
        self.current.read().identity
    }
}
