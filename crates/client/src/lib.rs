//! # ctrack Client
//!
//! Encrypt → submit → verify → decrypt orchestration for the confidential
//! asset tracker.
//!
//! ## Modules
//! - `initializer`: brings the encryption engine up once per session
//! - `asset_sync`: listing, per-record fetch, snapshot and counters
//! - `creation`: draft validation, encryption, submission, confirmation
//! - `reveal`: decryption with on-chain verification and race recovery
//! - `notifier`: single-slot transaction status with auto-clear
//! - `client`: `TrackerClient` coordinator and session watcher
//! - `error`: error taxonomy shared by the pipelines
//!
//! ## Data Flow
//! ```text
//!  AssetDraft ──▶ CreationPipeline ──encrypt──▶ EncryptionEngine
//!                        │
//!                        └──createBusinessData──▶ LedgerContract ◀──verifyDecryption──┐
//!                                                      │                              │
//!                                   AssetRepository ◀──┘      RevealPipeline ──decrypt┘
//!                                         │
//!                                   AssetSnapshot + AggregateCounters
//! ```

pub mod asset_sync;
pub mod client;
pub mod creation;
pub mod error;
pub mod initializer;
pub mod notifier;
pub mod reveal;

pub use asset_sync::{AssetRepository, AssetSnapshot, SyncReport};
pub use client::{start_session_watcher, TrackerClient};
pub use creation::{
    generate_business_id, validate_draft, AssetDraft, CreatedAsset, CreationPipeline,
    ValidatedDraft,
};
pub use error::{ClientError, PreconditionError, TransactionError};
pub use initializer::{InitOutcome, InitSequencer};
pub use notifier::{TxPhase, TxStatus, TxStatusNotifier};
pub use reveal::{RevealPipeline, RevealSource, RevealedValue};
