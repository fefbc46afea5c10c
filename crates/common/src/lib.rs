//! # ctrack Common Crate
//!
//! Shared model and collaborator seams for the confidential asset tracker.
//!
//! ## Modules
//! - `asset`: Asset Record model, fixed-point coordinates, aggregate counters
//! - `ledger`: `LedgerContract` trait and its wire types
//! - `engine`: `EncryptionEngine` / `ProofSubmitter` traits and clear-value encoding
//! - `session`: wallet session state
//! - `config`: client configuration
//! - `mock_ledger`: in-memory ledger for testing
//! - `mock_engine`: in-memory encryption engine for testing
//!
//! ## Collaborator Architecture
//! ```text
//!        ┌──────────────────┐      ┌──────────────────┐
//!        │  LedgerContract  │      │ EncryptionEngine │  <- Abstract traits
//!        └────────┬─────────┘      └────────┬─────────┘
//!                 │                         │
//!          ┌──────▼─────┐            ┌──────▼─────┐
//!          │ MockLedger │◀── proofs ─│ MockEngine │
//!          └────────────┘            └────────────┘
//! ```

pub mod asset;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod mock_engine;
pub mod mock_ledger;
pub mod session;

pub use asset::{from_fixed, to_fixed, AggregateCounters, AssetRecord, AssetStatus, COORD_SCALE};
pub use config::{ClientConfig, ConfigError};
pub use engine::{
    decode_clear_values, encode_clear_values, DecryptionOutcome, EncryptedInput, EncryptionEngine,
    EngineError, Handle, ProofSubmitter,
};
pub use ledger::{
    Address, BusinessData, CreateBusinessRequest, LedgerContract, LedgerError, TxHash, TxReceipt,
};
pub use mock_engine::MockEngine;
pub use mock_ledger::MockLedger;
pub use session::{SessionSnapshot, SessionState, WalletSession};
