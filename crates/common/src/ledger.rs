//! # Ledger Contract Abstraction
//!
//! Async seam over the on-chain asset contract. The client reads records
//! through it and submits the two write transactions it knows about:
//! record creation and decryption verification.
//!
//! ## Transaction Lifecycle
//!
//! ```text
//! create_business_data / verify_decryption
//!      │  (signer may decline → UserRejected)
//!      ▼
//!   TxHash (pending)
//!      │
//!      ▼
//! wait_for_receipt ──▶ TxReceipt (mined) | LedgerError::Reverted / AlreadyVerified
//! ```
//!
//! ## Contract for Implementors
//!
//! - MUST be `Send + Sync`.
//! - MUST NOT retry internally.
//! - MUST report a second verification of the same record as
//!   [`LedgerError::AlreadyVerified`], both at submission and at mining.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::engine::Handle;

// ════════════════════════════════════════════════════════════════════════════
// ADDRESS
// ════════════════════════════════════════════════════════════════════════════

/// 20-byte account or contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = String;

    /// Parses 40 hex characters, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        if trimmed.len() != 40 {
            return Err(format!(
                "address must be 40 hex characters, got {}",
                trimmed.len()
            ));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(trimmed, &mut out)
            .map_err(|e| format!("invalid address hex: {}", e))?;
        Ok(Self(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TRANSACTION TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Hash of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Record fields as returned by `getBusinessData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessData {
    pub name: String,
    pub description: String,
    pub encrypted_value: Handle,
    /// Latitude scaled by 10^6.
    pub public_value1: i64,
    /// Longitude scaled by 10^6.
    pub public_value2: i64,
    pub creator: Address,
    pub timestamp: u64,
    pub is_verified: bool,
    /// Zero until verified.
    pub decrypted_value: u64,
}

/// Arguments of `createBusinessData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBusinessRequest {
    pub business_id: String,
    pub name: String,
    pub encrypted_handle: Handle,
    pub ciphertext: Vec<u8>,
    /// Input proof produced by the encryption engine.
    pub input_proof: Vec<u8>,
    pub public_value1: i64,
    pub public_value2: i64,
    pub description: String,
}

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Errors from ledger reads and transactions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport-level failure talking to the chain.
    #[error("ledger network error: {0}")]
    Network(String),

    /// No record with this identifier.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The signer declined the transaction.
    #[error("user rejected transaction")]
    UserRejected,

    /// The record was verified by an earlier transaction.
    #[error("Data already verified: {0}")]
    AlreadyVerified(String),

    /// Chain-level failure (execution reverted, out of gas, bad proof).
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// `wait_for_receipt` was called with a hash the ledger never issued.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(TxHash),
}

// ════════════════════════════════════════════════════════════════════════════
// LEDGER CONTRACT TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Read/write surface of the asset contract.
#[async_trait]
pub trait LedgerContract: Send + Sync {
    /// Deployed contract address.
    fn address(&self) -> Address;

    async fn get_all_business_ids(&self) -> Result<Vec<String>, LedgerError>;

    async fn get_business_data(&self, business_id: &str) -> Result<BusinessData, LedgerError>;

    async fn get_encrypted_value(&self, business_id: &str) -> Result<Handle, LedgerError>;

    async fn is_available(&self) -> Result<bool, LedgerError>;

    /// Submits a creation transaction signed by `sender`.
    async fn create_business_data(
        &self,
        sender: Address,
        request: &CreateBusinessRequest,
    ) -> Result<TxHash, LedgerError>;

    /// Submits clear values and their decryption proof for on-chain checking.
    async fn verify_decryption(
        &self,
        sender: Address,
        business_id: &str,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> Result<TxHash, LedgerError>;

    /// Waits until the transaction is mined or reverted.
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxReceipt, LedgerError>;
}
