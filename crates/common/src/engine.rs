//! # Encryption Engine Abstraction
//!
//! Async seam over the homomorphic-encryption toolkit. The engine turns a
//! plaintext into an encrypted input bound to a contract and requester, and
//! coordinates the off-chain decryption oracle for one or more handles.
//!
//! ## Decryption Flow
//!
//! ```text
//! decrypt_and_verify(handles, contract, submitter)
//!      │
//!      ├─ oracle decrypts handles → clear values + decryption proof
//!      ├─ submitter.submit(encode_clear_values(..), proof)   (on-chain verification)
//!      ▼
//! DecryptionOutcome { clear_values[handle], proof, receipt }
//! ```
//!
//! The engine never submits transactions itself; the caller supplies a
//! [`ProofSubmitter`] that does.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::ledger::{Address, LedgerError, TxReceipt};

/// Width of one ABI word in an encoded clear-value list.
pub const CLEAR_VALUE_WORD: usize = 32;

// ════════════════════════════════════════════════════════════════════════════
// HANDLE
// ════════════════════════════════════════════════════════════════════════════

/// Opaque ledger-side reference to an encrypted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle([u8; 32]);

impl Handle {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ENGINE OUTPUTS
// ════════════════════════════════════════════════════════════════════════════

/// Encrypted payload plus proof of well-formedness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handle: Handle,
    pub ciphertext: Vec<u8>,
    pub proof: Vec<u8>,
}

/// Result of a completed decryption round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionOutcome {
    /// Clear values keyed by the handle they were decrypted from.
    pub clear_values: HashMap<Handle, u64>,
    pub proof: Vec<u8>,
    /// Receipt of the verification transaction the submitter mined.
    pub receipt: TxReceipt,
}

// ════════════════════════════════════════════════════════════════════════════
// CLEAR VALUE ENCODING
// ════════════════════════════════════════════════════════════════════════════

/// ABI-encodes clear values as consecutive 32-byte big-endian words.
pub fn encode_clear_values(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * CLEAR_VALUE_WORD);
    for value in values {
        out.extend_from_slice(&[0u8; CLEAR_VALUE_WORD - 8]);
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

/// Inverse of [`encode_clear_values`].
///
/// Rejects lengths that are not a multiple of the word width and words
/// whose value does not fit in `u64`.
pub fn decode_clear_values(encoded: &[u8]) -> Result<Vec<u64>, String> {
    if encoded.len() % CLEAR_VALUE_WORD != 0 {
        return Err(format!(
            "encoded length {} is not a multiple of {}",
            encoded.len(),
            CLEAR_VALUE_WORD
        ));
    }
    encoded
        .chunks(CLEAR_VALUE_WORD)
        .map(|word| {
            let (high, low) = word.split_at(CLEAR_VALUE_WORD - 8);
            if high.iter().any(|b| *b != 0) {
                return Err("clear value exceeds u64".to_string());
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(low);
            Ok(u64::from_be_bytes(buf))
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Errors from the encryption engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("encryption engine not initialized")]
    NotInitialized,

    #[error("engine initialization failed: {0}")]
    InitFailed(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("proof generation failed: {0}")]
    ProofGeneration(String),

    /// The decryption oracle failed or refused the request.
    #[error("decryption oracle error: {0}")]
    Oracle(String),

    #[error("unknown handle: {0}")]
    UnknownHandle(Handle),

    /// The on-chain submit callback failed.
    #[error("{0}")]
    Submission(LedgerError),
}

// ════════════════════════════════════════════════════════════════════════════
// TRAITS
// ════════════════════════════════════════════════════════════════════════════

/// Callback that submits a decryption proof for on-chain verification and
/// waits for it to be mined.
#[async_trait]
pub trait ProofSubmitter: Send + Sync {
    async fn submit(
        &self,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> Result<TxReceipt, LedgerError>;
}

/// Encryption and decryption entry points of the toolkit.
#[async_trait]
pub trait EncryptionEngine: Send + Sync {
    /// Loads keys and connects to the relayer. Safe to call again after failure.
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Encrypts `value` for use by `contract` on behalf of `requester`.
    async fn encrypt(
        &self,
        contract: Address,
        requester: Address,
        value: u64,
    ) -> Result<EncryptedInput, EngineError>;

    /// Decrypts `handles` through the oracle and hands the proof to `submitter`.
    async fn decrypt_and_verify(
        &self,
        handles: &[Handle],
        contract: Address,
        submitter: &dyn ProofSubmitter,
    ) -> Result<DecryptionOutcome, EngineError>;
}
