//! In-Memory Encryption Engine for Testing
//!
//! `MockEngine` stands in for the homomorphic-encryption toolkit and its
//! decryption oracle. Plaintexts live in an in-memory vault keyed by
//! handle; proofs are SHA3-256 digests over domain-separated inputs that
//! [`MockLedger`](crate::mock_ledger::MockLedger) checks on-chain.
//!
//! # Features
//!
//! - Deterministic handles (contract, requester, nonce, value)
//! - Call counters so tests can assert an engine call did NOT happen
//! - Configurable latency (async, non-blocking) to force interleavings
//! - Failure injection for initialization, encryption and decryption

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha3::{Digest, Sha3_256};
use tracing::debug;

use crate::engine::{
    encode_clear_values, DecryptionOutcome, EncryptedInput, EncryptionEngine, EngineError, Handle,
    ProofSubmitter,
};
use crate::ledger::Address;

const INPUT_PROOF_TAG: &[u8] = b"ctrack:input-proof:v1";
const DECRYPTION_PROOF_TAG: &[u8] = b"ctrack:decryption-proof:v1";
const HANDLE_TAG: &[u8] = b"ctrack:handle:v1";

// ════════════════════════════════════════════════════════════════════════════
// PROOF SCHEME
// ════════════════════════════════════════════════════════════════════════════

/// Input proof binding a handle to its contract and requester.
pub fn input_proof(contract: Address, requester: Address, handle: &Handle) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    hasher.update(INPUT_PROOF_TAG);
    hasher.update(contract.as_bytes());
    hasher.update(requester.as_bytes());
    hasher.update(handle.as_bytes());
    hasher.finalize().to_vec()
}

/// Decryption proof binding handles to their encoded clear values.
pub fn decryption_proof(handles: &[Handle], encoded_clear_values: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    hasher.update(DECRYPTION_PROOF_TAG);
    for handle in handles {
        hasher.update(handle.as_bytes());
    }
    hasher.update(encoded_clear_values);
    hasher.finalize().to_vec()
}

// ════════════════════════════════════════════════════════════════════════════
// MOCK ENGINE
// ════════════════════════════════════════════════════════════════════════════

pub struct MockEngine {
    initialized: AtomicBool,
    vault: Mutex<HashMap<Handle, u64>>,
    nonce: AtomicU64,
    latency: Mutex<Duration>,
    /// Number of upcoming `initialize` calls that fail.
    init_failures: AtomicU32,
    fail_encrypt: AtomicBool,
    fail_decrypt: AtomicBool,
    init_calls: AtomicU32,
    encrypt_calls: AtomicU32,
    decrypt_calls: AtomicU32,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            vault: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
            latency: Mutex::new(Duration::ZERO),
            init_failures: AtomicU32::new(0),
            fail_encrypt: AtomicBool::new(false),
            fail_decrypt: AtomicBool::new(false),
            init_calls: AtomicU32::new(0),
            encrypt_calls: AtomicU32::new(0),
            decrypt_calls: AtomicU32::new(0),
        }
    }

    /// Simulated latency applied to every engine call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Makes the next `count` initialization attempts fail.
    pub fn fail_next_inits(&self, count: u32) {
        self.init_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_encrypt(&self, fail: bool) {
        self.fail_encrypt.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_decrypt(&self, fail: bool) {
        self.fail_decrypt.store(fail, Ordering::SeqCst);
    }

    /// Stores a plaintext under a handle, as if encrypted earlier.
    pub fn inject_value(&self, handle: Handle, value: u64) {
        self.vault.lock().insert(handle, value);
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn encrypt_calls(&self) -> u32 {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> u32 {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_initialized(&self) -> Result<(), EngineError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    fn derive_handle(contract: Address, requester: Address, nonce: u64, value: u64) -> Handle {
        let mut hasher = Sha3_256::new();
        hasher.update(HANDLE_TAG);
        hasher.update(contract.as_bytes());
        hasher.update(requester.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(value.to_be_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Handle::from_bytes(out)
    }

    fn seal(handle: &Handle, value: u64) -> Vec<u8> {
        let pad = Sha3_256::digest(handle.as_bytes());
        value
            .to_be_bytes()
            .iter()
            .zip(pad.iter())
            .map(|(v, p)| v ^ p)
            .collect()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncryptionEngine for MockEngine {
    async fn initialize(&self) -> Result<(), EngineError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let remaining = self.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::InitFailed("relayer unreachable".to_string()));
        }

        self.initialized.store(true, Ordering::SeqCst);
        debug!("mock engine initialized");
        Ok(())
    }

    async fn encrypt(
        &self,
        contract: Address,
        requester: Address,
        value: u64,
    ) -> Result<EncryptedInput, EngineError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_initialized()?;
        self.simulate_latency().await;

        if self.fail_encrypt.load(Ordering::SeqCst) {
            return Err(EngineError::ProofGeneration("prover crashed".to_string()));
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let handle = Self::derive_handle(contract, requester, nonce, value);
        self.vault.lock().insert(handle, value);

        Ok(EncryptedInput {
            handle,
            ciphertext: Self::seal(&handle, value),
            proof: input_proof(contract, requester, &handle),
        })
    }

    async fn decrypt_and_verify(
        &self,
        handles: &[Handle],
        _contract: Address,
        submitter: &dyn ProofSubmitter,
    ) -> Result<DecryptionOutcome, EngineError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_initialized()?;
        self.simulate_latency().await;

        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(EngineError::Oracle("oracle timed out".to_string()));
        }

        let mut clear_values = HashMap::with_capacity(handles.len());
        let mut ordered = Vec::with_capacity(handles.len());
        {
            let vault = self.vault.lock();
            for handle in handles {
                let value = *vault.get(handle).ok_or(EngineError::UnknownHandle(*handle))?;
                clear_values.insert(*handle, value);
                ordered.push(value);
            }
        }

        let encoded = encode_clear_values(&ordered);
        let proof = decryption_proof(handles, &encoded);

        let receipt = submitter
            .submit(&encoded, &proof)
            .await
            .map_err(EngineError::Submission)?;

        Ok(DecryptionOutcome {
            clear_values,
            proof,
            receipt,
        })
    }
}
