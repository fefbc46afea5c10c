//! In-Memory Ledger Contract for Testing
//!
//! `MockLedger` implements [`LedgerContract`] without any network. It keeps
//! records in insertion order, issues transaction hashes on submission and
//! mines them on [`wait_for_receipt`](LedgerContract::wait_for_receipt).
//!
//! # Contract Rules Enforced
//!
//! - Creation: identifier must be new; input proof must match
//!   (contract, sender, handle).
//! - Verification: record must exist and be unverified; decryption proof
//!   must match (handle, encoded clear value). Checked at submission
//!   (simulation) and again at mining, so two verifications that are both
//!   pending resolve to one mined and one [`LedgerError::AlreadyVerified`].
//!
//! # Failure Injection
//!
//! - `set_fail_listing`: `get_all_business_ids` fails
//! - `fail_record`: `get_business_data` fails for one identifier
//! - `reject_next_submission`: the signer declines the next write
//! - `revert_next`: the next mined transaction reverts with a reason
//! - `set_available`: result of the availability probe

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha3::{Digest, Sha3_256};
use tracing::{debug, warn};

use crate::engine::{decode_clear_values, Handle};
use crate::ledger::{
    Address, BusinessData, CreateBusinessRequest, LedgerContract, LedgerError, TxHash, TxReceipt,
};
use crate::mock_engine::{decryption_proof, input_proof};

// ════════════════════════════════════════════════════════════════════════════
// INTERNAL STATE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum PendingTx {
    Create {
        sender: Address,
        request: CreateBusinessRequest,
    },
    Verify {
        business_id: String,
        encoded_clear_values: Vec<u8>,
        proof: Vec<u8>,
    },
}

#[derive(Default)]
struct LedgerState {
    order: Vec<String>,
    records: HashMap<String, BusinessData>,
    pending: HashMap<TxHash, PendingTx>,
    mined: HashMap<TxHash, TxReceipt>,
    block_number: u64,
    tx_nonce: u64,
    creations_mined: u64,
    verifications_mined: u64,
}

#[derive(Default)]
struct Faults {
    fail_listing: bool,
    failing_records: HashSet<String>,
    reject_next: bool,
    revert_next: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════
// MOCK LEDGER
// ════════════════════════════════════════════════════════════════════════════

pub struct MockLedger {
    address: Address,
    state: Mutex<LedgerState>,
    faults: Mutex<Faults>,
    available: AtomicBool,
}

impl MockLedger {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: Mutex::new(LedgerState::default()),
            faults: Mutex::new(Faults::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Seeds a record directly, bypassing transactions.
    pub fn insert_record(&self, business_id: &str, data: BusinessData) {
        let mut state = self.state.lock();
        if state.records.insert(business_id.to_string(), data).is_none() {
            state.order.push(business_id.to_string());
        }
    }

    /// Current stored record, if any.
    pub fn record(&self, business_id: &str) -> Option<BusinessData> {
        self.state.lock().records.get(business_id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn creations_mined(&self) -> u64 {
        self.state.lock().creations_mined
    }

    pub fn verifications_mined(&self) -> u64 {
        self.state.lock().verifications_mined
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.faults.lock().fail_listing = fail;
    }

    pub fn fail_record(&self, business_id: &str) {
        self.faults.lock().failing_records.insert(business_id.to_string());
    }

    pub fn heal_record(&self, business_id: &str) {
        self.faults.lock().failing_records.remove(business_id);
    }

    pub fn reject_next_submission(&self) {
        self.faults.lock().reject_next = true;
    }

    pub fn revert_next(&self, reason: &str) {
        self.faults.lock().revert_next = Some(reason.to_string());
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn take_rejection(&self) -> Result<(), LedgerError> {
        let mut faults = self.faults.lock();
        if faults.reject_next {
            faults.reject_next = false;
            return Err(LedgerError::UserRejected);
        }
        Ok(())
    }

    fn next_tx_hash(&self, state: &mut LedgerState) -> TxHash {
        state.tx_nonce += 1;
        let mut hasher = Sha3_256::new();
        hasher.update(self.address.as_bytes());
        hasher.update(state.tx_nonce.to_be_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        TxHash(out)
    }

    fn check_create(
        &self,
        state: &LedgerState,
        sender: Address,
        request: &CreateBusinessRequest,
    ) -> Result<(), LedgerError> {
        if state.records.contains_key(&request.business_id) {
            return Err(LedgerError::Reverted(format!(
                "business id already exists: {}",
                request.business_id
            )));
        }
        if request.input_proof != input_proof(self.address, sender, &request.encrypted_handle) {
            return Err(LedgerError::Reverted("invalid input proof".to_string()));
        }
        Ok(())
    }

    /// Returns the clear value on success.
    fn check_verify(
        state: &LedgerState,
        business_id: &str,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> Result<u64, LedgerError> {
        let record = state
            .records
            .get(business_id)
            .ok_or_else(|| LedgerError::NotFound(business_id.to_string()))?;
        if record.is_verified {
            return Err(LedgerError::AlreadyVerified(business_id.to_string()));
        }
        let handle: Handle = record.encrypted_value;
        if proof != decryption_proof(&[handle], encoded_clear_values).as_slice() {
            return Err(LedgerError::Reverted("invalid decryption proof".to_string()));
        }
        let values = decode_clear_values(encoded_clear_values).map_err(LedgerError::Reverted)?;
        match values.as_slice() {
            [value] => Ok(*value),
            _ => Err(LedgerError::Reverted(format!(
                "expected one clear value, got {}",
                values.len()
            ))),
        }
    }

    fn execute(&self, state: &mut LedgerState, tx: PendingTx) -> Result<(), LedgerError> {
        match tx {
            PendingTx::Create { sender, request } => {
                self.check_create(state, sender, &request)?;
                let data = BusinessData {
                    name: request.name,
                    description: request.description,
                    encrypted_value: request.encrypted_handle,
                    public_value1: request.public_value1,
                    public_value2: request.public_value2,
                    creator: sender,
                    timestamp: Self::now_secs(),
                    is_verified: false,
                    decrypted_value: 0,
                };
                state.order.push(request.business_id.clone());
                state.records.insert(request.business_id, data);
                state.creations_mined += 1;
            }
            PendingTx::Verify {
                business_id,
                encoded_clear_values,
                proof,
            } => {
                let value = Self::check_verify(state, &business_id, &encoded_clear_values, &proof)?;
                if let Some(record) = state.records.get_mut(&business_id) {
                    record.is_verified = true;
                    record.decrypted_value = value;
                }
                state.verifications_mined += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerContract for MockLedger {
    fn address(&self) -> Address {
        self.address
    }

    async fn get_all_business_ids(&self) -> Result<Vec<String>, LedgerError> {
        if self.faults.lock().fail_listing {
            return Err(LedgerError::Network("listing unavailable".to_string()));
        }
        Ok(self.state.lock().order.clone())
    }

    async fn get_business_data(&self, business_id: &str) -> Result<BusinessData, LedgerError> {
        if self.faults.lock().failing_records.contains(business_id) {
            return Err(LedgerError::Network(format!("decode failed for {}", business_id)));
        }
        self.record(business_id)
            .ok_or_else(|| LedgerError::NotFound(business_id.to_string()))
    }

    async fn get_encrypted_value(&self, business_id: &str) -> Result<Handle, LedgerError> {
        self.state
            .lock()
            .records
            .get(business_id)
            .map(|r| r.encrypted_value)
            .ok_or_else(|| LedgerError::NotFound(business_id.to_string()))
    }

    async fn is_available(&self) -> Result<bool, LedgerError> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn create_business_data(
        &self,
        sender: Address,
        request: &CreateBusinessRequest,
    ) -> Result<TxHash, LedgerError> {
        self.take_rejection()?;
        let mut state = self.state.lock();
        self.check_create(&state, sender, request)?;

        let tx_hash = self.next_tx_hash(&mut state);
        state.pending.insert(
            tx_hash,
            PendingTx::Create {
                sender,
                request: request.clone(),
            },
        );
        debug!(%tx_hash, business_id = %request.business_id, "create submitted");
        Ok(tx_hash)
    }

    async fn verify_decryption(
        &self,
        _sender: Address,
        business_id: &str,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> Result<TxHash, LedgerError> {
        self.take_rejection()?;
        let mut state = self.state.lock();
        Self::check_verify(&state, business_id, encoded_clear_values, proof)?;

        let tx_hash = self.next_tx_hash(&mut state);
        state.pending.insert(
            tx_hash,
            PendingTx::Verify {
                business_id: business_id.to_string(),
                encoded_clear_values: encoded_clear_values.to_vec(),
                proof: proof.to_vec(),
            },
        );
        debug!(%tx_hash, business_id, "verification submitted");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxReceipt, LedgerError> {
        let mut state = self.state.lock();

        if let Some(receipt) = state.mined.get(tx_hash) {
            return Ok(receipt.clone());
        }
        let tx = state
            .pending
            .remove(tx_hash)
            .ok_or(LedgerError::UnknownTransaction(*tx_hash))?;

        if let Some(reason) = self.faults.lock().revert_next.take() {
            warn!(%tx_hash, %reason, "transaction reverted");
            return Err(LedgerError::Reverted(reason));
        }

        self.execute(&mut state, tx)?;
        state.block_number += 1;
        let receipt = TxReceipt {
            tx_hash: *tx_hash,
            block_number: state.block_number,
        };
        state.mined.insert(*tx_hash, receipt.clone());
        Ok(receipt)
    }
}
