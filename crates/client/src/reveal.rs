//! # Decryption/Verification Pipeline
//!
//! Reveals the plaintext behind an asset's encrypted value, verifying it
//! on-chain the first time.
//!
//! ## State Machine (per asset, ledger-held)
//!
//! ```text
//!              decrypt + verifyDecryption mined
//! Unverified ────────────────────────────────────▶ Verified
//!     │                                               ▲
//!     └── verifyDecryption reverts AlreadyVerified ───┘  (race, treated as success)
//! ```
//!
//! ## Flow
//!
//! 1. Read the record fresh from the ledger (never from the snapshot).
//! 2. Verified → return the stored value. No engine call, no transaction.
//! 3. Unverified → read the handle, run the engine's decryption with a
//!    [`ProofSubmitter`] that sends `verifyDecryption` and waits for it.
//! 4. Success → re-sync, report, return the clear value for the handle.
//! 5. `AlreadyVerified` from engine or chain → re-sync and return the
//!    stored value, or `NotYetReadable` while reads still lag the chain.
//!    Any other failure → error status, state unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use ctrack_common::{
    Address, EncryptionEngine, EngineError, LedgerContract, LedgerError, ProofSubmitter,
    TxReceipt, WalletSession,
};

use crate::asset_sync::AssetRepository;
use crate::error::{ClientError, PreconditionError};
use crate::initializer::InitSequencer;
use crate::notifier::TxStatusNotifier;

// ════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ════════════════════════════════════════════════════════════════════════════

/// How the value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealSource {
    /// Record was already verified; read from the ledger.
    AlreadyVerified,
    /// This call decrypted and verified it.
    Decrypted,
    /// Another caller verified it while this call was in flight.
    RaceRecovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedValue {
    pub asset_id: String,
    pub value: u64,
    pub source: RevealSource,
}

// ════════════════════════════════════════════════════════════════════════════
// ON-CHAIN SUBMIT CALLBACK
// ════════════════════════════════════════════════════════════════════════════

/// Submits `verifyDecryption` for one asset and waits for it to be mined.
struct VerificationSubmitter<'a> {
    ledger: &'a dyn LedgerContract,
    notifier: &'a TxStatusNotifier,
    sender: Address,
    asset_id: &'a str,
}

#[async_trait]
impl<'a> ProofSubmitter for VerificationSubmitter<'a> {
    async fn submit(
        &self,
        encoded_clear_values: &[u8],
        proof: &[u8],
    ) -> Result<TxReceipt, LedgerError> {
        let tx_hash = self
            .ledger
            .verify_decryption(self.sender, self.asset_id, encoded_clear_values, proof)
            .await?;
        self.notifier.pending("Verifying decryption on-chain...");
        info!(asset_id = self.asset_id, %tx_hash, "verification submitted");
        self.ledger.wait_for_receipt(&tx_hash).await
    }
}

fn is_already_verified(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::Engine(EngineError::Submission(LedgerError::AlreadyVerified(_)))
            | ClientError::Ledger(LedgerError::AlreadyVerified(_))
    )
}

fn failure_message(err: &ClientError) -> String {
    match err {
        ClientError::Precondition(p) => p.to_string(),
        e if e.is_user_rejection() => "Transaction rejected by user".to_string(),
        ClientError::Engine(e) => format!("Decryption failed: {}", e),
        other => format!("Decryption failed: {}", other),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ════════════════════════════════════════════════════════════════════════════

pub struct RevealPipeline {
    ledger: Arc<dyn LedgerContract>,
    engine: Arc<dyn EncryptionEngine>,
    session: Arc<dyn WalletSession>,
    sequencer: Arc<InitSequencer>,
    repository: Arc<AssetRepository>,
    notifier: Arc<TxStatusNotifier>,
}

impl RevealPipeline {
    pub fn new(
        ledger: Arc<dyn LedgerContract>,
        engine: Arc<dyn EncryptionEngine>,
        session: Arc<dyn WalletSession>,
        sequencer: Arc<InitSequencer>,
        repository: Arc<AssetRepository>,
        notifier: Arc<TxStatusNotifier>,
    ) -> Self {
        Self {
            ledger,
            engine,
            session,
            sequencer,
            repository,
            notifier,
        }
    }

    pub async fn reveal_value(&self, asset_id: &str) -> Result<RevealedValue, ClientError> {
        match self.run(asset_id).await {
            Ok(revealed) => Ok(revealed),
            Err(e) if is_already_verified(&e) => self.recover_race(asset_id).await,
            Err(e) => {
                warn!(asset_id, "reveal failed: {}", e);
                self.notifier.error(failure_message(&e));
                Err(e)
            }
        }
    }

    async fn run(&self, asset_id: &str) -> Result<RevealedValue, ClientError> {
        let identity = match (self.session.is_connected(), self.session.identity()) {
            (true, Some(identity)) => identity,
            _ => return Err(PreconditionError::NoSession.into()),
        };
        self.sequencer.require_ready()?;

        let record = self.repository.fetch_record(asset_id).await?;
        if record.is_verified {
            let value = record.decrypted_value.unwrap_or(0);
            self.notifier.success("Data already verified on-chain");
            return Ok(RevealedValue {
                asset_id: asset_id.to_string(),
                value,
                source: RevealSource::AlreadyVerified,
            });
        }

        let handle = self.ledger.get_encrypted_value(asset_id).await?;
        let submitter = VerificationSubmitter {
            ledger: self.ledger.as_ref(),
            notifier: self.notifier.as_ref(),
            sender: identity,
            asset_id,
        };
        info!(asset_id, %handle, "requesting decryption");
        let outcome = self
            .engine
            .decrypt_and_verify(&[handle], self.ledger.address(), &submitter)
            .await?;

        let value = outcome
            .clear_values
            .get(&handle)
            .copied()
            .ok_or(EngineError::UnknownHandle(handle))?;

        if let Err(e) = self.repository.refresh().await {
            warn!("post-verification sync failed: {}", e);
        }
        info!(asset_id, block = outcome.receipt.block_number, "value verified on-chain");
        self.notifier.success("Data decrypted and verified successfully!");

        Ok(RevealedValue {
            asset_id: asset_id.to_string(),
            value,
            source: RevealSource::Decrypted,
        })
    }

    async fn recover_race(&self, asset_id: &str) -> Result<RevealedValue, ClientError> {
        info!(asset_id, "asset was verified concurrently");
        if let Err(e) = self.repository.refresh().await {
            warn!("post-race sync failed: {}", e);
        }

        let synced = self
            .repository
            .snapshot()
            .get(asset_id)
            .filter(|r| r.is_verified)
            .and_then(|r| r.decrypted_value);
        let value = match synced {
            Some(value) => value,
            None => {
                let record = self.repository.fetch_record(asset_id).await.map_err(|e| {
                    self.notifier.error(format!("Decryption failed: {}", e));
                    ClientError::Ledger(e)
                })?;
                match record.decrypted_value.filter(|_| record.is_verified) {
                    Some(value) => value,
                    None => {
                        warn!(asset_id, "verified on-chain but reads still show it unverified");
                        let err = ClientError::NotYetReadable(asset_id.to_string());
                        self.notifier.error(format!("Decryption failed: {}", err));
                        return Err(err);
                    }
                }
            }
        };

        self.notifier.success("Data is already verified on-chain");
        Ok(RevealedValue {
            asset_id: asset_id.to_string(),
            value,
            source: RevealSource::RaceRecovered,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ctrack_common::{
        BusinessData, CreateBusinessRequest, DecryptionOutcome, EncryptedInput, Handle,
        MockEngine, MockLedger, SessionState, TxHash,
    };

    use crate::notifier::TxPhase;

    struct Fixture {
        ledger: Arc<MockLedger>,
        engine: Arc<MockEngine>,
        session: Arc<SessionState>,
        sequencer: Arc<InitSequencer>,
        repository: Arc<AssetRepository>,
        notifier: Arc<TxStatusNotifier>,
        pipeline: RevealPipeline,
    }

    /// `seam` is what the pipeline talks to; `ledger` is the store behind it.
    fn fixture_with(
        ledger: Arc<MockLedger>,
        seam: Arc<dyn LedgerContract>,
        engine: Arc<dyn EncryptionEngine>,
        mock: Arc<MockEngine>,
    ) -> Fixture {
        let session = Arc::new(SessionState::new());
        let notifier = Arc::new(TxStatusNotifier::new(
            Duration::from_millis(2000),
            Duration::from_millis(3000),
        ));
        let sequencer = Arc::new(InitSequencer::new(
            engine.clone(),
            session.clone(),
            notifier.clone(),
        ));
        let repository = Arc::new(AssetRepository::new(seam.clone(), notifier.clone(), 3600));
        let pipeline = RevealPipeline::new(
            seam,
            engine,
            session.clone(),
            sequencer.clone(),
            repository.clone(),
            notifier.clone(),
        );
        Fixture { ledger, engine: mock, session, sequencer, repository, notifier, pipeline }
    }

    fn mock_ledger() -> Arc<MockLedger> {
        Arc::new(MockLedger::new(Address::from_bytes([0xC0; 20])))
    }

    fn fixture() -> Fixture {
        let mock = Arc::new(MockEngine::new());
        let ledger = mock_ledger();
        fixture_with(ledger.clone(), ledger, mock.clone(), mock)
    }

    async fn ready_fixture() -> Fixture {
        let f = fixture();
        f.session.connect(Address::from_bytes([0x5E; 20]));
        f.sequencer.ensure_ready().await.unwrap_or_else(|e| panic!("init: {}", e));
        f
    }

    /// Seeds an unverified record whose handle the engine can decrypt.
    fn seed_unverified(f: &Fixture, id: &str, handle_byte: u8, value: u64) -> Handle {
        let handle = Handle::from_bytes([handle_byte; 32]);
        f.engine.inject_value(handle, value);
        f.ledger.insert_record(
            id,
            BusinessData {
                name: id.to_string(),
                description: String::new(),
                encrypted_value: handle,
                public_value1: 0,
                public_value2: 0,
                creator: Address::from_bytes([0x5E; 20]),
                timestamp: crate::asset_sync::now_secs(),
                is_verified: false,
                decrypted_value: 0,
            },
        );
        handle
    }

    // ── Test 1: Unverified → decrypt, verify, sync ──────────────────────

    #[tokio::test]
    async fn reveal_unverified_value() {
        let f = ready_fixture().await;
        seed_unverified(&f, "asset-1", 0x01, 500);

        let revealed = f.pipeline.reveal_value("asset-1").await.unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(revealed.value, 500);
        assert_eq!(revealed.source, RevealSource::Decrypted);
        assert_eq!(f.ledger.verifications_mined(), 1);

        let rec = f.repository.snapshot().get("asset-1").cloned().unwrap_or_else(|| panic!("not synced"));
        assert!(rec.is_verified);
        assert_eq!(rec.decrypted_value, Some(500));
        assert_eq!(f.notifier.current().message, "Data decrypted and verified successfully!");
    }

    // ── Test 2: Verified path is a cheap read ───────────────────────────

    #[tokio::test]
    async fn reveal_twice_is_idempotent() {
        let f = ready_fixture().await;
        seed_unverified(&f, "asset-1", 0x01, 42);

        let first = f.pipeline.reveal_value("asset-1").await.unwrap_or_else(|e| panic!("{}", e));
        let calls = f.engine.decrypt_calls();

        let second = f.pipeline.reveal_value("asset-1").await.unwrap_or_else(|e| panic!("{}", e));
        let third = f.pipeline.reveal_value("asset-1").await.unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(first.value, second.value);
        assert_eq!(second.value, third.value);
        assert_eq!(second.source, RevealSource::AlreadyVerified);
        assert_eq!(f.engine.decrypt_calls(), calls);
        assert_eq!(f.ledger.verifications_mined(), 1);

        let status = f.notifier.current();
        assert_eq!(status.phase, TxPhase::Success);
        assert_eq!(status.message, "Data already verified on-chain");
    }

    // ── Test 3: Concurrent reveal on the same asset ─────────────────────

    #[tokio::test(start_paused = true)]
    async fn concurrent_reveal_race_recovers() {
        let f = ready_fixture().await;
        seed_unverified(&f, "asset-1", 0x01, 900);
        f.engine.set_latency(Duration::from_millis(50));

        let (a, b) = tokio::join!(
            f.pipeline.reveal_value("asset-1"),
            f.pipeline.reveal_value("asset-1")
        );
        let (a, b) = match (a, b) {
            (Ok(a), Ok(b)) => (a, b),
            other => panic!("both reveals must succeed: {:?}", other),
        };

        assert_eq!(a.value, 900);
        assert_eq!(b.value, 900);
        let mut sources = vec![a.source, b.source];
        sources.sort_by_key(|s| *s as u8);
        assert_eq!(sources, vec![RevealSource::Decrypted, RevealSource::RaceRecovered]);
        assert_eq!(f.ledger.verifications_mined(), 1);
        assert_eq!(f.ledger.record("asset-1").map(|r| r.is_verified), Some(true));
        assert_eq!(f.notifier.current().phase, TxPhase::Success);
    }

    // ── Test 4: Oracle failure leaves the asset unverified ──────────────

    #[tokio::test]
    async fn oracle_failure_is_reported() {
        let f = ready_fixture().await;
        seed_unverified(&f, "asset-1", 0x01, 7);
        f.engine.set_fail_decrypt(true);

        let result = f.pipeline.reveal_value("asset-1").await;
        assert!(matches!(result, Err(ClientError::Engine(EngineError::Oracle(_)))));
        assert_eq!(f.ledger.record("asset-1").map(|r| r.is_verified), Some(false));

        let status = f.notifier.current();
        assert_eq!(status.phase, TxPhase::Error);
        assert!(status.message.starts_with("Decryption failed:"));

        // Retry after the oracle recovers.
        f.engine.set_fail_decrypt(false);
        let revealed = f.pipeline.reveal_value("asset-1").await.unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(revealed.value, 7);
    }

    // ── Test 5: Signer declines the verification ────────────────────────

    #[tokio::test]
    async fn user_rejected_verification() {
        let f = ready_fixture().await;
        seed_unverified(&f, "asset-1", 0x01, 7);
        f.ledger.reject_next_submission();

        let result = f.pipeline.reveal_value("asset-1").await;
        let err = match result {
            Err(e) => e,
            Ok(v) => panic!("unexpected success: {:?}", v),
        };
        assert!(err.is_user_rejection());
        assert_eq!(f.ledger.verifications_mined(), 0);
        assert_eq!(f.notifier.current().message, "Transaction rejected by user");
    }

    // ── Test 6: Preconditions ───────────────────────────────────────────

    #[tokio::test]
    async fn preconditions_checked_first() {
        let f = fixture();
        seed_unverified(&f, "asset-1", 0x01, 7);

        assert_eq!(
            f.pipeline.reveal_value("asset-1").await,
            Err(PreconditionError::NoSession.into())
        );
        f.session.connect(Address::from_bytes([0x5E; 20]));
        assert_eq!(
            f.pipeline.reveal_value("asset-1").await,
            Err(PreconditionError::EngineNotReady.into())
        );
        assert_eq!(f.engine.decrypt_calls(), 0);
        assert_eq!(f.notifier.current().message, "Encryption engine is not ready");
    }

    // ── Test 7: Unknown asset ───────────────────────────────────────────

    #[tokio::test]
    async fn unknown_asset() {
        let f = ready_fixture().await;
        assert!(matches!(
            f.pipeline.reveal_value("nope").await,
            Err(ClientError::Ledger(LedgerError::NotFound(_)))
        ));
    }

    // ── Test 8: Engine reports the race without submitting ──────────────

    #[tokio::test]
    async fn engine_reported_race_is_success() {
        struct RacingEngine {
            ledger: Arc<MockLedger>,
        }

        #[async_trait]
        impl EncryptionEngine for RacingEngine {
            async fn initialize(&self) -> Result<(), EngineError> {
                Ok(())
            }

            async fn encrypt(
                &self,
                _contract: Address,
                _requester: Address,
                _value: u64,
            ) -> Result<EncryptedInput, EngineError> {
                Err(EngineError::Encryption("unused".into()))
            }

            async fn decrypt_and_verify(
                &self,
                _handles: &[Handle],
                _contract: Address,
                _submitter: &dyn ProofSubmitter,
            ) -> Result<DecryptionOutcome, EngineError> {
                // Someone else verifies first.
                let id = "asset-1";
                let mut rec = self
                    .ledger
                    .record(id)
                    .ok_or(EngineError::Oracle("missing".into()))?;
                rec.is_verified = true;
                rec.decrypted_value = 31;
                self.ledger.insert_record(id, rec);
                Err(EngineError::Submission(LedgerError::AlreadyVerified(id.into())))
            }
        }

        let ledger = mock_ledger();
        let racing = Arc::new(RacingEngine { ledger: ledger.clone() });
        let f = fixture_with(ledger.clone(), ledger, racing, Arc::new(MockEngine::new()));
        f.session.connect(Address::from_bytes([0x5E; 20]));
        f.sequencer.ensure_ready().await.unwrap_or_else(|e| panic!("init: {}", e));
        seed_unverified(&f, "asset-1", 0x01, 31);

        let revealed = f.pipeline.reveal_value("asset-1").await.unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(revealed.source, RevealSource::RaceRecovered);
        assert_eq!(revealed.value, 31);
        assert_eq!(f.notifier.current().message, "Data is already verified on-chain");
        assert_eq!(f.repository.snapshot().get("asset-1").map(|r| r.is_verified), Some(true));
    }

    // ── Test 9: Distinct assets keep distinct handles ───────────────────

    #[tokio::test]
    async fn reveals_two_assets_independently() {
        let f = ready_fixture().await;
        seed_unverified(&f, "asset-1", 0x01, 11);
        seed_unverified(&f, "asset-2", 0x02, 22);

        let a = f.pipeline.reveal_value("asset-1").await.unwrap_or_else(|e| panic!("{}", e));
        let b = f.pipeline.reveal_value("asset-2").await.unwrap_or_else(|e| panic!("{}", e));
        assert_eq!((a.value, b.value), (11, 22));
        assert_eq!(f.ledger.verifications_mined(), 2);
    }

    // ── Test 10: Race lost but reads still lag the chain ────────────────

    /// Chain already holds the verification; reads come from a stale view.
    struct LaggingLedger {
        inner: Arc<MockLedger>,
    }

    #[async_trait]
    impl LedgerContract for LaggingLedger {
        fn address(&self) -> Address {
            self.inner.address()
        }

        async fn get_all_business_ids(&self) -> Result<Vec<String>, LedgerError> {
            self.inner.get_all_business_ids().await
        }

        async fn get_business_data(&self, business_id: &str) -> Result<BusinessData, LedgerError> {
            self.inner.get_business_data(business_id).await
        }

        async fn get_encrypted_value(&self, business_id: &str) -> Result<Handle, LedgerError> {
            self.inner.get_encrypted_value(business_id).await
        }

        async fn is_available(&self) -> Result<bool, LedgerError> {
            self.inner.is_available().await
        }

        async fn create_business_data(
            &self,
            sender: Address,
            request: &CreateBusinessRequest,
        ) -> Result<TxHash, LedgerError> {
            self.inner.create_business_data(sender, request).await
        }

        async fn verify_decryption(
            &self,
            _sender: Address,
            business_id: &str,
            _encoded_clear_values: &[u8],
            _proof: &[u8],
        ) -> Result<TxHash, LedgerError> {
            Err(LedgerError::AlreadyVerified(business_id.to_string()))
        }

        async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxReceipt, LedgerError> {
            self.inner.wait_for_receipt(tx_hash).await
        }
    }

    #[tokio::test]
    async fn race_with_stale_reads_reports_no_value() {
        let mock = Arc::new(MockEngine::new());
        let ledger = mock_ledger();
        let lagging = Arc::new(LaggingLedger { inner: ledger.clone() });
        let f = fixture_with(ledger, lagging, mock.clone(), mock);
        f.session.connect(Address::from_bytes([0x5E; 20]));
        f.sequencer.ensure_ready().await.unwrap_or_else(|e| panic!("init: {}", e));
        seed_unverified(&f, "asset-1", 0x01, 777);

        let result = f.pipeline.reveal_value("asset-1").await;
        assert_eq!(result, Err(ClientError::NotYetReadable("asset-1".to_string())));
        assert!(matches!(&result, Err(e) if e.is_recoverable()));

        let status = f.notifier.current();
        assert_eq!(status.phase, TxPhase::Error);
        assert_ne!(status.message, "Data is already verified on-chain");
        assert_eq!(f.repository.snapshot().get("asset-1").and_then(|r| r.decrypted_value), None);
    }
}
