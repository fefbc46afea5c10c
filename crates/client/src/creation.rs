//! # Creation Pipeline
//!
//! Turns a user draft into an on-chain record with an encrypted value.
//!
//! ```text
//! AssetDraft
//!      │
//!      ▼ (0) Preconditions: session, fields, engine ready
//!      ▼ (1) Parse value, scale lat/lng ×10^6, assign identifier
//!      ▼ (2) EncryptionEngine::encrypt(contract, identity, value)
//!      ▼ (3) LedgerContract::create_business_data(..)   → status: pending
//!      ▼ (4) LedgerContract::wait_for_receipt(..)
//!      ▼ (5) status: success → AssetRepository::refresh() → draft cleared
//! CreatedAsset
//! ```
//!
//! ## Failure Policy
//!
//! Every failure is converted to an error status here and returned. The
//! draft is left untouched so the user can retry without re-entering data.
//! Nothing is submitted if encryption fails. The new record enters the
//! local snapshot only through the post-confirmation sync.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use ctrack_common::{
    to_fixed, CreateBusinessRequest, EncryptionEngine, Handle, LedgerContract, TxHash,
    WalletSession,
};

use crate::asset_sync::AssetRepository;
use crate::error::{ClientError, PreconditionError, TransactionError};
use crate::initializer::InitSequencer;
use crate::notifier::TxStatusNotifier;

const MAX_LATITUDE: f64 = 90.0;
const MAX_LONGITUDE: f64 = 180.0;

// ════════════════════════════════════════════════════════════════════════════
// INPUT
// ════════════════════════════════════════════════════════════════════════════

/// Raw form input, as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetDraft {
    pub name: String,
    pub value: String,
    pub description: String,
    pub latitude: String,
    pub longitude: String,
}

impl AssetDraft {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Draft after parsing and scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub value: u64,
    pub latitude_raw: i64,
    pub longitude_raw: i64,
}

/// Checks required fields and parses numbers.
///
/// An empty `value` parses to 0. A non-empty `value` that is not a
/// non-negative integer is rejected, as are unparsable or out-of-range
/// coordinates.
pub fn validate_draft(draft: &AssetDraft) -> Result<ValidatedDraft, PreconditionError> {
    if draft.name.trim().is_empty() {
        return Err(PreconditionError::MissingField("name"));
    }
    let latitude_raw = parse_coordinate("latitude", &draft.latitude, MAX_LATITUDE)?;
    let longitude_raw = parse_coordinate("longitude", &draft.longitude, MAX_LONGITUDE)?;
    let value = parse_value(&draft.value)?;

    Ok(ValidatedDraft {
        value,
        latitude_raw,
        longitude_raw,
    })
}

fn parse_value(raw: &str) -> Result<u64, PreconditionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| PreconditionError::InvalidNumber {
            field: "value",
            value: raw.to_string(),
        })
}

fn parse_coordinate(field: &'static str, raw: &str, limit: f64) -> Result<i64, PreconditionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PreconditionError::MissingField(field));
    }
    let parsed = trimmed
        .parse::<f64>()
        .map_err(|_| PreconditionError::InvalidNumber {
            field,
            value: raw.to_string(),
        })?;
    if !parsed.is_finite() || parsed.abs() > limit {
        return Err(PreconditionError::OutOfRange {
            field,
            value: raw.to_string(),
        });
    }
    to_fixed(parsed).ok_or(PreconditionError::OutOfRange {
        field,
        value: raw.to_string(),
    })
}

/// `<prefix>-<unix millis>-<8 random hex chars>`.
pub fn generate_business_id(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}-{}-{:08x}", prefix, millis, rand::random::<u32>())
}

// ════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAsset {
    pub business_id: String,
    pub handle: Handle,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

// ════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ════════════════════════════════════════════════════════════════════════════

pub struct CreationPipeline {
    ledger: Arc<dyn LedgerContract>,
    engine: Arc<dyn EncryptionEngine>,
    session: Arc<dyn WalletSession>,
    sequencer: Arc<InitSequencer>,
    repository: Arc<AssetRepository>,
    notifier: Arc<TxStatusNotifier>,
    id_prefix: String,
}

impl CreationPipeline {
    pub fn new(
        ledger: Arc<dyn LedgerContract>,
        engine: Arc<dyn EncryptionEngine>,
        session: Arc<dyn WalletSession>,
        sequencer: Arc<InitSequencer>,
        repository: Arc<AssetRepository>,
        notifier: Arc<TxStatusNotifier>,
        id_prefix: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            engine,
            session,
            sequencer,
            repository,
            notifier,
            id_prefix: id_prefix.into(),
        }
    }

    /// Runs the pipeline. On success `draft` is cleared; on failure it is
    /// left as it was and an error status is shown.
    pub async fn create_asset(&self, draft: &mut AssetDraft) -> Result<CreatedAsset, ClientError> {
        match self.run(draft).await {
            Ok(created) => {
                draft.clear();
                Ok(created)
            }
            Err(e) => {
                warn!("asset creation failed: {}", e);
                self.notifier.error(failure_message(&e));
                Err(e)
            }
        }
    }

    async fn run(&self, draft: &AssetDraft) -> Result<CreatedAsset, ClientError> {
        let identity = match (self.session.is_connected(), self.session.identity()) {
            (true, Some(identity)) => identity,
            _ => return Err(PreconditionError::NoSession.into()),
        };
        let input = validate_draft(draft)?;
        self.sequencer.require_ready()?;

        let business_id = generate_business_id(&self.id_prefix);
        let contract = self.ledger.address();
        info!(%business_id, "creating asset");

        self.notifier.pending("Creating asset with FHE encryption...");
        let encrypted = self.engine.encrypt(contract, identity, input.value).await?;

        let request = CreateBusinessRequest {
            business_id: business_id.clone(),
            name: draft.name.clone(),
            encrypted_handle: encrypted.handle,
            ciphertext: encrypted.ciphertext,
            input_proof: encrypted.proof,
            public_value1: input.latitude_raw,
            public_value2: input.longitude_raw,
            description: draft.description.clone(),
        };
        let tx_hash = self
            .ledger
            .create_business_data(identity, &request)
            .await
            .map_err(TransactionError::from)?;

        self.notifier.pending("Waiting for transaction confirmation...");
        let receipt = self
            .ledger
            .wait_for_receipt(&tx_hash)
            .await
            .map_err(TransactionError::from)?;

        info!(%business_id, %tx_hash, block = receipt.block_number, "asset created");
        self.notifier.success("Asset created successfully!");

        if let Err(e) = self.repository.refresh().await {
            warn!("post-creation sync failed: {}", e);
        }

        Ok(CreatedAsset {
            business_id,
            handle: encrypted.handle,
            tx_hash,
            block_number: receipt.block_number,
        })
    }
}

fn failure_message(err: &ClientError) -> String {
    match err {
        ClientError::Precondition(p) => p.to_string(),
        ClientError::Engine(e) => format!("Encryption failed: {}", e),
        ClientError::Transaction(TransactionError::UserRejected) => {
            "Transaction rejected by user".to_string()
        }
        ClientError::Transaction(TransactionError::Failed(msg)) => {
            format!("Submission failed: {}", msg)
        }
        other => format!("Submission failed: {}", other),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ctrack_common::{from_fixed, Address, EngineError, MockEngine, MockLedger, SessionState};

    use crate::notifier::TxPhase;

    struct Fixture {
        ledger: Arc<MockLedger>,
        engine: Arc<MockEngine>,
        session: Arc<SessionState>,
        sequencer: Arc<InitSequencer>,
        repository: Arc<AssetRepository>,
        notifier: Arc<TxStatusNotifier>,
        pipeline: CreationPipeline,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MockLedger::new(Address::from_bytes([0xC0; 20])));
        let engine = Arc::new(MockEngine::new());
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
        let repository = Arc::new(AssetRepository::new(ledger.clone(), notifier.clone(), 3600));
        let pipeline = CreationPipeline::new(
            ledger.clone(),
            engine.clone(),
            session.clone(),
            sequencer.clone(),
            repository.clone(),
            notifier.clone(),
            "asset",
        );
        Fixture { ledger, engine, session, sequencer, repository, notifier, pipeline }
    }

    async fn ready_fixture() -> Fixture {
        let f = fixture();
        f.session.connect(Address::from_bytes([0x5E; 20]));
        f.sequencer.ensure_ready().await.unwrap_or_else(|e| panic!("init: {}", e));
        f
    }

    fn draft() -> AssetDraft {
        AssetDraft {
            name: "Crate-1".to_string(),
            value: "500".to_string(),
            description: "test".to_string(),
            latitude: "12.34".to_string(),
            longitude: "56.78".to_string(),
        }
    }

    // ── Validation ──────────────────────────────────────────────────────

    #[test]
    fn validate_scales_coordinates() {
        let v = validate_draft(&draft()).unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(v.value, 500);
        assert_eq!(v.latitude_raw, 12_340_000);
        assert_eq!(v.longitude_raw, 56_780_000);
        assert!((from_fixed(v.latitude_raw) - 12.34).abs() < 1e-6);
    }

    #[test]
    fn validate_empty_value_is_zero() {
        let d = AssetDraft { value: String::new(), ..draft() };
        assert_eq!(validate_draft(&d).map(|v| v.value), Ok(0));
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let d = AssetDraft { name: "  ".into(), ..draft() };
        assert_eq!(validate_draft(&d), Err(PreconditionError::MissingField("name")));

        let d = AssetDraft { latitude: String::new(), ..draft() };
        assert_eq!(validate_draft(&d), Err(PreconditionError::MissingField("latitude")));

        let d = AssetDraft { value: "12abc".into(), ..draft() };
        assert!(matches!(validate_draft(&d), Err(PreconditionError::InvalidNumber { field: "value", .. })));

        let d = AssetDraft { value: "-5".into(), ..draft() };
        assert!(matches!(validate_draft(&d), Err(PreconditionError::InvalidNumber { .. })));

        let d = AssetDraft { longitude: "181".into(), ..draft() };
        assert!(matches!(validate_draft(&d), Err(PreconditionError::OutOfRange { field: "longitude", .. })));

        let d = AssetDraft { latitude: "NaN".into(), ..draft() };
        assert!(matches!(validate_draft(&d), Err(PreconditionError::OutOfRange { .. })));
    }

    #[test]
    fn business_ids_are_unique() {
        let a = generate_business_id("asset");
        let b = generate_business_id("asset");
        assert!(a.starts_with("asset-"));
        assert_ne!(a, b);
    }

    // ── Pipeline ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_success_refreshes_and_clears() {
        let f = ready_fixture().await;
        let mut d = draft();

        let created = f.pipeline.create_asset(&mut d).await.unwrap_or_else(|e| panic!("{}", e));
        assert!(d.is_empty());
        assert_eq!(f.ledger.creations_mined(), 1);

        let snap = f.repository.snapshot();
        let rec = snap.get(&created.business_id).unwrap_or_else(|| panic!("not synced"));
        assert_eq!(rec.name, "Crate-1");
        assert!(!rec.is_verified);
        assert!((rec.latitude - 12.34).abs() < 1e-6);
        assert!((rec.longitude - 56.78).abs() < 1e-6);
        assert_eq!(rec.encrypted_value_handle, created.handle);

        let status = f.notifier.current();
        assert_eq!(status.phase, TxPhase::Success);
        assert_eq!(status.message, "Asset created successfully!");
    }

    #[tokio::test]
    async fn missing_name_makes_no_calls() {
        let f = ready_fixture().await;
        let mut d = AssetDraft { name: String::new(), ..draft() };

        let result = f.pipeline.create_asset(&mut d).await;
        assert_eq!(result, Err(PreconditionError::MissingField("name").into()));
        assert_eq!(f.engine.encrypt_calls(), 0);
        assert_eq!(f.ledger.record_count(), 0);
        assert_eq!(d.value, "500");
    }

    #[tokio::test]
    async fn requires_session_and_readiness() {
        let f = fixture();
        let mut d = draft();
        assert_eq!(
            f.pipeline.create_asset(&mut d).await,
            Err(PreconditionError::NoSession.into())
        );
        assert_eq!(f.notifier.current().message, "Please connect wallet first");

        f.session.connect(Address::from_bytes([0x5E; 20]));
        assert_eq!(
            f.pipeline.create_asset(&mut d).await,
            Err(PreconditionError::EngineNotReady.into())
        );
        assert_eq!(f.engine.encrypt_calls(), 0);
    }

    #[tokio::test]
    async fn encryption_failure_submits_nothing() {
        let f = ready_fixture().await;
        f.engine.set_fail_encrypt(true);
        let mut d = draft();

        let result = f.pipeline.create_asset(&mut d).await;
        assert!(matches!(result, Err(ClientError::Engine(EngineError::ProofGeneration(_)))));
        assert_eq!(f.ledger.record_count(), 0);
        assert_eq!(d, draft());
        assert!(f.notifier.current().message.starts_with("Encryption failed"));
    }

    #[tokio::test]
    async fn user_rejection_keeps_draft() {
        let f = ready_fixture().await;
        f.ledger.reject_next_submission();
        let mut d = draft();

        let result = f.pipeline.create_asset(&mut d).await;
        assert_eq!(result, Err(TransactionError::UserRejected.into()));
        assert_eq!(d, draft());
        assert_eq!(f.notifier.current().message, "Transaction rejected by user");

        // Retry with the same draft succeeds.
        assert!(f.pipeline.create_asset(&mut d).await.is_ok());
        assert_eq!(f.ledger.creations_mined(), 1);
    }

    #[tokio::test]
    async fn revert_is_generic_failure() {
        let f = ready_fixture().await;
        f.ledger.revert_next("out of gas");
        let mut d = draft();

        let result = f.pipeline.create_asset(&mut d).await;
        assert!(matches!(result, Err(ClientError::Transaction(TransactionError::Failed(_)))));
        let status = f.notifier.current();
        assert_eq!(status.phase, TxPhase::Error);
        assert!(status.message.starts_with("Submission failed:"));
        assert!(status.message.contains("out of gas"));
        assert_eq!(d, draft());
    }
}
