//! Error taxonomy for the client pipelines.
//!
//! | Variant | Raised when | Side effects before failure |
//! |---------|-------------|-----------------------------|
//! | `Precondition` | no session, engine not ready, bad input | none |
//! | `Engine` | encryption/decryption engine call fails | none on-chain |
//! | `Transaction` | signer declines or chain reverts | tx may be mined as reverted |
//! | `Sync` | identifiers cannot be listed | previous snapshot kept |
//! | `Ledger` | a single read needed by a pipeline fails | none |
//! | `NotYetReadable` | verification raced, but reads still show the record unverified | none; retry later |
//!
//! A lost verification race is not an error; see
//! [`RevealSource::RaceRecovered`](crate::reveal::RevealSource::RaceRecovered).

use thiserror::Error;

use ctrack_common::{EngineError, LedgerError};

/// Input or environment problems detected before any side effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Please connect wallet first")]
    NoSession,

    #[error("Encryption engine is not ready")]
    EngineNotReady,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} is not a valid number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

/// Write-transaction failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("{0}")]
    Failed(String),
}

impl From<LedgerError> for TransactionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UserRejected => TransactionError::UserRejected,
            other => TransactionError::Failed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The ledger reports the value verified but no read shows it yet.
    #[error("{0} is verified on-chain but its value is not readable yet")]
    NotYetReadable(String),
}

impl ClientError {
    /// Whether the caller may simply invoke the operation again.
    ///
    /// Every pipeline failure leaves state unchanged, so only input
    /// problems need the user to change something first.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Precondition(PreconditionError::MissingField(_))
                | Self::Precondition(PreconditionError::InvalidNumber { .. })
                | Self::Precondition(PreconditionError::OutOfRange { .. })
        )
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self,
            Self::Transaction(TransactionError::UserRejected)
                | Self::Engine(EngineError::Submission(LedgerError::UserRejected))
        )
    }
}
