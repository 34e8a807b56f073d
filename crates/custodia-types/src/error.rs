//! Error types for the Custodia ledger.
//!
//! All errors use the `CX_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Amount / principal validation
//! - 2xx: Balance and conservation errors
//! - 3xx: Payment errors
//! - 4xx: Authorization errors
//! - 5xx: Fee policy errors
//! - 6xx: Withdrawal errors
//! - 7xx: Lifecycle errors
//! - 8xx: Settlement routing errors
//! - 9xx: Collaborator / configuration / internal errors
//!
//! Every error is local and recoverable by the caller. An operation that
//! returns an error has left the ledger exactly as it found it.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{Amount, AuthorizationMode, PaymentRef, PrincipalId};

/// Central error enum for all Custodia operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodiaError {
    // =================================================================
    // Amount / Principal (1xx)
    // =================================================================
    /// Zero or otherwise unusable amount.
    #[error("CX_ERR_100: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Zero/unset principal, self-transfer, or a principal not allowed in this role.
    #[error("CX_ERR_101: Invalid principal: {reason}")]
    InvalidPrincipal { reason: String },

    /// The amount does not exceed the fee it would pay.
    #[error("CX_ERR_102: Amount {amount} too small to cover fee {fee}")]
    AmountTooSmall { amount: Amount, fee: Amount },

    /// A checked addition would have wrapped.
    #[error("CX_ERR_103: Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: &'static str },

    // =================================================================
    // Balance / Conservation (2xx)
    // =================================================================
    /// Not enough balance to perform the debit.
    #[error("CX_ERR_200: Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    /// Σ balances no longer matches the tracked total or recorded flows.
    #[error("CX_ERR_201: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    /// The ledger claims more than the custody collaborator actually holds.
    #[error("CX_ERR_202: Custody shortfall: ledger total {total} exceeds custodied {custodied}")]
    CustodyShortfall { total: Amount, custodied: Amount },

    // =================================================================
    // Payment (3xx)
    // =================================================================
    /// A caller-supplied reference was already applied.
    #[error("CX_ERR_300: Payment already processed: {0}")]
    AlreadyProcessed(PaymentRef),

    /// Batch holds more entries than allowed in one atomic unit.
    #[error("CX_ERR_301: Batch size {size} exceeds maximum {max}")]
    BatchSizeExceeded { size: usize, max: usize },

    /// Batches require centralized authorization.
    #[error("CX_ERR_302: Batch processing not allowed in {mode} mode")]
    BatchNotAllowed { mode: AuthorizationMode },

    /// A batch with no entries.
    #[error("CX_ERR_303: Empty batch")]
    EmptyBatch,

    // =================================================================
    // Authorization (4xx)
    // =================================================================
    /// Caller lacks the capability for an administrative action.
    #[error("CX_ERR_400: Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Caller may not submit this payment under the active authorization mode.
    #[error("CX_ERR_401: Unauthorized processor {caller} in {mode} mode")]
    UnauthorizedProcessor {
        caller: PrincipalId,
        mode: AuthorizationMode,
    },

    // =================================================================
    // Fee Policy (5xx)
    // =================================================================
    /// Execute or cancel with nothing proposed.
    #[error("CX_ERR_500: No pending fee change")]
    NoPendingChange,

    /// The timelock has not yet elapsed.
    #[error("CX_ERR_501: Fee change not ready until {effective_at}")]
    ChangeNotReady { effective_at: DateTime<Utc> },

    /// Proposed fee configuration violates policy bounds.
    #[error("CX_ERR_502: Invalid fee config: {reason}")]
    InvalidFeeConfig { reason: String },

    // =================================================================
    // Withdrawal (6xx)
    // =================================================================
    /// Rolling daily cap would be exceeded.
    #[error("CX_ERR_600: Withdrawal limit exceeded: window total {requested} > limit {limit}")]
    WithdrawalLimitExceeded { requested: Amount, limit: Amount },

    // =================================================================
    // Lifecycle (7xx)
    // =================================================================
    /// Mutating operation attempted while paused.
    #[error("CX_ERR_700: Ledger is paused")]
    ContractPaused,

    /// Operation requires the ledger to be paused.
    #[error("CX_ERR_701: Ledger is not paused")]
    NotPaused,

    /// Emergency withdrawal attempted before the maximum pause elapsed.
    #[error("CX_ERR_702: Pause duration not elapsed; emergency withdrawal opens at {available_at}")]
    PauseDurationNotElapsed { available_at: DateTime<Utc> },

    // =================================================================
    // Settlement Routing (8xx)
    // =================================================================
    /// The destination already occupies another slot.
    #[error("CX_ERR_800: Duplicate settlement destination: {0}")]
    DuplicateSettlementDestination(PrincipalId),

    /// Slot index outside the destination set.
    #[error("CX_ERR_801: Invalid settlement destination index {index}")]
    InvalidDestinationIndex { index: usize },

    // =================================================================
    // Collaborator / Config / Internal (9xx)
    // =================================================================
    /// The asset-custody collaborator refused or failed a transfer.
    #[error("CX_ERR_900: Custody transfer failed: {0}")]
    Custody(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CX_ERR_901: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("CX_ERR_902: Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable internal error.
    #[error("CX_ERR_999: Internal error: {0}")]
    Internal(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CustodiaError>;

impl From<serde_json::Error> for CustodiaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
