//! System-wide constants for the Custodia ledger.

use crate::Amount;

/// Largest representable amount. Fee arithmetic clamps rather than overflow.
pub const MAX_AMOUNT: Amount = Amount::MAX;

/// Basis-point denominator (100% = 10 000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Upper bound on the fee percentage (10%).
pub const MAX_PERCENTAGE_BPS: u32 = 1_000;

/// Upper bound on `FeeConfig::max_fee`, in smallest asset units.
pub const ABSOLUTE_MAX_FEE: Amount = 1_000_000_000_000;

/// Mandatory delay between proposing and executing a fee change (24h).
pub const DEFAULT_FEE_CHANGE_DELAY_SECS: u64 = 24 * 60 * 60;

/// Length of the rolling per-principal withdrawal window (24h).
pub const DEFAULT_WITHDRAWAL_WINDOW_SECS: u64 = 24 * 60 * 60;

/// How long the ledger may stay paused before `emergency_withdraw` opens (7 days).
pub const DEFAULT_MAX_PAUSE_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Maximum entries in a single atomic payment batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// Number of off-ledger settlement destinations.
pub const SETTLEMENT_DESTINATION_COUNT: usize = 5;

/// Upper bound on any configured duration (10 years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;
