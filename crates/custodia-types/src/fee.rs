//! Fee configuration and the single-slot pending change.
//!
//! Fees are a basis-point percentage clamped into `[min_fee, max_fee]`.
//! The active config changes only through a propose → wait → execute
//! cycle so participants see a raise coming before it applies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Amount, CustodiaError, Result, constants};

/// Percentage-with-floor-and-ceiling fee rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Basis points of the payment amount (50 = 0.5%).
    pub percentage_bps: u32,
    /// Floor. Charged even when `percentage_bps == 0`.
    pub min_fee: Amount,
    /// Ceiling.
    pub max_fee: Amount,
}

impl FeeConfig {
    /// Check policy bounds: percentage cap, absolute fee cap, `min <= max`.
    pub fn validate(&self) -> Result<()> {
        if self.percentage_bps > constants::MAX_PERCENTAGE_BPS {
            return Err(CustodiaError::InvalidFeeConfig {
                reason: format!(
                    "percentage_bps {} exceeds maximum {}",
                    self.percentage_bps,
                    constants::MAX_PERCENTAGE_BPS
                ),
            });
        }
        if self.max_fee > constants::ABSOLUTE_MAX_FEE {
            return Err(CustodiaError::InvalidFeeConfig {
                reason: format!(
                    "max_fee {} exceeds absolute cap {}",
                    self.max_fee,
                    constants::ABSOLUTE_MAX_FEE
                ),
            });
        }
        if self.min_fee > self.max_fee {
            return Err(CustodiaError::InvalidFeeConfig {
                reason: format!("min_fee {} > max_fee {}", self.min_fee, self.max_fee),
            });
        }
        Ok(())
    }

    /// The percentage as a human-readable decimal (50 bps → `0.50`).
    #[must_use]
    pub fn percentage(&self) -> Decimal {
        Decimal::new(i64::from(self.percentage_bps), 2)
    }
}

impl Default for FeeConfig {
    /// 0.5%, floor 1, ceiling 1 000.
    fn default() -> Self {
        Self {
            percentage_bps: 50,
            min_fee: 1,
            max_fee: 1_000,
        }
    }
}

/// A proposed fee config waiting out its timelock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFeeChange {
    pub new_config: FeeConfig,
    pub proposed_at: DateTime<Utc>,
    pub effective_at: DateTime<Utc>,
}

impl PendingFeeChange {
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        now >= self.effective_at
    }
}

/// Read view of the fee policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeInfo {
    pub config: FeeConfig,
    /// `config.percentage_bps` expressed in percent.
    pub percentage: Decimal,
    pub pending: Option<PendingFeeChange>,
}
