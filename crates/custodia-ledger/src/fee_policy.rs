//! Fee computation and the timelocked change protocol.
//!
//! ```text
//! fee = clamp(floor(amount * bps / 10_000), min_fee, max_fee)
//! ```
//!
//! With `bps == 0` the floor is still charged. When `amount * bps` would
//! overflow, the fee is the ceiling.
//!
//! Changing the config is two-phase: `propose_change` opens a single
//! pending slot with `effective_at = now + delay`; `execute_change` swaps
//! it in only once that time has passed; `cancel_change` discards it.

use chrono::{DateTime, Duration, Utc};
use custodia_types::{
    Amount, CustodiaError, FeeConfig, FeeInfo, PendingFeeChange, Result, constants,
};

/// Active fee config plus at most one pending change.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    active: FeeConfig,
    pending: Option<PendingFeeChange>,
    delay: Duration,
}

impl FeePolicy {
    /// Create a policy with a validated initial config and change delay.
    pub fn new(config: FeeConfig, delay: Duration) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            active: config,
            pending: None,
            delay,
        })
    }

    /// Fee charged on a payment of `amount`.
    ///
    /// Always within `[min_fee, max_fee]` of the active config.
    #[must_use]
    pub fn compute_fee(&self, amount: Amount) -> Amount {
        let FeeConfig {
            percentage_bps,
            min_fee,
            max_fee,
        } = self.active;

        if percentage_bps == 0 {
            return min_fee;
        }

        let bps = Amount::from(percentage_bps);
        let percentage_fee = if amount > constants::MAX_AMOUNT / bps {
            max_fee
        } else {
            amount * bps / Amount::from(constants::BPS_DENOMINATOR)
        };

        let fee = percentage_fee.max(min_fee).min(max_fee);
        tracing::debug!(amount, percentage_fee, fee, "Fee computed");
        fee
    }

    /// Propose a new config. Replaces any earlier proposal.
    ///
    /// # Errors
    /// `InvalidFeeConfig` if the proposal violates policy bounds;
    /// `ArithmeticOverflow` if `now + delay` is not a representable time.
    pub fn propose_change(
        &mut self,
        new_config: FeeConfig,
        now: DateTime<Utc>,
    ) -> Result<PendingFeeChange> {
        new_config.validate()?;
        let effective_at = now
            .checked_add_signed(self.delay)
            .ok_or(CustodiaError::ArithmeticOverflow {
                context: "fee change effective_at",
            })?;
        let change = PendingFeeChange {
            new_config,
            proposed_at: now,
            effective_at,
        };
        if let Some(previous) = self.pending.replace(change) {
            tracing::info!(
                superseded_effective_at = %previous.effective_at,
                "Pending fee change superseded"
            );
        }
        tracing::info!(
            bps = new_config.percentage_bps,
            min_fee = new_config.min_fee,
            max_fee = new_config.max_fee,
            effective_at = %change.effective_at,
            "Fee change proposed"
        );
        Ok(change)
    }

    /// Apply the pending config once its timelock has elapsed.
    ///
    /// # Errors
    /// `NoPendingChange` if nothing is proposed; `ChangeNotReady` if
    /// `now < effective_at`.
    pub fn execute_change(&mut self, now: DateTime<Utc>) -> Result<FeeConfig> {
        let change = self.pending.ok_or(CustodiaError::NoPendingChange)?;
        if !change.is_ready(now) {
            return Err(CustodiaError::ChangeNotReady {
                effective_at: change.effective_at,
            });
        }
        self.active = change.new_config;
        self.pending = None;
        tracing::info!(
            bps = self.active.percentage_bps,
            min_fee = self.active.min_fee,
            max_fee = self.active.max_fee,
            "Fee change executed"
        );
        Ok(self.active)
    }

    /// Discard the pending proposal.
    ///
    /// # Errors
    /// `NoPendingChange` if nothing is proposed.
    pub fn cancel_change(&mut self) -> Result<PendingFeeChange> {
        let change = self.pending.take().ok_or(CustodiaError::NoPendingChange)?;
        tracing::info!(effective_at = %change.effective_at, "Fee change cancelled");
        Ok(change)
    }

    #[must_use]
    pub fn config(&self) -> FeeConfig {
        self.active
    }

    #[must_use]
    pub fn pending(&self) -> Option<PendingFeeChange> {
        self.pending
    }

    /// Read view for callers.
    #[must_use]
    pub fn info(&self) -> FeeInfo {
        FeeInfo {
            config: self.active,
            percentage: self.active.percentage(),
            pending: self.pending,
        }
    }
}
