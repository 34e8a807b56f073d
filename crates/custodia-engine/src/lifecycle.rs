//! Pause control and the emergency-withdraw escape hatch.
//!
//! While paused, deposits, payments and withdrawals fail `ContractPaused`.
//! Governance calls stay available. `emergency_withdraw` is the one
//! balance-moving call allowed while paused, and only once the pause has
//! lasted `max_pause`.

use chrono::{DateTime, Duration, Utc};
use custodia_types::{CustodiaError, LifecycleState, Result};

/// Gate for ledger mutations.
#[derive(Debug, Clone)]
pub struct LifecycleController {
    state: LifecycleState,
    max_pause: Duration,
}

impl LifecycleController {
    /// Start `Active`.
    #[must_use]
    pub fn new(max_pause: Duration) -> Self {
        Self {
            state: LifecycleState::Active,
            max_pause,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Guard an ordinary mutation.
    pub fn check_active(&self) -> Result<()> {
        if self.state.is_paused() {
            return Err(CustodiaError::ContractPaused);
        }
        Ok(())
    }

    /// `Active → Paused`, recording `now`.
    ///
    /// # Errors
    /// `ContractPaused` if already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.check_active()?;
        self.state = LifecycleState::Paused { paused_at: now };
        tracing::warn!(paused_at = %now, "Ledger paused");
        Ok(())
    }

    /// `Paused → Active`. Returns when the pause began.
    ///
    /// # Errors
    /// `NotPaused` if active.
    pub fn unpause(&mut self) -> Result<DateTime<Utc>> {
        let paused_at = self.state.paused_at().ok_or(CustodiaError::NotPaused)?;
        self.state = LifecycleState::Active;
        tracing::info!(%paused_at, "Ledger unpaused");
        Ok(paused_at)
    }

    /// When an emergency withdrawal becomes possible, if paused.
    ///
    /// # Errors
    /// `ArithmeticOverflow` if `paused_at + max_pause` is not a
    /// representable time.
    pub fn emergency_available_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.state
            .paused_at()
            .map(|at| {
                at.checked_add_signed(self.max_pause)
                    .ok_or(CustodiaError::ArithmeticOverflow {
                        context: "emergency withdraw available_at",
                    })
            })
            .transpose()
    }

    /// Guard `emergency_withdraw`.
    ///
    /// # Errors
    /// `NotPaused` while active; `PauseDurationNotElapsed` before
    /// `paused_at + max_pause`.
    pub fn check_emergency_withdraw(&self, now: DateTime<Utc>) -> Result<()> {
        let available_at = self
            .emergency_available_at()?
            .ok_or(CustodiaError::NotPaused)?;
        if now < available_at {
            return Err(CustodiaError::PauseDurationNotElapsed { available_at });
        }
        Ok(())
    }
}
