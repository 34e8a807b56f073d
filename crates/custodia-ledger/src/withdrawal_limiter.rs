//! Rolling per-principal withdrawal cap.
//!
//! Each principal has a window `{start, withdrawn}`. A window older than
//! `window_len` is reset lazily on the next check. A withdrawal passes only
//! if `withdrawn + amount <= daily_limit`.
//!
//! The check is split from the commit so the engine can reserve capacity
//! only after every other step of the withdrawal has succeeded.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use custodia_types::{Amount, CustodiaError, PrincipalId, Result, WithdrawalWindow};

/// Enforces the daily withdrawal cap.
#[derive(Debug, Clone)]
pub struct WithdrawalLimiter {
    daily_limit: Amount,
    window_len: Duration,
    windows: HashMap<PrincipalId, WithdrawalWindow>,
}

impl WithdrawalLimiter {
    #[must_use]
    pub fn new(daily_limit: Amount, window_len: Duration) -> Self {
        Self {
            daily_limit,
            window_len,
            windows: HashMap::new(),
        }
    }

    /// The window that applies at `now`, reset if the stored one is stale.
    fn current_window(&self, principal: &PrincipalId, now: DateTime<Utc>) -> WithdrawalWindow {
        match self.windows.get(principal) {
            Some(window) if !window.is_expired(now, self.window_len) => *window,
            _ => WithdrawalWindow::fresh(now),
        }
    }

    /// Validate a withdrawal and return the window to commit if it proceeds.
    ///
    /// # Errors
    /// `WithdrawalLimitExceeded` with the would-be window total.
    pub fn check(
        &self,
        principal: &PrincipalId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalWindow> {
        let mut window = self.current_window(principal, now);
        let new_total = window.withdrawn_in_window.checked_add(amount).ok_or(
            CustodiaError::ArithmeticOverflow {
                context: "withdrawal window",
            },
        )?;
        if new_total > self.daily_limit {
            return Err(CustodiaError::WithdrawalLimitExceeded {
                requested: new_total,
                limit: self.daily_limit,
            });
        }
        window.withdrawn_in_window = new_total;
        Ok(window)
    }

    /// Store a window returned by [`check`](Self::check).
    pub fn commit(&mut self, principal: PrincipalId, window: WithdrawalWindow) {
        self.windows.insert(principal, window);
    }

    /// `check` then `commit` in one step.
    pub fn check_and_reserve(
        &mut self,
        principal: PrincipalId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let window = self.check(&principal, amount, now)?;
        self.commit(principal, window);
        Ok(())
    }

    /// How much `principal` may still withdraw in the window containing `now`.
    #[must_use]
    pub fn remaining(&self, principal: &PrincipalId, now: DateTime<Utc>) -> Amount {
        let window = self.current_window(principal, now);
        self.daily_limit.saturating_sub(window.withdrawn_in_window)
    }

    /// Change the cap. Existing windows keep their running totals.
    ///
    /// # Errors
    /// `InvalidAmount` for a zero limit.
    pub fn set_limit(&mut self, limit: Amount) -> Result<()> {
        if limit == 0 {
            return Err(CustodiaError::InvalidAmount {
                reason: "daily withdrawal limit must be > 0".into(),
            });
        }
        tracing::info!(old = self.daily_limit, new = limit, "Daily withdrawal limit changed");
        self.daily_limit = limit;
        Ok(())
    }

    #[must_use]
    pub fn limit(&self) -> Amount {
        self.daily_limit
    }

    #[must_use]
    pub fn window(&self, principal: &PrincipalId) -> Option<WithdrawalWindow> {
        self.windows.get(principal).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: Amount) -> WithdrawalLimiter {
        WithdrawalLimiter::new(limit, Duration::hours(24))
    }

    #[test]
    fn limit_then_one_more_fails() {
        let mut l = limiter(1_000);
        let user = PrincipalId::from_u8(1);
        let now = Utc::now();
        l.check_and_reserve(user, 1_000, now).unwrap();
        let err = l
            .check_and_reserve(user, 1, now + Duration::hours(1))
            .unwrap_err();
        assert_eq!(
            err,
            CustodiaError::WithdrawalLimitExceeded {
                requested: 1_001,
                limit: 1_000
            }
        );
    }

    #[test]
    fn window_resets_after_24h() {
        let mut l = limiter(1_000);
        let user = PrincipalId::from_u8(1);
        let now = Utc::now();
        l.check_and_reserve(user, 1_000, now).unwrap();
        l.check_and_reserve(user, 1, now + Duration::hours(24)).unwrap();
        let window = l.window(&user).unwrap();
        assert_eq!(window.window_start, now + Duration::hours(24));
        assert_eq!(window.withdrawn_in_window, 1);
    }

    #[test]
    fn failed_check_does_not_consume_capacity() {
        let mut l = limiter(100);
        let user = PrincipalId::from_u8(1);
        let now = Utc::now();
        assert!(l.check_and_reserve(user, 101, now).is_err());
        assert_eq!(l.remaining(&user, now), 100);
        assert!(l.window(&user).is_none());
    }

    #[test]
    fn check_alone_does_not_commit() {
        let l = limiter(100);
        let user = PrincipalId::from_u8(1);
        let now = Utc::now();
        let window = l.check(&user, 60, now).unwrap();
        assert_eq!(window.withdrawn_in_window, 60);
        assert_eq!(l.remaining(&user, now), 100);
    }

    #[test]
    fn principals_are_independent() {
        let mut l = limiter(100);
        let now = Utc::now();
        l.check_and_reserve(PrincipalId::from_u8(1), 100, now).unwrap();
        l.check_and_reserve(PrincipalId::from_u8(2), 100, now).unwrap();
        assert_eq!(l.remaining(&PrincipalId::from_u8(1), now), 0);
    }

    #[test]
    fn remaining_reflects_stale_window() {
        let mut l = limiter(100);
        let user = PrincipalId::from_u8(1);
        let now = Utc::now();
        l.check_and_reserve(user, 70, now).unwrap();
        assert_eq!(l.remaining(&user, now), 30);
        assert_eq!(l.remaining(&user, now + Duration::days(1)), 100);
    }

    #[test]
    fn zero_limit_rejected() {
        let mut l = limiter(100);
        assert!(matches!(
            l.set_limit(0),
            Err(CustodiaError::InvalidAmount { .. })
        ));
        l.set_limit(5).unwrap();
        assert_eq!(l.limit(), 5);
    }
}
