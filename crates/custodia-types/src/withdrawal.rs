//! Rolling withdrawal window state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;

/// Per-principal withdrawal accounting for the current window.
///
/// Reset lazily: a window is stale once `now >= window_start + window_len`.
/// A window whose end is past the representable range never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalWindow {
    pub window_start: DateTime<Utc>,
    pub withdrawn_in_window: Amount,
}

impl WithdrawalWindow {
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            withdrawn_in_window: 0,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, window_len: Duration) -> bool {
        self.window_start
            .checked_add_signed(window_len)
            .is_some_and(|end| now >= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_of_boundary() {
        let start = Utc::now();
        let w = WithdrawalWindow::fresh(start);
        let day = Duration::hours(24);
        assert!(!w.is_expired(start + Duration::hours(23), day));
        assert!(w.is_expired(start + day, day));
    }

    #[test]
    fn unrepresentable_window_end_never_expires() {
        let start = Utc::now();
        let w = WithdrawalWindow::fresh(start);
        assert!(!w.is_expired(start + Duration::days(365), Duration::seconds(9_000_000_000_000)));
    }
}
