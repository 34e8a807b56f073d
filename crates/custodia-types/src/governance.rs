//! Governance state: who may submit payments, and whether the ledger is live.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide rule for who may submit a payment.
///
/// Switching takes effect for every payment submitted afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationMode {
    /// Only the ledger operator submits payments (and batches).
    Centralized,
    /// Only the paying principal submits its own payment. No batches.
    Decentralized,
}

impl AuthorizationMode {
    #[must_use]
    pub fn allows_batches(self) -> bool {
        matches!(self, Self::Centralized)
    }
}

impl fmt::Display for AuthorizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Centralized => write!(f, "CENTRALIZED"),
            Self::Decentralized => write!(f, "DECENTRALIZED"),
        }
    }
}

/// Pausable lifecycle of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Paused { paused_at: DateTime<Utc> },
}

impl LifecycleState {
    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    #[must_use]
    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Paused { paused_at } => Some(*paused_at),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Paused { paused_at } => write!(f, "PAUSED(since {paused_at})"),
        }
    }
}
