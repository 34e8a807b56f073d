//! Ledger deployment configuration.
//!
//! Loaded once at startup (typically from JSON) and validated before the
//! engine is built. Runtime changes go through governance operations, never
//! through this struct.

use std::collections::HashSet;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{Amount, AuthorizationMode, CustodiaError, FeeConfig, PrincipalId, Result, constants};

/// Configuration for one Custodia ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Principal holding the operator capability.
    pub operator: PrincipalId,
    /// Principal credited with collected fees (platform wallet).
    pub fee_recipient: PrincipalId,
    /// Off-ledger settlement destinations (exactly `SETTLEMENT_DESTINATION_COUNT`).
    pub settlement_destinations: Vec<PrincipalId>,
    /// Initial fee policy.
    pub fee: FeeConfig,
    /// Per-principal cap on withdrawals within one window.
    pub daily_withdrawal_limit: Amount,
    /// Initial authorization mode.
    pub authorization_mode: AuthorizationMode,
    #[serde(default = "default_fee_change_delay_secs")]
    pub fee_change_delay_secs: u64,
    #[serde(default = "default_withdrawal_window_secs")]
    pub withdrawal_window_secs: u64,
    #[serde(default = "default_max_pause_duration_secs")]
    pub max_pause_duration_secs: u64,
}

fn default_fee_change_delay_secs() -> u64 {
    constants::DEFAULT_FEE_CHANGE_DELAY_SECS
}

fn default_withdrawal_window_secs() -> u64 {
    constants::DEFAULT_WITHDRAWAL_WINDOW_SECS
}

fn default_max_pause_duration_secs() -> u64 {
    constants::DEFAULT_MAX_PAUSE_DURATION_SECS
}

impl LedgerConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| CustodiaError::Configuration(format!("invalid JSON config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.operator.is_zero() {
            return Err(CustodiaError::Configuration("operator is unset".into()));
        }
        if self.fee_recipient.is_zero() {
            return Err(CustodiaError::Configuration("fee_recipient is unset".into()));
        }
        if self.settlement_destinations.len() != constants::SETTLEMENT_DESTINATION_COUNT {
            return Err(CustodiaError::Configuration(format!(
                "expected {} settlement destinations, got {}",
                constants::SETTLEMENT_DESTINATION_COUNT,
                self.settlement_destinations.len()
            )));
        }
        let mut seen = HashSet::new();
        for dest in &self.settlement_destinations {
            if dest.is_zero() {
                return Err(CustodiaError::Configuration(
                    "settlement destination is unset".into(),
                ));
            }
            if *dest == self.fee_recipient || *dest == self.operator {
                return Err(CustodiaError::Configuration(format!(
                    "settlement destination {dest} doubles as operator or fee recipient"
                )));
            }
            if !seen.insert(*dest) {
                return Err(CustodiaError::DuplicateSettlementDestination(*dest));
            }
        }
        self.fee.validate()?;
        if self.daily_withdrawal_limit == 0 {
            return Err(CustodiaError::Configuration(
                "daily_withdrawal_limit must be > 0".into(),
            ));
        }
        for (name, secs) in [
            ("fee_change_delay_secs", self.fee_change_delay_secs),
            ("withdrawal_window_secs", self.withdrawal_window_secs),
            ("max_pause_duration_secs", self.max_pause_duration_secs),
        ] {
            if secs == 0 || secs > constants::MAX_DURATION_SECS {
                return Err(CustodiaError::Configuration(format!(
                    "{name} out of range: {secs}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn fee_change_delay(&self) -> Duration {
        secs_to_duration(self.fee_change_delay_secs)
    }

    #[must_use]
    pub fn withdrawal_window(&self) -> Duration {
        secs_to_duration(self.withdrawal_window_secs)
    }

    #[must_use]
    pub fn max_pause_duration(&self) -> Duration {
        secs_to_duration(self.max_pause_duration_secs)
    }
}

fn secs_to_duration(secs: u64) -> Duration {
    let clamped = i64::try_from(secs.min(constants::MAX_DURATION_SECS)).unwrap_or(0);
    Duration::seconds(clamped)
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl LedgerConfig {
    /// Operator = 0x..01, fee recipient = 0x..02, destinations = 0x..d1..d5,
    /// fee 50 bps / [1, 1000], daily limit 1 000 000, centralized.
    #[must_use]
    pub fn dummy() -> Self {
        Self {
            operator: PrincipalId::from_u8(0x01),
            fee_recipient: PrincipalId::from_u8(0x02),
            settlement_destinations: (0xd1..=0xd5).map(PrincipalId::from_u8).collect(),
            fee: FeeConfig::default(),
            daily_withdrawal_limit: 1_000_000,
            authorization_mode: AuthorizationMode::Centralized,
            fee_change_delay_secs: constants::DEFAULT_FEE_CHANGE_DELAY_SECS,
            withdrawal_window_secs: constants::DEFAULT_WITHDRAWAL_WINDOW_SECS,
            max_pause_duration_secs: constants::DEFAULT_MAX_PAUSE_DURATION_SECS,
        }
    }
}
