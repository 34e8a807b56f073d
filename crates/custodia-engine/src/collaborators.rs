//! In-memory collaborator implementations.
//!
//! Suitable for tests, simulations and single-process deployments where
//! custody is tracked rather than held by an external system.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use custodia_types::{
    Amount, AssetCustody, CapabilityCheck, Clock, CustodiaError, LedgerConfig, PrincipalId, Result,
};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock moved by hand. Lets tests cross timelocks and windows.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to `at`. May move backwards; the engine clamps.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Fixed operator set. Every caller is authenticated as itself.
#[derive(Debug, Clone)]
pub struct StaticCapabilities {
    operators: HashSet<PrincipalId>,
}

impl StaticCapabilities {
    #[must_use]
    pub fn new(operators: impl IntoIterator<Item = PrincipalId>) -> Self {
        Self {
            operators: operators.into_iter().collect(),
        }
    }

    /// Operator taken from the ledger config.
    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new([config.operator])
    }
}

impl CapabilityCheck for StaticCapabilities {
    fn is_operator(&self, caller: &PrincipalId) -> bool {
        self.operators.contains(caller)
    }

    fn is_principal(&self, caller: &PrincipalId, principal: &PrincipalId) -> bool {
        !caller.is_zero() && caller == principal
    }
}

// ---------------------------------------------------------------------------
// Custody
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Vault {
    held: Amount,
    /// Balances principals hold outside custody.
    wallets: HashMap<PrincipalId, Amount>,
}

/// Custody tracked in memory: a vault plus external wallets.
///
/// `transfer_in` moves from a wallet into the vault; `transfer_out` moves
/// from the vault to a wallet. Both are all-or-nothing.
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    vault: Mutex<Vault>,
    fail_transfers: AtomicBool,
}

impl InMemoryCustody {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `principal` external funds to deposit.
    pub fn fund(&self, principal: PrincipalId, amount: Amount) {
        let mut vault = self.vault.lock();
        let wallet = vault.wallets.entry(principal).or_insert(0);
        *wallet = wallet.saturating_add(amount);
    }

    /// Funds `principal` holds outside custody.
    #[must_use]
    pub fn wallet_balance(&self, principal: &PrincipalId) -> Amount {
        self.vault.lock().wallets.get(principal).copied().unwrap_or(0)
    }

    /// Make every following transfer fail until reset.
    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    /// Remove value from the vault without touching the ledger, as an
    /// out-of-band loss would.
    pub fn slash(&self, amount: Amount) {
        let mut vault = self.vault.lock();
        vault.held = vault.held.saturating_sub(amount);
    }

    fn check_enabled(&self) -> Result<()> {
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(CustodiaError::Custody("custody transfers disabled".into()));
        }
        Ok(())
    }
}

impl AssetCustody for InMemoryCustody {
    fn transfer_in(&self, from: &PrincipalId, amount: Amount) -> Result<()> {
        self.check_enabled()?;
        let mut vault = self.vault.lock();
        let available = vault.wallets.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(CustodiaError::Custody(format!(
                "wallet {from} holds {available}, needs {amount}"
            )));
        }
        let held = vault
            .held
            .checked_add(amount)
            .ok_or(CustodiaError::ArithmeticOverflow {
                context: "custody vault",
            })?;
        vault.wallets.insert(*from, available - amount);
        vault.held = held;
        Ok(())
    }

    fn transfer_out(&self, to: &PrincipalId, amount: Amount) -> Result<()> {
        self.check_enabled()?;
        let mut vault = self.vault.lock();
        if vault.held < amount {
            return Err(CustodiaError::Custody(format!(
                "vault holds {}, cannot release {amount}",
                vault.held
            )));
        }
        let wallet = vault.wallets.get(to).copied().unwrap_or(0);
        vault.held -= amount;
        vault.wallets.insert(*to, wallet.saturating_add(amount));
        Ok(())
    }

    fn custody_balance(&self) -> Amount {
        self.vault.lock().held
    }
}
