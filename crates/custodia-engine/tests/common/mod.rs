//! Shared harness for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use custodia_engine::{CustodialLedger, InMemoryCustody, ManualClock, StaticCapabilities};
use custodia_types::{Amount, LedgerConfig, PrincipalId};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a test-writer subscriber once. `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

pub fn operator() -> PrincipalId {
    PrincipalId::from_u8(1)
}

pub fn fee_wallet() -> PrincipalId {
    PrincipalId::from_u8(2)
}

pub fn alice() -> PrincipalId {
    PrincipalId::from_u8(10)
}

pub fn bob() -> PrincipalId {
    PrincipalId::from_u8(11)
}

pub fn carol() -> PrincipalId {
    PrincipalId::from_u8(12)
}

pub struct Harness {
    pub ledger: CustodialLedger,
    pub clock: Arc<ManualClock>,
    pub custody: Arc<InMemoryCustody>,
    pub config: LedgerConfig,
}

impl Harness {
    /// `LedgerConfig::dummy()`: 50 bps, min 1, max 1000, limit 1_000_000,
    /// centralized.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::dummy())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let custody = Arc::new(InMemoryCustody::new());
        let ledger = CustodialLedger::new(
            &config,
            clock.clone(),
            Arc::new(StaticCapabilities::from_config(&config)),
            custody.clone(),
        )
        .unwrap();
        Self {
            ledger,
            clock,
            custody,
            config,
        }
    }

    /// Fund `who`'s external wallet and deposit `amount` for them.
    pub fn fund(&self, who: PrincipalId, amount: Amount) {
        self.custody.fund(who, amount);
        self.ledger.deposit(who, amount).unwrap();
    }

    /// Both conservation identities, plus the per-principal sum.
    pub fn assert_conserved(&self) {
        self.ledger.reconcile().unwrap();
        let snap = self.ledger.snapshot();
        let sum: Amount = snap.balances.values().sum();
        assert_eq!(sum, snap.total);
        assert!(snap.total <= snap.custody_balance);
    }
}
