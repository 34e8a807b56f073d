//! # custodia-ledger
//!
//! **Accounting core**: who owns how much, what a payment costs, and how
//! much may leave per day.
//!
//! ## Components
//!
//! 1. **BalanceLedger**: principal → balance map with a running total and a
//!    rollback journal. The sole owner of balance state.
//! 2. **FeePolicy**: percentage fee clamped into `[min_fee, max_fee]`, with a
//!    propose → wait → execute change protocol.
//! 3. **WithdrawalLimiter**: rolling per-principal withdrawal cap.
//!
//! ## Conservation
//!
//! ```text
//! total() == Σ balance_of(p)        after every operation
//! ```
//!
//! Every mutating primitive validates before it writes, so a failed call
//! leaves the ledger untouched. Multi-step operations wrap themselves in
//! `begin()` / `commit()` / `rollback()`.

pub mod balance_ledger;
pub mod fee_policy;
pub mod withdrawal_limiter;

pub use balance_ledger::BalanceLedger;
pub use fee_policy::FeePolicy;
pub use withdrawal_limiter::WithdrawalLimiter;
