//! # custodia-engine
//!
//! **Custodial ledger**: the single entry point for every operation.
//!
//! [`CustodialLedger`] owns all ledger state behind one exclusive lock.
//! Mutations (deposits, payments, batches, withdrawals, governance) take the
//! write side and run as one atomic transition: either every effect lands
//! or the state is exactly as before. Reads take the shared side and always
//! see a state in which every debit has its paired credit.
//!
//! After every mutation the engine reconciles:
//! ```text
//! Σ balances == total == deposits - withdrawals - outflows
//! total <= custody_balance
//! ```
//! and rolls the operation back if either identity would break.
//!
//! External systems are injected through the collaborator traits in
//! `custodia_types`; [`collaborators`] has in-memory implementations.

pub mod collaborators;
pub mod engine;
pub mod lifecycle;

pub use collaborators::{InMemoryCustody, ManualClock, StaticCapabilities, SystemClock};
pub use engine::{CustodialLedger, LedgerSnapshot};
pub use lifecycle::LifecycleController;
