//! # custodia-settlement
//!
//! **Payment plane**: turns a payment request into balance movements and an
//! immutable record.
//!
//! ## Architecture
//!
//! The [`PaymentProcessor`] receives a request and:
//! 1. Checks the caller against the active authorization mode
//! 2. Validates amount and principals
//! 3. Checks the idempotency registry (caller-supplied references only)
//! 4. Computes the fee via the fee policy
//! 5. Debits the sender, credits receiver and fee recipient
//! 6. For fiat payments, picks a settlement destination via the router
//! 7. Assigns monotonic ids and appends records
//!
//! Steps 5–7 are two-phase: `prepare_*` applies the balance movements inside
//! a ledger transaction and returns a [`PreparedPayments`]; `commit` makes
//! them durable and appends the records; `abort` rolls everything back.
//! The engine runs external side effects (custody transfers) and
//! reconciliation in between.

pub mod idempotency;
pub mod processor;
pub mod router;
pub mod supply_conservation;

pub use idempotency::IdempotencyRegistry;
pub use processor::{Authorization, Outflow, PaymentProcessor, PreparedPayments};
pub use router::{EntropyInputs, SettlementRouter};
pub use supply_conservation::SupplyConservation;
