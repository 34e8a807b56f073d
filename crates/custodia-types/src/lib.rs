//! # custodia-types
//!
//! Shared types, errors, and configuration for the **Custodia** payment ledger.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`PrincipalId`], [`PaymentId`], [`BatchId`], [`PaymentRef`]
//! - **Amounts**: [`Amount`] (unsigned, overflow-checked by every caller)
//! - **Fee model**: [`FeeConfig`], [`PendingFeeChange`], [`FeeInfo`]
//! - **Payment model**: [`PaymentRecord`], [`PaymentRequest`], [`PaymentKind`], [`PaymentStatus`], [`BatchReceipt`]
//! - **Governance model**: [`AuthorizationMode`], [`LifecycleState`]
//! - **Withdrawal model**: [`WithdrawalWindow`]
//! - **Configuration**: [`LedgerConfig`]
//! - **Collaborators**: [`Clock`], [`CapabilityCheck`], [`AssetCustody`]
//! - **Errors**: [`CustodiaError`] with `CX_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod fee;
pub mod governance;
pub mod ids;
pub mod payment;
pub mod withdrawal;

// Re-export all primary types at crate root for ergonomic imports:
//   use custodia_types::{PrincipalId, FeeConfig, PaymentRecord, ...};

pub use collaborators::*;
pub use config::*;
pub use error::*;
pub use fee::*;
pub use governance::*;
pub use ids::*;
pub use payment::*;
pub use withdrawal::*;

// Constants are accessed via `custodia_types::constants::FOO`
// (not re-exported to avoid name collisions).
