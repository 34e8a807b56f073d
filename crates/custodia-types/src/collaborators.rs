//! Interfaces to the systems the ledger depends on but does not own.
//!
//! - [`Clock`]: source of time for timelocks, withdrawal windows, pauses.
//! - [`CapabilityCheck`]: answers "is this caller the operator" and
//!   "is this caller principal P". Replaces on-chain role modifiers.
//! - [`AssetCustody`]: moves the underlying asset in and out of custody,
//!   all-or-nothing.
//!
//! Implementations must be `Send + Sync`; the engine calls them while
//! holding its exclusive lock and never calls back into the ledger.

use chrono::{DateTime, Utc};

use crate::{Amount, PrincipalId, Result};

/// Time source.
///
/// The engine clamps readings so that its own notion of "now" never moves
/// backwards, but the implementation should still be one the caller cannot
/// roll back.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Capability check for callers.
pub trait CapabilityCheck: Send + Sync {
    /// Whether `caller` holds the ledger-operator capability.
    fn is_operator(&self, caller: &PrincipalId) -> bool;

    /// Whether `caller` is authenticated as `principal`.
    fn is_principal(&self, caller: &PrincipalId, principal: &PrincipalId) -> bool;
}

/// Custody of the underlying asset.
///
/// Each call either fully succeeds or leaves custody untouched.
pub trait AssetCustody: Send + Sync {
    /// Pull `amount` from `from` into custody.
    fn transfer_in(&self, from: &PrincipalId, amount: Amount) -> Result<()>;

    /// Push `amount` out of custody to `to`.
    fn transfer_out(&self, to: &PrincipalId, amount: Amount) -> Result<()>;

    /// How much of the asset custody actually holds right now.
    fn custody_balance(&self) -> Amount;
}
