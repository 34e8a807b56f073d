//! Identifiers used throughout Custodia.
//!
//! Principals are opaque 32-byte identifiers (an address, an account key,
//! a hashed user-id). Payment and batch ids are engine-assigned and
//! strictly monotonic; `PaymentRef` is the optional caller-supplied key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CustodiaError;

/// Unsigned amount in the smallest unit of the custodied asset.
pub type Amount = u128;

// ---------------------------------------------------------------------------
// PrincipalId
// ---------------------------------------------------------------------------

/// Opaque identifier of a balance holder (user, merchant, platform wallet,
/// settlement destination).
///
/// The all-zero value is reserved as "unset" and is never a valid principal.
/// Serialized as a `0x`-prefixed hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(pub [u8; 32]);

impl PrincipalId {
    /// The reserved unset principal.
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// First four bytes in hex, for compact log fields.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalId(0x{}..)", self.short())
    }
}

impl FromStr for PrincipalId {
    type Err = CustodiaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| CustodiaError::InvalidPrincipal {
            reason: format!("not hex: {e}"),
        })?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CustodiaError::InvalidPrincipal {
                reason: format!("expected 32 bytes, got {}", v.len()),
            })?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = CustodiaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PrincipalId> for String {
    fn from(id: PrincipalId) -> Self {
        id.to_string()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl PrincipalId {
    /// A random non-zero principal.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes: [u8; 32] = rand::random();
        bytes[0] |= 1;
        Self(bytes)
    }

    /// A readable fixed principal: `n` in the last byte.
    #[must_use]
    pub fn from_u8(n: u8) -> Self {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        Self(bytes)
    }
}

// ---------------------------------------------------------------------------
// PaymentId
// ---------------------------------------------------------------------------

/// Engine-assigned payment identifier. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PaymentId(pub u64);

impl PaymentId {
    /// The first id the engine hands out.
    pub const FIRST: Self = Self(1);

    /// # Errors
    /// `ArithmeticOverflow` once the id space is exhausted.
    pub fn next(self) -> crate::Result<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(CustodiaError::ArithmeticOverflow { context: "payment id" })
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pay:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// Engine-assigned identifier of an atomic payment batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl BatchId {
    pub const FIRST: Self = Self(1);

    /// # Errors
    /// `ArithmeticOverflow` once the id space is exhausted.
    pub fn next(self) -> crate::Result<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(CustodiaError::ArithmeticOverflow { context: "batch id" })
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PaymentRef
// ---------------------------------------------------------------------------

/// Caller-supplied payment reference (idempotency key). First writer wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PaymentRef(pub Uuid);

impl PaymentRef {
    /// A fresh time-ordered reference.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PaymentRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}", self.0)
    }
}
