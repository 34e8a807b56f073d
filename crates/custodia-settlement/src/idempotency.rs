//! Idempotency registry for caller-supplied payment references.
//!
//! Each reference can be applied once. A second submission with the same
//! reference returns [`CustodiaError::AlreadyProcessed`] and moves nothing.
//!
//! Payments without a reference get a fresh engine-assigned id every time,
//! so they never pass through here. Entries are never evicted: a reference
//! is unique for the lifetime of the ledger.

use std::collections::{HashMap, HashSet};

use custodia_types::{CustodiaError, PaymentId, PaymentRef, Result};

/// Maps applied references to the payment they produced. First writer wins.
#[derive(Debug, Default)]
pub struct IdempotencyRegistry {
    applied: HashMap<PaymentRef, PaymentId>,
}

impl IdempotencyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if `reference` was already applied.
    ///
    /// # Errors
    /// [`CustodiaError::AlreadyProcessed`].
    pub fn check(&self, reference: &PaymentRef) -> Result<()> {
        if self.applied.contains_key(reference) {
            return Err(CustodiaError::AlreadyProcessed(*reference));
        }
        Ok(())
    }

    /// Mark `reference` as applied by payment `id`.
    ///
    /// # Errors
    /// [`CustodiaError::AlreadyProcessed`] if it was already applied; the
    /// existing mapping is kept.
    pub fn record(&mut self, reference: PaymentRef, id: PaymentId) -> Result<()> {
        self.check(&reference)?;
        self.applied.insert(reference, id);
        Ok(())
    }

    /// Fail if any reference was applied or repeats within `entries`.
    ///
    /// # Errors
    /// [`CustodiaError::AlreadyProcessed`] for the first offender.
    pub fn check_all(&self, entries: &[(PaymentRef, PaymentId)]) -> Result<()> {
        let mut seen = HashSet::with_capacity(entries.len());
        for (reference, _) in entries {
            self.check(reference)?;
            if !seen.insert(*reference) {
                return Err(CustodiaError::AlreadyProcessed(*reference));
            }
        }
        Ok(())
    }

    /// Register several references at once: either all of them or none.
    ///
    /// # Errors
    /// As [`check_all`](Self::check_all).
    pub fn record_all(&mut self, entries: &[(PaymentRef, PaymentId)]) -> Result<()> {
        self.check_all(entries)?;
        self.applied.extend(entries.iter().copied());
        Ok(())
    }

    #[must_use]
    pub fn is_processed(&self, reference: &PaymentRef) -> bool {
        self.applied.contains_key(reference)
    }

    /// The payment a reference produced.
    #[must_use]
    pub fn lookup(&self, reference: &PaymentRef) -> Option<PaymentId> {
        self.applied.get(reference).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}
