//! Principal balances with a running total.
//!
//! Tracks one balance per principal plus `total`, the value held in
//! custody on everyone's behalf. All primitives check before they write:
//! either the full operation succeeds or nothing changes.
//!
//! Multi-step operations (a payment is a debit plus two credits; a batch is
//! many payments) open a journal with [`BalanceLedger::begin`]. Every write
//! while the journal is open remembers the prior value of the touched
//! principal, so [`BalanceLedger::rollback`] restores the exact pre-`begin`
//! state.

use std::collections::{BTreeMap, HashMap};

use custodia_types::{Amount, CustodiaError, PrincipalId, Result};

/// Prior values captured while a transaction is open.
#[derive(Debug)]
struct Journal {
    /// `None` means the principal had no entry before the transaction.
    prior: HashMap<PrincipalId, Option<Amount>>,
    total: Amount,
}

/// The sole owner of principal balances.
#[derive(Debug, Default)]
pub struct BalanceLedger {
    balances: HashMap<PrincipalId, Amount>,
    total: Amount,
    journal: Option<Journal>,
}

impl BalanceLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of a principal. Unknown principals hold zero.
    #[must_use]
    pub fn balance_of(&self, principal: &PrincipalId) -> Amount {
        self.balances.get(principal).copied().unwrap_or(0)
    }

    /// Total value held on behalf of all principals.
    #[must_use]
    pub fn total(&self) -> Amount {
        self.total
    }

    /// Increase a balance. Creates the entry on first credit.
    ///
    /// # Errors
    /// `ArithmeticOverflow` if either the balance or the total would wrap.
    pub fn credit(&mut self, principal: PrincipalId, amount: Amount) -> Result<Amount> {
        let new_balance = self
            .balance_of(&principal)
            .checked_add(amount)
            .ok_or(CustodiaError::ArithmeticOverflow {
                context: "credit balance",
            })?;
        let new_total = self
            .total
            .checked_add(amount)
            .ok_or(CustodiaError::ArithmeticOverflow {
                context: "credit total",
            })?;

        self.remember(principal);
        self.balances.insert(principal, new_balance);
        self.total = new_total;
        Ok(new_balance)
    }

    /// Decrease a balance.
    ///
    /// # Errors
    /// `InsufficientBalance` if `amount > balance_of(principal)`.
    pub fn debit(&mut self, principal: PrincipalId, amount: Amount) -> Result<Amount> {
        let available = self.balance_of(&principal);
        if amount > available {
            return Err(CustodiaError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let new_total =
            self.total
                .checked_sub(amount)
                .ok_or_else(|| CustodiaError::SupplyInvariantViolation {
                    reason: format!(
                        "debit of {amount} from {principal} exceeds tracked total {}",
                        self.total
                    ),
                })?;

        self.remember(principal);
        self.balances.insert(principal, available - amount);
        self.total = new_total;
        Ok(available - amount)
    }

    /// Move `amount` from one principal to another. Total is unchanged.
    ///
    /// # Errors
    /// `InsufficientBalance` if `from` is short; `ArithmeticOverflow` if
    /// `to` would wrap. Nothing is written on error.
    pub fn transfer(&mut self, from: PrincipalId, to: PrincipalId, amount: Amount) -> Result<()> {
        let available = self.balance_of(&from);
        if amount > available {
            return Err(CustodiaError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(CustodiaError::ArithmeticOverflow {
                context: "transfer credit",
            })?;

        self.remember(from);
        self.remember(to);
        self.balances.insert(from, available - amount);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    /// Move the entire balance of `from` to `to`. Returns the amount moved.
    pub fn migrate(&mut self, from: PrincipalId, to: PrincipalId) -> Result<Amount> {
        let amount = self.balance_of(&from);
        self.transfer(from, to, amount)?;
        Ok(amount)
    }

    /// Check `total == Σ balances`.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` if the identity does not hold.
    pub fn verify_conservation(&self) -> Result<()> {
        let sum = self
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b));
        match sum {
            Some(sum) if sum == self.total => Ok(()),
            Some(sum) => Err(CustodiaError::SupplyInvariantViolation {
                reason: format!("tracked total {} != sum of balances {sum}", self.total),
            }),
            None => Err(CustodiaError::SupplyInvariantViolation {
                reason: "sum of balances overflows".into(),
            }),
        }
    }

    /// All principals with a balance entry, sorted for stable output.
    #[must_use]
    pub fn balances(&self) -> BTreeMap<PrincipalId, Amount> {
        self.balances.iter().map(|(p, b)| (*p, *b)).collect()
    }

    /// Number of principals ever credited.
    #[must_use]
    pub fn principal_count(&self) -> usize {
        self.balances.len()
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    /// Open a journal. Writes from here on can be undone with `rollback`.
    ///
    /// # Errors
    /// `Internal` if a transaction is already open (no nesting).
    pub fn begin(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Err(CustodiaError::Internal(
                "balance ledger transaction already open".into(),
            ));
        }
        self.journal = Some(Journal {
            prior: HashMap::new(),
            total: self.total,
        });
        Ok(())
    }

    /// Keep every write since `begin` and close the journal.
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Restore the state captured at `begin` and close the journal.
    /// A no-op when no transaction is open.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for (principal, prior) in journal.prior {
            match prior {
                Some(balance) => {
                    self.balances.insert(principal, balance);
                }
                None => {
                    self.balances.remove(&principal);
                }
            }
        }
        self.total = journal.total;
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    /// Record the first-seen prior value of `principal` in the open journal.
    fn remember(&mut self, principal: PrincipalId) {
        if let Some(journal) = self.journal.as_mut() {
            let current = self.balances.get(&principal).copied();
            journal.prior.entry(principal).or_insert(current);
        }
    }
}
