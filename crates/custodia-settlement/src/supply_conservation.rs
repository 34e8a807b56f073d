//! Supply conservation checker.
//!
//! Identity checked after every mutating operation:
//! ```text
//! Σ balances == Σ deposits - Σ withdrawals - Σ settlement outflows
//! custody_balance >= Σ balances
//! ```
//!
//! Fees never leave custody: they move from the payer to the fee recipient,
//! so they appear in neither side of the first identity. If either check
//! fails the engine rolls the operation back and reports the violation.

use custodia_types::{Amount, CustodiaError, Result};

/// Cumulative flows into and out of custody since genesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplyConservation {
    deposits: Amount,
    withdrawals: Amount,
    /// Net fiat payment value forwarded to settlement destinations.
    outflows: Amount,
}

fn add(acc: Amount, amount: Amount, context: &'static str) -> Result<Amount> {
    acc.checked_add(amount)
        .ok_or(CustodiaError::ArithmeticOverflow { context })
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, amount: Amount) -> Result<()> {
        self.deposits = add(self.deposits, amount, "cumulative deposits")?;
        Ok(())
    }

    pub fn record_withdrawal(&mut self, amount: Amount) -> Result<()> {
        self.withdrawals = add(self.withdrawals, amount, "cumulative withdrawals")?;
        Ok(())
    }

    pub fn record_outflow(&mut self, amount: Amount) -> Result<()> {
        self.outflows = add(self.outflows, amount, "cumulative outflows")?;
        Ok(())
    }

    /// What the ledger total should be given the recorded flows.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` if more left custody than ever entered.
    pub fn expected_supply(&self) -> Result<Amount> {
        self.deposits
            .checked_sub(self.withdrawals)
            .and_then(|rest| rest.checked_sub(self.outflows))
            .ok_or_else(|| CustodiaError::SupplyInvariantViolation {
                reason: format!(
                    "outflows exceed deposits (deposits={}, withdrawals={}, outflows={})",
                    self.deposits, self.withdrawals, self.outflows
                ),
            })
    }

    /// Verify the ledger total matches the recorded flows.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` if `actual_supply != expected`.
    pub fn verify(&self, actual_supply: Amount) -> Result<()> {
        let expected = self.expected_supply()?;
        if actual_supply != expected {
            return Err(CustodiaError::SupplyInvariantViolation {
                reason: format!(
                    "actual supply {actual_supply} != expected {expected} \
                     (deposits={}, withdrawals={}, outflows={})",
                    self.deposits, self.withdrawals, self.outflows
                ),
            });
        }
        Ok(())
    }

    /// Verify custody holds at least what the ledger owes.
    ///
    /// # Errors
    /// `CustodyShortfall` if `custodied < total`.
    pub fn verify_custody(total: Amount, custodied: Amount) -> Result<()> {
        if custodied < total {
            return Err(CustodiaError::CustodyShortfall { total, custodied });
        }
        Ok(())
    }

    #[must_use]
    pub fn total_deposits(&self) -> Amount {
        self.deposits
    }

    #[must_use]
    pub fn total_withdrawals(&self) -> Amount {
        self.withdrawals
    }

    #[must_use]
    pub fn total_outflows(&self) -> Amount {
        self.outflows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_supply_is_zero() {
        let sc = SupplyConservation::new();
        assert_eq!(sc.expected_supply().unwrap(), 0);
        assert!(sc.verify(0).is_ok());
    }

    #[test]
    fn flows_net_out() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit(1_000).unwrap();
        sc.record_deposit(500).unwrap();
        sc.record_withdrawal(300).unwrap();
        sc.record_outflow(200).unwrap();
        assert_eq!(sc.expected_supply().unwrap(), 1_000);
        assert!(sc.verify(1_000).is_ok());
    }

    #[test]
    fn verify_fails_on_mismatch() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit(10).unwrap();
        let err = sc.verify(11).unwrap_err();
        assert!(
            matches!(err, CustodiaError::SupplyInvariantViolation { .. }),
            "Expected SupplyInvariantViolation, got: {err:?}"
        );
    }

    #[test]
    fn more_out_than_in_is_a_violation() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit(10).unwrap();
        sc.record_withdrawal(11).unwrap();
        assert!(sc.expected_supply().is_err());
    }

    #[test]
    fn custody_shortfall_detected() {
        assert!(SupplyConservation::verify_custody(100, 100).is_ok());
        assert!(SupplyConservation::verify_custody(100, 150).is_ok());
        assert_eq!(
            SupplyConservation::verify_custody(100, 99).unwrap_err(),
            CustodiaError::CustodyShortfall {
                total: 100,
                custodied: 99
            }
        );
    }

    #[test]
    fn cumulative_overflow_rejected() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit(Amount::MAX).unwrap();
        assert!(matches!(
            sc.record_deposit(1),
            Err(CustodiaError::ArithmeticOverflow { .. })
        ));
        assert_eq!(sc.total_deposits(), Amount::MAX);
    }
}
