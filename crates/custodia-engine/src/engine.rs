//! The custodial ledger state machine.
//!
//! All state lives in one [`LedgerState`] behind a `parking_lot::RwLock`.
//! Each mutating call:
//! 1. Takes the write lock
//! 2. Reads the clock, clamped so time never runs backwards
//! 3. Checks lifecycle and authorization
//! 4. Applies its balance effects inside a ledger transaction
//! 5. Reconciles against the projected custody balance
//! 6. Performs the custody transfer, if any
//! 7. Commits, or rolls back on any failure in 4–6
//!
//! Collaborators are called with the lock held and never call back in.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use custodia_ledger::{BalanceLedger, FeePolicy, WithdrawalLimiter};
use custodia_settlement::{Authorization, PaymentProcessor, PreparedPayments, SupplyConservation};
use custodia_types::{
    Amount, AssetCustody, AuthorizationMode, BatchReceipt, CapabilityCheck, Clock, CustodiaError,
    FeeConfig, FeeInfo, LedgerConfig, LifecycleState, PaymentId, PaymentKind, PaymentRecord,
    PaymentRef, PaymentRequest, PendingFeeChange, PrincipalId, Result, WithdrawalWindow,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleController;

/// Everything the write lock protects.
#[derive(Debug)]
struct LedgerState {
    balances: BalanceLedger,
    fees: FeePolicy,
    limiter: WithdrawalLimiter,
    processor: PaymentProcessor,
    supply: SupplyConservation,
    lifecycle: LifecycleController,
    mode: AuthorizationMode,
    /// High-water mark of observed clock readings.
    last_now: DateTime<Utc>,
}

impl LedgerState {
    /// Check both conservation identities against `supply` and the custody
    /// balance expected once the pending transfer lands.
    fn verify_projected(&self, supply: &SupplyConservation, custody_after: Amount) -> Result<()> {
        let total = self.balances.total();
        let result = self
            .balances
            .verify_conservation()
            .and_then(|()| supply.verify(total))
            .and_then(|()| SupplyConservation::verify_custody(total, custody_after));
        if let Err(e) = &result {
            tracing::warn!(total, custody_after, error = %e, "Conservation check failed");
        }
        result
    }

    /// Commit the open ledger transaction and adopt `supply`, or roll back.
    fn finish<T>(&mut self, staged: Result<T>, supply: SupplyConservation) -> Result<T> {
        match staged {
            Ok(value) => {
                self.balances.commit();
                self.supply = supply;
                Ok(value)
            }
            Err(e) => {
                self.balances.rollback();
                Err(e)
            }
        }
    }
}

/// Point-in-time view of the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub taken_at: DateTime<Utc>,
    pub balances: BTreeMap<PrincipalId, Amount>,
    pub total: Amount,
    pub custody_balance: Amount,
    pub total_deposits: Amount,
    pub total_withdrawals: Amount,
    pub total_outflows: Amount,
    pub fee: FeeInfo,
    pub fee_recipient: PrincipalId,
    pub settlement_destinations: Vec<PrincipalId>,
    pub daily_withdrawal_limit: Amount,
    pub authorization_mode: AuthorizationMode,
    pub lifecycle: LifecycleState,
    pub payment_count: usize,
    /// Hex head of the payment hash chain.
    pub chain_head: String,
}

impl LedgerSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The custodial payment ledger.
///
/// Cheap to share: wrap in an `Arc` and call from any thread.
pub struct CustodialLedger {
    state: RwLock<LedgerState>,
    clock: Arc<dyn Clock>,
    caps: Arc<dyn CapabilityCheck>,
    custody: Arc<dyn AssetCustody>,
}

impl CustodialLedger {
    /// Build a ledger from a validated config and its collaborators.
    ///
    /// # Errors
    /// `Configuration`, `InvalidPrincipal`, `DuplicateSettlementDestination`,
    /// `InvalidFeeConfig` or `InvalidAmount` from config validation.
    pub fn new(
        config: &LedgerConfig,
        clock: Arc<dyn Clock>,
        caps: Arc<dyn CapabilityCheck>,
        custody: Arc<dyn AssetCustody>,
    ) -> Result<Self> {
        config.validate()?;
        let state = LedgerState {
            balances: BalanceLedger::new(),
            fees: FeePolicy::new(config.fee, config.fee_change_delay())?,
            limiter: WithdrawalLimiter::new(
                config.daily_withdrawal_limit,
                config.withdrawal_window(),
            ),
            processor: PaymentProcessor::new(
                config.fee_recipient,
                config.settlement_destinations.clone(),
            )?,
            supply: SupplyConservation::new(),
            lifecycle: LifecycleController::new(config.max_pause_duration()),
            mode: config.authorization_mode,
            last_now: clock.now(),
        };
        tracing::info!(
            operator = %config.operator,
            fee_recipient = %config.fee_recipient,
            mode = %config.authorization_mode,
            bps = config.fee.percentage_bps,
            daily_limit = config.daily_withdrawal_limit,
            "Custodial ledger initialized"
        );
        Ok(Self {
            state: RwLock::new(state),
            clock,
            caps,
            custody,
        })
    }

    /// Run `op` under the write lock with a clamped `now`. The time
    /// high-water mark only moves when `op` succeeds.
    fn write<T>(&self, op: impl FnOnce(&mut LedgerState, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let now = state.last_now.max(self.clock.now());
        let out = op(state, now)?;
        state.last_now = now;
        Ok(out)
    }

    fn now_for_read(&self, state: &LedgerState) -> DateTime<Utc> {
        state.last_now.max(self.clock.now())
    }

    fn require_operator(&self, caller: &PrincipalId, action: &'static str) -> Result<()> {
        if self.caps.is_operator(caller) {
            return Ok(());
        }
        tracing::warn!(%caller, action, "Admin call rejected");
        Err(CustodiaError::Unauthorized {
            reason: format!("{action} requires the operator capability"),
        })
    }

    fn authorization(&self, mode: AuthorizationMode, caller: PrincipalId) -> Authorization<'_> {
        Authorization {
            caps: self.caps.as_ref(),
            mode,
            caller,
        }
    }

    // =================================================================
    // Deposits
    // =================================================================

    /// Move `amount` from the caller's wallet into custody and credit the
    /// caller. Returns the new balance.
    pub fn deposit(&self, caller: PrincipalId, amount: Amount) -> Result<Amount> {
        self.deposit_for(caller, caller, amount)
    }

    /// Move `amount` from the caller's wallet into custody and credit
    /// `target`. Returns `target`'s new balance.
    ///
    /// # Errors
    /// `ContractPaused`, `InvalidAmount`, `InvalidPrincipal` (zero, or a
    /// settlement destination), `ArithmeticOverflow`, `Custody`.
    pub fn deposit_for(
        &self,
        caller: PrincipalId,
        target: PrincipalId,
        amount: Amount,
    ) -> Result<Amount> {
        self.write(|state, _now| {
            state.lifecycle.check_active()?;
            if amount == 0 {
                return Err(CustodiaError::InvalidAmount {
                    reason: "deposit amount must be > 0".into(),
                });
            }
            if caller.is_zero() || target.is_zero() {
                return Err(CustodiaError::InvalidPrincipal {
                    reason: "depositor and beneficiary must be set".into(),
                });
            }
            if state.processor.is_destination(&target) {
                return Err(CustodiaError::InvalidPrincipal {
                    reason: "settlement destinations cannot receive deposits".into(),
                });
            }

            let mut supply = state.supply;
            supply.record_deposit(amount)?;
            let custody_after = self.custody.custody_balance().checked_add(amount).ok_or(
                CustodiaError::ArithmeticOverflow {
                    context: "custody balance",
                },
            )?;

            state.balances.begin()?;
            let staged = state
                .balances
                .credit(target, amount)
                .and_then(|balance| state.verify_projected(&supply, custody_after).map(|()| balance))
                .and_then(|balance| self.custody.transfer_in(&caller, amount).map(|()| balance));
            let balance = state.finish(staged, supply)?;

            tracing::info!(%caller, %target, amount, balance, "Deposit");
            Ok(balance)
        })
    }

    // =================================================================
    // Payments
    // =================================================================

    /// Move value between two internal balances, less the fee.
    ///
    /// # Errors
    /// `ContractPaused`, `UnauthorizedProcessor`, `InvalidAmount`,
    /// `InvalidPrincipal`, `AmountTooSmall`, `InsufficientBalance`,
    /// `ArithmeticOverflow`, conservation errors.
    pub fn process_payment(
        &self,
        caller: PrincipalId,
        from: PrincipalId,
        to: PrincipalId,
        amount: Amount,
        kind: PaymentKind,
    ) -> Result<PaymentRecord> {
        self.submit_payment(caller, PaymentRequest::new(from, to, amount, kind), None)
    }

    /// As [`process_payment`](Self::process_payment), applied at most once
    /// per `reference`.
    ///
    /// # Errors
    /// `AlreadyProcessed` if `reference` was applied before.
    pub fn process_payment_with_reference(
        &self,
        caller: PrincipalId,
        reference: PaymentRef,
        from: PrincipalId,
        to: PrincipalId,
        amount: Amount,
        kind: PaymentKind,
    ) -> Result<PaymentRecord> {
        self.submit_payment(
            caller,
            PaymentRequest::new(from, to, amount, kind),
            Some(reference),
        )
    }

    fn submit_payment(
        &self,
        caller: PrincipalId,
        request: PaymentRequest,
        reference: Option<PaymentRef>,
    ) -> Result<PaymentRecord> {
        self.write(|state, now| {
            state.lifecycle.check_active()?;
            let auth = self.authorization(state.mode, caller);
            let prepared = state.processor.prepare_payment(
                &mut state.balances,
                &state.fees,
                auth,
                &request,
                reference,
                now,
            )?;
            single(self.settle(state, prepared)?)
        })
    }

    /// Debit `from`, keep the fee, and forward `amount - fee` out of
    /// custody to a settlement destination picked by the router.
    ///
    /// # Errors
    /// As [`process_payment`](Self::process_payment), plus `Custody` if the
    /// outbound transfer fails (nothing is applied).
    pub fn process_fiat_payment(
        &self,
        caller: PrincipalId,
        from: PrincipalId,
        amount: Amount,
    ) -> Result<PaymentRecord> {
        self.write(|state, now| {
            state.lifecycle.check_active()?;
            let auth = self.authorization(state.mode, caller);
            let prepared = state.processor.prepare_fiat_payment(
                &mut state.balances,
                &state.fees,
                auth,
                from,
                amount,
                now,
            )?;
            single(self.settle(state, prepared)?)
        })
    }

    /// Apply up to `MAX_BATCH_SIZE` payments as one unit.
    ///
    /// # Errors
    /// `ContractPaused`, `BatchNotAllowed`, `UnauthorizedProcessor`,
    /// `EmptyBatch`, `BatchSizeExceeded`, or the first failing entry's error.
    pub fn process_payment_batch(
        &self,
        caller: PrincipalId,
        entries: &[PaymentRequest],
    ) -> Result<BatchReceipt> {
        self.write(|state, now| {
            state.lifecycle.check_active()?;
            let auth = self.authorization(state.mode, caller);
            let prepared = state.processor.prepare_batch(
                &mut state.balances,
                &state.fees,
                auth,
                entries,
                now,
            )?;
            let Some(receipt) = prepared.receipt() else {
                state.processor.abort(&mut state.balances, prepared);
                return Err(CustodiaError::Internal("prepared batch has no id".into()));
            };
            self.settle(state, prepared)?;
            Ok(receipt)
        })
    }

    /// Reconcile, run the outbound transfer if any, then commit.
    fn settle(
        &self,
        state: &mut LedgerState,
        prepared: PreparedPayments,
    ) -> Result<Vec<PaymentRecord>> {
        let mut supply = state.supply;
        let custody_now = self.custody.custody_balance();
        let outflow = prepared.outflow();

        let checked = match outflow {
            Some(out) => supply
                .record_outflow(out.amount)
                .map(|()| custody_now.saturating_sub(out.amount)),
            None => Ok(custody_now),
        }
        .and_then(|custody_after| state.verify_projected(&supply, custody_after))
        .and_then(|()| {
            state
                .processor
                .validate_commit(&state.balances, &prepared)
                .map(|_| ())
        })
        .and_then(|()| match outflow {
            Some(out) => self.custody.transfer_out(&out.destination, out.amount),
            None => Ok(()),
        });

        if let Err(e) = checked {
            state.processor.abort(&mut state.balances, prepared);
            return Err(e);
        }
        let records = state.processor.commit(&mut state.balances, prepared)?;
        state.supply = supply;
        Ok(records)
    }

    // =================================================================
    // Withdrawals
    // =================================================================

    /// Withdraw `amount` to the caller's wallet, within the daily limit.
    /// Returns the remaining balance.
    ///
    /// # Errors
    /// `ContractPaused`, `InvalidAmount`, `InsufficientBalance`,
    /// `WithdrawalLimitExceeded`, `Custody`.
    pub fn withdraw(&self, caller: PrincipalId, amount: Amount) -> Result<Amount> {
        self.write(|state, now| {
            state.lifecycle.check_active()?;
            if amount == 0 {
                return Err(CustodiaError::InvalidAmount {
                    reason: "withdrawal amount must be > 0".into(),
                });
            }
            let available = state.balances.balance_of(&caller);
            if available < amount {
                return Err(CustodiaError::InsufficientBalance {
                    requested: amount,
                    available,
                });
            }
            let window = state.limiter.check(&caller, amount, now)?;
            self.release(state, caller, amount, Some(window))?;
            tracing::info!(%caller, amount, remaining = available - amount, "Withdrawal");
            Ok(available - amount)
        })
    }

    /// Withdraw the caller's whole balance, within the daily limit.
    /// Returns the amount withdrawn.
    pub fn withdraw_all(&self, caller: PrincipalId) -> Result<Amount> {
        self.write(|state, now| {
            state.lifecycle.check_active()?;
            let amount = state.balances.balance_of(&caller);
            if amount == 0 {
                return Err(CustodiaError::InvalidAmount {
                    reason: "no balance to withdraw".into(),
                });
            }
            let window = state.limiter.check(&caller, amount, now)?;
            self.release(state, caller, amount, Some(window))?;
            tracing::info!(%caller, amount, "Full withdrawal");
            Ok(amount)
        })
    }

    /// Drain the caller's balance once the ledger has been paused for the
    /// maximum pause duration. Bypasses the daily limit.
    ///
    /// # Errors
    /// `NotPaused`, `PauseDurationNotElapsed`, `InvalidAmount` for an empty
    /// balance, `Custody`.
    pub fn emergency_withdraw(&self, caller: PrincipalId) -> Result<Amount> {
        self.write(|state, now| {
            state.lifecycle.check_emergency_withdraw(now)?;
            let amount = state.balances.balance_of(&caller);
            if amount == 0 {
                return Err(CustodiaError::InvalidAmount {
                    reason: "no balance to withdraw".into(),
                });
            }
            self.release(state, caller, amount, None)?;
            tracing::warn!(%caller, amount, "Emergency withdrawal");
            Ok(amount)
        })
    }

    /// Debit `caller` and transfer `amount` out of custody to them.
    fn release(
        &self,
        state: &mut LedgerState,
        caller: PrincipalId,
        amount: Amount,
        window: Option<WithdrawalWindow>,
    ) -> Result<()> {
        let mut supply = state.supply;
        supply.record_withdrawal(amount)?;
        let custody_after = self.custody.custody_balance().saturating_sub(amount);

        state.balances.begin()?;
        let staged = state
            .balances
            .debit(caller, amount)
            .and_then(|_| state.verify_projected(&supply, custody_after))
            .and_then(|()| self.custody.transfer_out(&caller, amount));
        state.finish(staged, supply)?;

        if let Some(window) = window {
            state.limiter.commit(caller, window);
        }
        Ok(())
    }

    // =================================================================
    // Fee governance
    // =================================================================

    /// Open (or replace) the pending fee change.
    pub fn propose_fee_change(
        &self,
        caller: PrincipalId,
        config: FeeConfig,
    ) -> Result<PendingFeeChange> {
        self.require_operator(&caller, "propose_fee_change")?;
        self.write(|state, now| state.fees.propose_change(config, now))
    }

    /// Apply the pending fee change once its timelock has elapsed.
    ///
    /// # Errors
    /// `NoPendingChange`, `ChangeNotReady`.
    pub fn execute_fee_change(&self, caller: PrincipalId) -> Result<FeeConfig> {
        self.require_operator(&caller, "execute_fee_change")?;
        self.write(|state, now| state.fees.execute_change(now))
    }

    pub fn cancel_fee_change(&self, caller: PrincipalId) -> Result<PendingFeeChange> {
        self.require_operator(&caller, "cancel_fee_change")?;
        self.write(|state, _now| state.fees.cancel_change())
    }

    // =================================================================
    // Administration
    // =================================================================

    /// Point fees at `new_recipient` and move the old recipient's whole
    /// balance there. Returns the amount migrated.
    ///
    /// # Errors
    /// `Unauthorized`; `InvalidPrincipal` for zero, a destination, or the
    /// current recipient.
    pub fn set_platform_wallet(
        &self,
        caller: PrincipalId,
        new_recipient: PrincipalId,
    ) -> Result<Amount> {
        self.require_operator(&caller, "set_platform_wallet")?;
        self.write(|state, _now| {
            let old = state.processor.set_fee_recipient(new_recipient)?;
            let custody_now = self.custody.custody_balance();
            let supply = state.supply;

            if let Err(e) = state.balances.begin() {
                state.processor.set_fee_recipient(old)?;
                return Err(e);
            }
            let staged = state
                .balances
                .migrate(old, new_recipient)
                .and_then(|moved| state.verify_projected(&supply, custody_now).map(|()| moved));
            match state.finish(staged, supply) {
                Ok(moved) => {
                    tracing::info!(%old, new = %new_recipient, moved, "Platform wallet changed");
                    Ok(moved)
                }
                Err(e) => {
                    state.processor.set_fee_recipient(old)?;
                    Err(e)
                }
            }
        })
    }

    /// Replace settlement destination `index`. Returns the one replaced.
    ///
    /// # Errors
    /// `Unauthorized`, `InvalidDestinationIndex`,
    /// `DuplicateSettlementDestination`, `InvalidPrincipal` if the new
    /// destination is zero, the fee recipient, an operator, or holds a
    /// ledger balance.
    pub fn rotate_settlement_destination(
        &self,
        caller: PrincipalId,
        index: usize,
        new_destination: PrincipalId,
    ) -> Result<PrincipalId> {
        self.require_operator(&caller, "rotate_settlement_destination")?;
        if self.caps.is_operator(&new_destination) {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "settlement destination cannot be an operator".into(),
            });
        }
        self.write(|state, _now| {
            if state.balances.balance_of(&new_destination) > 0 {
                return Err(CustodiaError::InvalidPrincipal {
                    reason: "settlement destination holds a ledger balance".into(),
                });
            }
            let old = state.processor.rotate_destination(index, new_destination)?;
            tracing::info!(index, %old, new = %new_destination, "Settlement destination rotated");
            Ok(old)
        })
    }

    pub fn set_daily_withdrawal_limit(&self, caller: PrincipalId, limit: Amount) -> Result<()> {
        self.require_operator(&caller, "set_daily_withdrawal_limit")?;
        self.write(|state, _now| state.limiter.set_limit(limit))
    }

    /// Switch who may submit payments. Takes effect for the next payment.
    pub fn set_authorization_mode(
        &self,
        caller: PrincipalId,
        mode: AuthorizationMode,
    ) -> Result<()> {
        self.require_operator(&caller, "set_authorization_mode")?;
        self.write(|state, _now| {
            let old = std::mem::replace(&mut state.mode, mode);
            tracing::info!(%old, new = %mode, "Authorization mode changed");
            Ok(())
        })
    }

    /// # Errors
    /// `Unauthorized`; `ContractPaused` if already paused.
    pub fn pause(&self, caller: PrincipalId) -> Result<()> {
        self.require_operator(&caller, "pause")?;
        self.write(|state, now| state.lifecycle.pause(now))
    }

    /// # Errors
    /// `Unauthorized`; `NotPaused` if active.
    pub fn unpause(&self, caller: PrincipalId) -> Result<()> {
        self.require_operator(&caller, "unpause")?;
        self.write(|state, _now| state.lifecycle.unpause().map(|_| ()))
    }

    // =================================================================
    // Read views
    // =================================================================

    #[must_use]
    pub fn balance_of(&self, principal: &PrincipalId) -> Amount {
        self.state.read().balances.balance_of(principal)
    }

    /// Value held in custody on everyone's behalf.
    #[must_use]
    pub fn total(&self) -> Amount {
        self.state.read().balances.total()
    }

    /// What custody reports actually holding.
    #[must_use]
    pub fn actual_custody_balance(&self) -> Amount {
        self.custody.custody_balance()
    }

    #[must_use]
    pub fn fee_info(&self) -> FeeInfo {
        self.state.read().fees.info()
    }

    /// Fee the active config would charge on `amount`.
    #[must_use]
    pub fn preview_fee(&self, amount: Amount) -> Amount {
        self.state.read().fees.compute_fee(amount)
    }

    #[must_use]
    pub fn pending_fee_change(&self) -> Option<PendingFeeChange> {
        self.state.read().fees.pending()
    }

    #[must_use]
    pub fn remaining_withdrawal_limit(&self, principal: &PrincipalId) -> Amount {
        let state = self.state.read();
        let now = self.now_for_read(&state);
        state.limiter.remaining(principal, now)
    }

    #[must_use]
    pub fn daily_withdrawal_limit(&self) -> Amount {
        self.state.read().limiter.limit()
    }

    #[must_use]
    pub fn payment_by_id(&self, id: PaymentId) -> Option<PaymentRecord> {
        self.state.read().processor.payment(id).cloned()
    }

    #[must_use]
    pub fn payment_by_reference(&self, reference: &PaymentRef) -> Option<PaymentRecord> {
        self.state
            .read()
            .processor
            .payment_by_reference(reference)
            .cloned()
    }

    #[must_use]
    pub fn payment_count(&self) -> usize {
        self.state.read().processor.payment_count()
    }

    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.state.read().lifecycle.state()
    }

    #[must_use]
    pub fn authorization_mode(&self) -> AuthorizationMode {
        self.state.read().mode
    }

    #[must_use]
    pub fn settlement_destinations(&self) -> Vec<PrincipalId> {
        self.state.read().processor.destinations().to_vec()
    }

    #[must_use]
    pub fn fee_recipient(&self) -> PrincipalId {
        self.state.read().processor.fee_recipient()
    }

    /// Verify `Σ balances == total == deposits - withdrawals - outflows`
    /// and `total <= actual_custody_balance`.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` or `CustodyShortfall`.
    pub fn reconcile(&self) -> Result<()> {
        let state = self.state.read();
        state.verify_projected(&state.supply, self.custody.custody_balance())
    }

    /// Consistent view of the whole ledger.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read();
        LedgerSnapshot {
            taken_at: self.now_for_read(&state),
            balances: state.balances.balances(),
            total: state.balances.total(),
            custody_balance: self.custody.custody_balance(),
            total_deposits: state.supply.total_deposits(),
            total_withdrawals: state.supply.total_withdrawals(),
            total_outflows: state.supply.total_outflows(),
            fee: state.fees.info(),
            fee_recipient: state.processor.fee_recipient(),
            settlement_destinations: state.processor.destinations().to_vec(),
            daily_withdrawal_limit: state.limiter.limit(),
            authorization_mode: state.mode,
            lifecycle: state.lifecycle.state(),
            payment_count: state.processor.payment_count(),
            chain_head: state.processor.chain_head_hex(),
        }
    }
}

/// The one record a single-payment path commits.
fn single(mut records: Vec<PaymentRecord>) -> Result<PaymentRecord> {
    records
        .pop()
        .ok_or_else(|| CustodiaError::Internal("payment committed no record".into()))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::collaborators::{InMemoryCustody, ManualClock, StaticCapabilities};

    fn ledger() -> (CustodialLedger, Arc<ManualClock>, Arc<InMemoryCustody>) {
        let config = LedgerConfig::dummy();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let custody = Arc::new(InMemoryCustody::new());
        let ledger = CustodialLedger::new(
            &config,
            clock.clone(),
            Arc::new(StaticCapabilities::from_config(&config)),
            custody.clone(),
        )
        .unwrap();
        (ledger, clock, custody)
    }

    #[test]
    fn clock_never_runs_backwards() {
        let (ledger, clock, _) = ledger();
        let op = PrincipalId::from_u8(1);
        let start = clock.now();

        ledger
            .propose_fee_change(op, FeeConfig::default())
            .unwrap();
        clock.set(start - Duration::days(30));
        // The proposal is stamped with the high-water mark, not the
        // rewound reading.
        let pending = ledger.propose_fee_change(op, FeeConfig::default()).unwrap();
        assert_eq!(pending.proposed_at, start);
    }

    #[test]
    fn failed_deposit_leaves_state_untouched() {
        let (ledger, _, custody) = ledger();
        let alice = PrincipalId::from_u8(10);
        // Wallet is empty: custody refuses the transfer.
        let err = ledger.deposit(alice, 100).unwrap_err();
        assert!(matches!(err, CustodiaError::Custody(_)));
        assert_eq!(ledger.balance_of(&alice), 0);
        assert_eq!(ledger.total(), 0);
        assert_eq!(custody.custody_balance(), 0);
        ledger.reconcile().unwrap();
    }

    #[test]
    fn single_rejects_empty() {
        assert!(matches!(single(Vec::new()), Err(CustodiaError::Internal(_))));
    }
}
