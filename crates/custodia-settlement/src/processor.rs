//! Payment processing.
//!
//! Every payment path runs in two phases:
//!
//! 1. `prepare_*`: authorize, validate, price, then apply the balance
//!    movements inside a ledger transaction. Records are built with the ids
//!    they will receive but nothing is appended yet.
//! 2. [`PaymentProcessor::commit`] closes the ledger transaction, appends
//!    the records, registers references, extends the hash chain and
//!    advances the id counters. [`PaymentProcessor::abort`] rolls the
//!    ledger back instead.
//!
//! A prepared payment holds the ledger's transaction open, so a second
//! prepare cannot interleave with it: `BalanceLedger::begin` refuses to nest.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use custodia_ledger::{BalanceLedger, FeePolicy};
use custodia_types::{
    Amount, AuthorizationMode, BatchId, BatchReceipt, CapabilityCheck, CustodiaError, PaymentId,
    PaymentKind, PaymentRecord, PaymentRef, PaymentRequest, PaymentStatus, PrincipalId, Result,
    constants,
};
use sha2::{Digest, Sha256};

use crate::idempotency::IdempotencyRegistry;
use crate::router::{EntropyInputs, SettlementRouter};

/// Who is submitting, and under which rule.
#[derive(Clone, Copy)]
pub struct Authorization<'a> {
    pub caps: &'a dyn CapabilityCheck,
    pub mode: AuthorizationMode,
    pub caller: PrincipalId,
}

impl Authorization<'_> {
    /// Centralized: the caller must be the operator. Decentralized: the
    /// caller must be the paying principal.
    ///
    /// # Errors
    /// `UnauthorizedProcessor` on mismatch.
    pub fn authorize_payment(&self, from: &PrincipalId) -> Result<()> {
        let allowed = match self.mode {
            AuthorizationMode::Centralized => self.caps.is_operator(&self.caller),
            AuthorizationMode::Decentralized => self.caps.is_principal(&self.caller, from),
        };
        if !allowed {
            tracing::warn!(caller = %self.caller, %from, mode = %self.mode, "Payment caller rejected");
            return Err(CustodiaError::UnauthorizedProcessor {
                caller: self.caller,
                mode: self.mode,
            });
        }
        Ok(())
    }
}

/// Value leaving custody toward a settlement destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outflow {
    pub destination: PrincipalId,
    pub amount: Amount,
}

/// Payments applied to the ledger but not yet committed.
#[must_use = "prepared payments must be committed or aborted"]
#[derive(Debug)]
pub struct PreparedPayments {
    records: Vec<PaymentRecord>,
    batch_id: Option<BatchId>,
    outflow: Option<Outflow>,
}

impl PreparedPayments {
    /// Set for fiat payments: what the engine must transfer out of custody.
    #[must_use]
    pub fn outflow(&self) -> Option<Outflow> {
        self.outflow
    }

    /// Receipt for a prepared batch; `None` for single payments.
    #[must_use]
    pub fn receipt(&self) -> Option<BatchReceipt> {
        self.batch_id.map(|batch_id| BatchReceipt {
            batch_id,
            payment_ids: self.records.iter().map(|r| r.id).collect(),
        })
    }
}

/// Owns payment records, ids, the reference registry and the router.
#[derive(Debug)]
pub struct PaymentProcessor {
    fee_recipient: PrincipalId,
    router: SettlementRouter,
    registry: IdempotencyRegistry,
    records: BTreeMap<PaymentId, PaymentRecord>,
    next_payment_id: PaymentId,
    next_batch_id: BatchId,
    chain_head: [u8; 32],
}

impl PaymentProcessor {
    /// # Errors
    /// `InvalidPrincipal` if the fee recipient is zero or a destination;
    /// router construction errors otherwise.
    pub fn new(fee_recipient: PrincipalId, destinations: Vec<PrincipalId>) -> Result<Self> {
        let router = SettlementRouter::new(destinations)?;
        if fee_recipient.is_zero() {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "fee recipient is unset".into(),
            });
        }
        if router.is_destination(&fee_recipient) {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "fee recipient cannot be a settlement destination".into(),
            });
        }
        Ok(Self {
            fee_recipient,
            router,
            registry: IdempotencyRegistry::new(),
            records: BTreeMap::new(),
            next_payment_id: PaymentId::FIRST,
            next_batch_id: BatchId::FIRST,
            chain_head: [0u8; 32],
        })
    }

    // -----------------------------------------------------------------
    // Prepare
    // -----------------------------------------------------------------

    /// Prepare a single internal payment (P2P or merchant).
    ///
    /// # Errors
    /// `UnauthorizedProcessor`, `InvalidAmount`, `InvalidPrincipal`,
    /// `AlreadyProcessed` (with a reference), `AmountTooSmall`,
    /// `InsufficientBalance`, `ArithmeticOverflow`. The ledger is
    /// unchanged on error.
    pub fn prepare_payment(
        &self,
        ledger: &mut BalanceLedger,
        fees: &FeePolicy,
        auth: Authorization<'_>,
        request: &PaymentRequest,
        reference: Option<PaymentRef>,
        now: DateTime<Utc>,
    ) -> Result<PreparedPayments> {
        auth.authorize_payment(&request.from)?;
        self.validate_request(request)?;
        if let Some(reference) = reference.as_ref() {
            self.registry.check(reference)?;
        }
        let fee = fee_for(fees, request.amount)?;

        ledger.begin()?;
        if let Err(e) = self.apply(ledger, request.from, Some(request.to), request.amount, fee) {
            ledger.rollback();
            return Err(e);
        }

        let record = PaymentRecord {
            id: self.next_payment_id,
            reference,
            batch_id: None,
            from: request.from,
            to: request.to,
            amount: request.amount,
            fee,
            kind: request.kind,
            status: PaymentStatus::Completed,
            timestamp: now,
        };
        Ok(PreparedPayments {
            records: vec![record],
            batch_id: None,
            outflow: None,
        })
    }

    /// Prepare a fiat payment: debit `from`, credit the fee, and route the
    /// net amount to a settlement destination.
    ///
    /// `total` drops by `amount - fee` here; the engine moves the same
    /// amount out of custody before committing.
    ///
    /// # Errors
    /// As [`prepare_payment`](Self::prepare_payment), minus `AlreadyProcessed`.
    pub fn prepare_fiat_payment(
        &self,
        ledger: &mut BalanceLedger,
        fees: &FeePolicy,
        auth: Authorization<'_>,
        from: PrincipalId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<PreparedPayments> {
        auth.authorize_payment(&from)?;
        if amount == 0 {
            return Err(CustodiaError::InvalidAmount {
                reason: "payment amount must be > 0".into(),
            });
        }
        if from.is_zero() {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "sender is unset".into(),
            });
        }
        if self.router.is_destination(&from) {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "settlement destinations cannot send payments".into(),
            });
        }
        let fee = fee_for(fees, amount)?;

        let (index, destination) = self.router.preview(&EntropyInputs {
            timestamp: now,
            chain_value: self.chain_head,
            caller: auth.caller,
        });
        tracing::debug!(index, %destination, nonce = self.router.nonce(), "Settlement destination selected");

        ledger.begin()?;
        if let Err(e) = self.apply(ledger, from, None, amount, fee) {
            ledger.rollback();
            return Err(e);
        }

        let record = PaymentRecord {
            id: self.next_payment_id,
            reference: None,
            batch_id: None,
            from,
            to: destination,
            amount,
            fee,
            kind: PaymentKind::Fiat,
            status: PaymentStatus::ForwardedToSettlement,
            timestamp: now,
        };
        Ok(PreparedPayments {
            records: vec![record],
            batch_id: None,
            outflow: Some(Outflow {
                destination,
                amount: amount - fee,
            }),
        })
    }

    /// Prepare an all-or-nothing batch. Centralized mode only.
    ///
    /// Entries are applied in order against live balances, so a sender may
    /// appear more than once. The first failing entry rolls back the lot.
    ///
    /// # Errors
    /// `BatchNotAllowed`, `UnauthorizedProcessor`, `EmptyBatch`,
    /// `BatchSizeExceeded`, or the first entry's payment error.
    pub fn prepare_batch(
        &self,
        ledger: &mut BalanceLedger,
        fees: &FeePolicy,
        auth: Authorization<'_>,
        entries: &[PaymentRequest],
        now: DateTime<Utc>,
    ) -> Result<PreparedPayments> {
        if !auth.mode.allows_batches() {
            return Err(CustodiaError::BatchNotAllowed { mode: auth.mode });
        }
        if !auth.caps.is_operator(&auth.caller) {
            tracing::warn!(caller = %auth.caller, "Batch caller rejected");
            return Err(CustodiaError::UnauthorizedProcessor {
                caller: auth.caller,
                mode: auth.mode,
            });
        }
        if entries.is_empty() {
            return Err(CustodiaError::EmptyBatch);
        }
        if entries.len() > constants::MAX_BATCH_SIZE {
            return Err(CustodiaError::BatchSizeExceeded {
                size: entries.len(),
                max: constants::MAX_BATCH_SIZE,
            });
        }

        let batch_id = self.next_batch_id;
        ledger.begin()?;
        let mut records: Vec<PaymentRecord> = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let id = match records.last() {
                Some(previous) => previous.id.next(),
                None => Ok(self.next_payment_id),
            };
            match id.and_then(|id| self.stage_batch_entry(ledger, fees, entry, id, batch_id, now)) {
                Ok(record) => records.push(record),
                Err(e) => {
                    ledger.rollback();
                    tracing::warn!(%batch_id, index, error = %e, "Batch rejected");
                    return Err(e);
                }
            }
        }

        Ok(PreparedPayments {
            records,
            batch_id: Some(batch_id),
            outflow: None,
        })
    }

    fn stage_batch_entry(
        &self,
        ledger: &mut BalanceLedger,
        fees: &FeePolicy,
        entry: &PaymentRequest,
        id: PaymentId,
        batch_id: BatchId,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord> {
        self.validate_request(entry)?;
        if entry.from == self.fee_recipient {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "fee recipient cannot send in a batch".into(),
            });
        }
        let fee = fee_for(fees, entry.amount)?;
        self.apply(ledger, entry.from, Some(entry.to), entry.amount, fee)?;
        Ok(PaymentRecord {
            id,
            reference: None,
            batch_id: Some(batch_id),
            from: entry.from,
            to: entry.to,
            amount: entry.amount,
            fee,
            kind: entry.kind,
            status: PaymentStatus::Completed,
            timestamp: now,
        })
    }

    // -----------------------------------------------------------------
    // Commit / abort
    // -----------------------------------------------------------------

    /// Everything [`commit`](Self::commit) checks, without side effects.
    /// Returns the id counters the commit would leave behind.
    ///
    /// Callers that must perform an irreversible step between prepare and
    /// commit run this first; `commit` then cannot fail.
    ///
    /// # Errors
    /// `Internal` if the ledger transaction is gone or the prepared ids are
    /// stale; `AlreadyProcessed` if a reference was registered meanwhile;
    /// `ArithmeticOverflow` if the id space is exhausted.
    pub fn validate_commit(
        &self,
        ledger: &BalanceLedger,
        prepared: &PreparedPayments,
    ) -> Result<(PaymentId, Option<BatchId>)> {
        if !ledger.in_transaction() {
            return Err(CustodiaError::Internal(
                "commit without an open ledger transaction".into(),
            ));
        }
        if prepared.records.first().map(|r| r.id) != Some(self.next_payment_id) {
            return Err(CustodiaError::Internal("prepared payment ids are stale".into()));
        }
        self.registry.check_all(&references(prepared))?;
        successor_ids(prepared)
    }

    /// Make prepared payments durable. Returns the committed records.
    ///
    /// # Errors
    /// As [`validate_commit`](Self::validate_commit). The ledger is rolled
    /// back in each case.
    pub fn commit(
        &mut self,
        ledger: &mut BalanceLedger,
        prepared: PreparedPayments,
    ) -> Result<Vec<PaymentRecord>> {
        let staged = self.validate_commit(ledger, &prepared).and_then(|ids| {
            self.registry
                .record_all(&references(&prepared))
                .map(|()| ids)
        });
        let (next_payment_id, next_batch_id) = match staged {
            Ok(ids) => ids,
            Err(e) => {
                ledger.rollback();
                return Err(e);
            }
        };

        ledger.commit();

        for record in &prepared.records {
            self.chain_head = chain_link(&self.chain_head, record);
            self.records.insert(record.id, record.clone());
        }
        self.next_payment_id = next_payment_id;
        if let Some(next_batch_id) = next_batch_id {
            self.next_batch_id = next_batch_id;
        }
        if prepared.outflow.is_some() {
            self.router.advance();
        }

        if let Some(batch_id) = prepared.batch_id {
            tracing::info!(
                %batch_id,
                count = prepared.records.len(),
                chain_head = %self.chain_head_hex(),
                "Batch committed"
            );
        } else {
            for record in &prepared.records {
                tracing::info!(
                    id = %record.id,
                    from = %record.from,
                    to = %record.to,
                    amount = record.amount,
                    fee = record.fee,
                    kind = %record.kind,
                    "Payment committed"
                );
            }
        }
        Ok(prepared.records)
    }

    /// Discard prepared payments and restore the ledger.
    pub fn abort(&self, ledger: &mut BalanceLedger, prepared: PreparedPayments) {
        ledger.rollback();
        tracing::debug!(count = prepared.records.len(), "Prepared payments aborted");
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn validate_request(&self, request: &PaymentRequest) -> Result<()> {
        if request.amount == 0 {
            return Err(CustodiaError::InvalidAmount {
                reason: "payment amount must be > 0".into(),
            });
        }
        if request.from.is_zero() || request.to.is_zero() {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "sender and receiver must be set".into(),
            });
        }
        if request.from == request.to {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "sender and receiver are the same principal".into(),
            });
        }
        if request.kind.leaves_custody() {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "fiat payments are routed to a settlement destination, not addressed".into(),
            });
        }
        if self.router.is_destination(&request.to) || self.router.is_destination(&request.from) {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "settlement destinations cannot take part in internal payments".into(),
            });
        }
        Ok(())
    }

    /// Debit `from` for `amount`, credit `to` (if any) with the net, and
    /// the fee recipient with `fee`. Must run inside a ledger transaction.
    fn apply(
        &self,
        ledger: &mut BalanceLedger,
        from: PrincipalId,
        to: Option<PrincipalId>,
        amount: Amount,
        fee: Amount,
    ) -> Result<()> {
        ledger.debit(from, amount)?;
        if let Some(to) = to {
            ledger.credit(to, amount - fee)?;
        }
        if fee > 0 {
            ledger.credit(self.fee_recipient, fee)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Governance hooks
    // -----------------------------------------------------------------

    /// Point fees at a new recipient. The caller migrates the balance.
    ///
    /// # Errors
    /// `InvalidPrincipal` for zero, a destination, or the current recipient.
    pub fn set_fee_recipient(&mut self, new_recipient: PrincipalId) -> Result<PrincipalId> {
        if new_recipient.is_zero() {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "fee recipient is unset".into(),
            });
        }
        if new_recipient == self.fee_recipient {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "new fee recipient equals the current one".into(),
            });
        }
        if self.router.is_destination(&new_recipient) {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "fee recipient cannot be a settlement destination".into(),
            });
        }
        Ok(std::mem::replace(&mut self.fee_recipient, new_recipient))
    }

    /// Replace destination `index`. Rejects the fee recipient.
    ///
    /// # Errors
    /// `InvalidPrincipal`, or the router's rotation errors.
    pub fn rotate_destination(
        &mut self,
        index: usize,
        new_destination: PrincipalId,
    ) -> Result<PrincipalId> {
        if new_destination == self.fee_recipient {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "settlement destination cannot be the fee recipient".into(),
            });
        }
        self.router.rotate(index, new_destination)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    #[must_use]
    pub fn fee_recipient(&self) -> PrincipalId {
        self.fee_recipient
    }

    #[must_use]
    pub fn is_destination(&self, principal: &PrincipalId) -> bool {
        self.router.is_destination(principal)
    }

    #[must_use]
    pub fn destinations(&self) -> &[PrincipalId] {
        self.router.destinations()
    }

    #[must_use]
    pub fn payment(&self, id: PaymentId) -> Option<&PaymentRecord> {
        self.records.get(&id)
    }

    #[must_use]
    pub fn payment_by_reference(&self, reference: &PaymentRef) -> Option<&PaymentRecord> {
        self.registry
            .lookup(reference)
            .and_then(|id| self.records.get(&id))
    }

    #[must_use]
    pub fn payment_count(&self) -> usize {
        self.records.len()
    }

    /// Head of the hash chain over committed records.
    #[must_use]
    pub fn chain_head(&self) -> [u8; 32] {
        self.chain_head
    }

    #[must_use]
    pub fn chain_head_hex(&self) -> String {
        hex::encode(self.chain_head)
    }
}

/// References a commit registers, paired with their payment ids.
fn references(prepared: &PreparedPayments) -> Vec<(PaymentRef, PaymentId)> {
    prepared
        .records
        .iter()
        .filter_map(|r| r.reference.map(|reference| (reference, r.id)))
        .collect()
}

/// Counters after `prepared` commits.
fn successor_ids(prepared: &PreparedPayments) -> Result<(PaymentId, Option<BatchId>)> {
    let last = prepared
        .records
        .last()
        .ok_or_else(|| CustodiaError::Internal("nothing prepared".into()))?;
    let next_batch = prepared.batch_id.map(BatchId::next).transpose()?;
    Ok((last.id.next()?, next_batch))
}

/// Fee for `amount`, which must strictly exceed it.
fn fee_for(fees: &FeePolicy, amount: Amount) -> Result<Amount> {
    let fee = fees.compute_fee(amount);
    if amount <= fee {
        return Err(CustodiaError::AmountTooSmall { amount, fee });
    }
    Ok(fee)
}

fn chain_link(prev: &[u8; 32], record: &PaymentRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"custodia:chain:v1:");
    hasher.update(prev);
    hasher.update(record.id.0.to_le_bytes());
    hasher.update(record.from.as_bytes());
    hasher.update(record.to.as_bytes());
    hasher.update(record.amount.to_le_bytes());
    hasher.update(record.fee.to_le_bytes());
    hasher.update(record.kind.to_string().as_bytes());
    hasher.update(record.timestamp.timestamp_millis().to_le_bytes());
    hasher.finalize().into()
}
