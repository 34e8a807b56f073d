//! Payment model: requests, immutable records, batch receipts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, BatchId, PaymentId, PaymentRef, PrincipalId};

/// What a payment is for. Only `Fiat` leaves internal custody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Principal to principal.
    P2P,
    /// Customer to merchant.
    Merchant,
    /// Routed to a settlement destination for off-ledger conversion.
    Fiat,
}

impl PaymentKind {
    #[must_use]
    pub fn leaves_custody(self) -> bool {
        matches!(self, Self::Fiat)
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P2P => write!(f, "P2P"),
            Self::Merchant => write!(f, "MERCHANT"),
            Self::Fiat => write!(f, "FIAT"),
        }
    }
}

/// Terminal status of a recorded payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Value moved between internal balances.
    Completed,
    /// Net value left custody toward a settlement destination.
    ForwardedToSettlement,
}

/// One payment as submitted (also the unit of a batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub from: PrincipalId,
    pub to: PrincipalId,
    pub amount: Amount,
    pub kind: PaymentKind,
}

impl PaymentRequest {
    #[must_use]
    pub fn new(from: PrincipalId, to: PrincipalId, amount: Amount, kind: PaymentKind) -> Self {
        Self {
            from,
            to,
            amount,
            kind,
        }
    }
}

/// An applied payment. Immutable once written; keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    /// Caller-supplied reference, when the payment used one.
    pub reference: Option<PaymentRef>,
    /// The batch this payment was applied in, if any.
    pub batch_id: Option<BatchId>,
    pub from: PrincipalId,
    /// Receiver; the settlement destination for `Fiat` payments.
    pub to: PrincipalId,
    /// Gross amount debited from `from`.
    pub amount: Amount,
    pub fee: Amount,
    pub kind: PaymentKind,
    pub status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
}

impl PaymentRecord {
    /// What the receiver got (`amount - fee`).
    #[must_use]
    pub fn net_amount(&self) -> Amount {
        self.amount - self.fee
    }
}

/// Result of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: BatchId,
    pub payment_ids: Vec<PaymentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fiat_leaves_custody() {
        assert!(PaymentKind::Fiat.leaves_custody());
        assert!(!PaymentKind::P2P.leaves_custody());
        assert!(!PaymentKind::Merchant.leaves_custody());
    }

    #[test]
    fn net_amount_subtracts_fee() {
        let rec = PaymentRecord {
            id: PaymentId::FIRST,
            reference: None,
            batch_id: None,
            from: PrincipalId::from_u8(1),
            to: PrincipalId::from_u8(2),
            amount: 50,
            fee: 1,
            kind: PaymentKind::P2P,
            status: PaymentStatus::Completed,
            timestamp: Utc::now(),
        };
        assert_eq!(rec.net_amount(), 49);
    }

    #[test]
    fn kind_display() {
        assert_eq!(PaymentKind::Merchant.to_string(), "MERCHANT");
    }
}
