//! Settlement destination selection.
//!
//! Picks one of a fixed set of destinations per fiat payment:
//!
//! ```text
//! index = u64_le(SHA-256(domain || timestamp || chain_value || caller || nonce)[..8]) % N
//! ```
//!
//! This spreads load across trusted destinations. It is NOT unpredictable:
//! anyone who can choose the submission time or influence the chain value
//! can bias the pick. Swap the entropy inputs for a verifiable randomness
//! source before relying on it against an adversary.

use chrono::{DateTime, Utc};
use custodia_types::{CustodiaError, PrincipalId, Result, constants};
use sha2::{Digest, Sha256};

/// Inputs mixed into a destination pick.
#[derive(Debug, Clone, Copy)]
pub struct EntropyInputs {
    pub timestamp: DateTime<Utc>,
    /// Head of the payment hash chain at submission time.
    pub chain_value: [u8; 32],
    pub caller: PrincipalId,
}

/// Fixed-size destination set plus the selection nonce.
#[derive(Debug, Clone)]
pub struct SettlementRouter {
    destinations: Vec<PrincipalId>,
    nonce: u64,
}

impl SettlementRouter {
    /// Build a router over exactly `SETTLEMENT_DESTINATION_COUNT` unique,
    /// non-zero destinations.
    pub fn new(destinations: Vec<PrincipalId>) -> Result<Self> {
        if destinations.len() != constants::SETTLEMENT_DESTINATION_COUNT {
            return Err(CustodiaError::Configuration(format!(
                "expected {} settlement destinations, got {}",
                constants::SETTLEMENT_DESTINATION_COUNT,
                destinations.len()
            )));
        }
        for (i, dest) in destinations.iter().enumerate() {
            if dest.is_zero() {
                return Err(CustodiaError::InvalidPrincipal {
                    reason: format!("settlement destination {i} is unset"),
                });
            }
            if destinations[..i].contains(dest) {
                return Err(CustodiaError::DuplicateSettlementDestination(*dest));
            }
        }
        Ok(Self {
            destinations,
            nonce: 0,
        })
    }

    /// The destination the next committed pick would use for these inputs.
    /// Does not advance the nonce.
    #[must_use]
    pub fn preview(&self, inputs: &EntropyInputs) -> (usize, PrincipalId) {
        let mut hasher = Sha256::new();
        hasher.update(b"custodia:route:v1:");
        hasher.update(inputs.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(inputs.chain_value);
        hasher.update(inputs.caller.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        let digest = hasher.finalize();

        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        let len = self.destinations.len() as u64;
        #[allow(clippy::cast_possible_truncation)]
        let index = (u64::from_le_bytes(word) % len) as usize;
        (index, self.destinations[index])
    }

    /// Consume the current nonce. Called when a routed payment commits.
    pub fn advance(&mut self) {
        self.nonce = self.nonce.wrapping_add(1);
    }

    /// `preview` followed by `advance`.
    pub fn select_destination(&mut self, inputs: &EntropyInputs) -> (usize, PrincipalId) {
        let pick = self.preview(inputs);
        self.advance();
        pick
    }

    /// Replace the destination at `index`. Returns the one it replaced.
    ///
    /// # Errors
    /// `InvalidDestinationIndex`, `InvalidPrincipal` for the zero principal,
    /// `DuplicateSettlementDestination` if another slot already holds it.
    pub fn rotate(&mut self, index: usize, new_destination: PrincipalId) -> Result<PrincipalId> {
        if index >= self.destinations.len() {
            return Err(CustodiaError::InvalidDestinationIndex { index });
        }
        if new_destination.is_zero() {
            return Err(CustodiaError::InvalidPrincipal {
                reason: "settlement destination is unset".into(),
            });
        }
        let taken_elsewhere = self
            .destinations
            .iter()
            .enumerate()
            .any(|(i, d)| i != index && *d == new_destination);
        if taken_elsewhere {
            return Err(CustodiaError::DuplicateSettlementDestination(new_destination));
        }
        let old = std::mem::replace(&mut self.destinations[index], new_destination);
        Ok(old)
    }

    #[must_use]
    pub fn is_destination(&self, principal: &PrincipalId) -> bool {
        self.destinations.contains(principal)
    }

    #[must_use]
    pub fn destinations(&self) -> &[PrincipalId] {
        &self.destinations
    }

    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration;

    use super::*;

    fn dests() -> Vec<PrincipalId> {
        (0xd1..=0xd5).map(PrincipalId::from_u8).collect()
    }

    fn inputs(ms: i64) -> EntropyInputs {
        EntropyInputs {
            timestamp: DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(ms),
            chain_value: [7u8; 32],
            caller: PrincipalId::from_u8(1),
        }
    }

    #[test]
    fn preview_is_deterministic() {
        let router = SettlementRouter::new(dests()).unwrap();
        assert_eq!(router.preview(&inputs(1)), router.preview(&inputs(1)));
    }

    #[test]
    fn selection_lands_in_set_and_advances_nonce() {
        let mut router = SettlementRouter::new(dests()).unwrap();
        let (i, d) = router.select_destination(&inputs(42));
        assert!(i < constants::SETTLEMENT_DESTINATION_COUNT);
        assert_eq!(router.destinations()[i], d);
        assert_eq!(router.nonce(), 1);
    }

    #[test]
    fn nonce_varies_the_pick_over_time() {
        let mut router = SettlementRouter::new(dests()).unwrap();
        let picks: HashSet<usize> = (0..64)
            .map(|_| router.select_destination(&inputs(0)).0)
            .collect();
        assert!(picks.len() > 1, "all 64 picks hit the same slot");
    }

    #[test]
    fn wrong_count_rejected() {
        let mut d = dests();
        d.pop();
        assert!(SettlementRouter::new(d).is_err());
    }

    #[test]
    fn duplicate_at_construction_rejected() {
        let mut d = dests();
        d[1] = d[0];
        assert!(matches!(
            SettlementRouter::new(d),
            Err(CustodiaError::DuplicateSettlementDestination(_))
        ));
    }

    #[test]
    fn rotate_checks_other_slots() {
        let mut router = SettlementRouter::new(dests()).unwrap();
        let existing = router.destinations()[3];
        assert_eq!(
            router.rotate(0, existing).unwrap_err(),
            CustodiaError::DuplicateSettlementDestination(existing)
        );

        let fresh = PrincipalId::from_u8(0xee);
        let old = router.rotate(0, fresh).unwrap();
        assert_eq!(old, PrincipalId::from_u8(0xd1));
        assert!(router.is_destination(&fresh));
        assert!(!router.is_destination(&old));
    }

    #[test]
    fn rotate_bad_index_or_zero() {
        let mut router = SettlementRouter::new(dests()).unwrap();
        assert_eq!(
            router.rotate(5, PrincipalId::from_u8(0xee)).unwrap_err(),
            CustodiaError::InvalidDestinationIndex { index: 5 }
        );
        assert!(matches!(
            router.rotate(1, PrincipalId::ZERO),
            Err(CustodiaError::InvalidPrincipal { .. })
        ));
    }
}
