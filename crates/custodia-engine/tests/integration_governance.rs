//! Integration test: governance and withdrawals
//!
//! Withdrawal windows, the fee-change timelock, pause and the emergency
//! escape hatch, platform wallet migration, destination rotation.

mod common;

use chrono::Duration;
use common::*;
use custodia_types::*;

fn with_limit(limit: Amount) -> Harness {
    let mut config = LedgerConfig::dummy();
    config.daily_withdrawal_limit = limit;
    Harness::with_config(config)
}

// =========================================================================
// Withdrawals
// =========================================================================

#[test]
fn withdrawal_window_caps_then_resets() {
    let h = with_limit(1_000);
    h.fund(alice(), 5_000);

    h.ledger.withdraw(alice(), 1_000).unwrap();
    assert_eq!(h.ledger.remaining_withdrawal_limit(&alice()), 0);

    let err = h.ledger.withdraw(alice(), 1).unwrap_err();
    assert_eq!(
        err,
        CustodiaError::WithdrawalLimitExceeded {
            requested: 1_001,
            limit: 1_000
        }
    );
    assert_eq!(h.ledger.balance_of(&alice()), 4_000);

    h.clock.advance(Duration::hours(24));
    assert_eq!(h.ledger.withdraw(alice(), 1).unwrap(), 3_999);
    assert_eq!(h.custody.wallet_balance(&alice()), 1_001);
    h.assert_conserved();
}

#[test]
fn withdraw_all_respects_limit() {
    let h = with_limit(1_000);
    h.fund(alice(), 1_500);

    assert!(matches!(
        h.ledger.withdraw_all(alice()),
        Err(CustodiaError::WithdrawalLimitExceeded { .. })
    ));
    h.ledger.withdraw(alice(), 600).unwrap();
    h.clock.advance(Duration::days(1));
    assert_eq!(h.ledger.withdraw_all(alice()).unwrap(), 900);
    assert_eq!(h.ledger.balance_of(&alice()), 0);
    assert!(matches!(
        h.ledger.withdraw_all(alice()),
        Err(CustodiaError::InvalidAmount { .. })
    ));
}

#[test]
fn withdrawal_failures_do_not_consume_limit() {
    let h = with_limit(1_000);
    h.fund(alice(), 500);

    assert!(matches!(
        h.ledger.withdraw(alice(), 600),
        Err(CustodiaError::InsufficientBalance { .. })
    ));

    h.custody.set_fail_transfers(true);
    assert!(matches!(
        h.ledger.withdraw(alice(), 200),
        Err(CustodiaError::Custody(_))
    ));
    h.custody.set_fail_transfers(false);

    assert_eq!(h.ledger.remaining_withdrawal_limit(&alice()), 1_000);
    assert_eq!(h.ledger.balance_of(&alice()), 500);
    h.assert_conserved();
}

#[test]
fn lowering_limit_applies_to_running_window() {
    let h = with_limit(1_000);
    h.fund(alice(), 5_000);
    h.ledger.withdraw(alice(), 400).unwrap();

    h.ledger.set_daily_withdrawal_limit(operator(), 500).unwrap();
    assert_eq!(h.ledger.daily_withdrawal_limit(), 500);
    assert_eq!(h.ledger.remaining_withdrawal_limit(&alice()), 100);
    assert!(h.ledger.withdraw(alice(), 101).is_err());
    assert!(matches!(
        h.ledger.set_daily_withdrawal_limit(operator(), 0),
        Err(CustodiaError::InvalidAmount { .. })
    ));
}

// =========================================================================
// Fee timelock
// =========================================================================

#[test]
fn fee_change_waits_for_timelock() {
    let h = Harness::new();
    let proposed = FeeConfig {
        percentage_bps: 100,
        min_fee: 2,
        max_fee: 5_000,
    };

    let pending = h.ledger.propose_fee_change(operator(), proposed).unwrap();
    assert_eq!(h.ledger.pending_fee_change(), Some(pending));
    assert_eq!(h.ledger.preview_fee(10_000), 50, "Old config still active");

    h.clock.advance(Duration::hours(23));
    assert_eq!(
        h.ledger.execute_fee_change(operator()).unwrap_err(),
        CustodiaError::ChangeNotReady {
            effective_at: pending.effective_at
        }
    );

    h.clock.advance(Duration::hours(1));
    assert_eq!(h.ledger.execute_fee_change(operator()).unwrap(), proposed);
    assert!(h.ledger.pending_fee_change().is_none());
    assert_eq!(h.ledger.preview_fee(10_000), 100);
    assert_eq!(h.ledger.fee_info().percentage.to_string(), "1.00");
}

#[test]
fn fee_change_cancel_and_errors() {
    let h = Harness::new();
    assert_eq!(
        h.ledger.execute_fee_change(operator()).unwrap_err(),
        CustodiaError::NoPendingChange
    );
    assert_eq!(
        h.ledger.cancel_fee_change(operator()).unwrap_err(),
        CustodiaError::NoPendingChange
    );

    h.ledger
        .propose_fee_change(operator(), FeeConfig::default())
        .unwrap();
    h.ledger.cancel_fee_change(operator()).unwrap();
    h.clock.advance(Duration::days(2));
    assert_eq!(
        h.ledger.execute_fee_change(operator()).unwrap_err(),
        CustodiaError::NoPendingChange
    );

    let invalid = FeeConfig {
        percentage_bps: 50,
        min_fee: 10,
        max_fee: 1,
    };
    assert!(matches!(
        h.ledger.propose_fee_change(operator(), invalid),
        Err(CustodiaError::InvalidFeeConfig { .. })
    ));
}

#[test]
fn out_of_range_durations_rejected_at_construction() {
    let mut config = LedgerConfig::dummy();
    config.fee_change_delay_secs = 9_000_000_000_000;
    let clock = std::sync::Arc::new(custodia_engine::ManualClock::new(chrono::Utc::now()));
    let err = custodia_engine::CustodialLedger::new(
        &config,
        clock,
        std::sync::Arc::new(custodia_engine::StaticCapabilities::from_config(&config)),
        std::sync::Arc::new(custodia_engine::InMemoryCustody::new()),
    )
    .err();
    assert!(matches!(err, Some(CustodiaError::Configuration(_))));
}

#[test]
fn longest_allowed_durations_still_work() {
    let mut config = LedgerConfig::dummy();
    config.fee_change_delay_secs = constants::MAX_DURATION_SECS;
    config.max_pause_duration_secs = constants::MAX_DURATION_SECS;
    config.withdrawal_window_secs = constants::MAX_DURATION_SECS;
    let h = Harness::with_config(config);
    h.fund(alice(), 100);

    let pending = h
        .ledger
        .propose_fee_change(operator(), FeeConfig::default())
        .unwrap();
    assert!(pending.effective_at > pending.proposed_at);

    h.ledger.pause(operator()).unwrap();
    assert!(matches!(
        h.ledger.emergency_withdraw(alice()),
        Err(CustodiaError::PauseDurationNotElapsed { .. })
    ));
    h.ledger.unpause(operator()).unwrap();
    h.ledger.withdraw(alice(), 40).unwrap();
    assert_eq!(h.ledger.balance_of(&alice()), 60);
}

#[test]
fn admin_calls_require_operator() {
    let h = Harness::new();
    let intruder = alice();

    let results = [
        h.ledger
            .propose_fee_change(intruder, FeeConfig::default())
            .map(|_| ()),
        h.ledger.execute_fee_change(intruder).map(|_| ()),
        h.ledger.cancel_fee_change(intruder).map(|_| ()),
        h.ledger.set_platform_wallet(intruder, carol()).map(|_| ()),
        h.ledger
            .rotate_settlement_destination(intruder, 0, carol())
            .map(|_| ()),
        h.ledger.set_daily_withdrawal_limit(intruder, 5),
        h.ledger
            .set_authorization_mode(intruder, AuthorizationMode::Decentralized),
        h.ledger.pause(intruder),
        h.ledger.unpause(intruder),
    ];
    for result in results {
        assert!(
            matches!(result, Err(CustodiaError::Unauthorized { .. })),
            "Expected Unauthorized, got: {result:?}"
        );
    }
    assert!(!h.ledger.lifecycle().is_paused());
}

// =========================================================================
// Pause and escape hatch
// =========================================================================

#[test]
fn pause_blocks_mutations_but_not_governance() {
    let h = Harness::new();
    h.fund(alice(), 1_000);
    h.custody.fund(alice(), 100);
    h.ledger.pause(operator()).unwrap();

    assert_eq!(h.ledger.deposit(alice(), 100).unwrap_err(), CustodiaError::ContractPaused);
    assert_eq!(
        h.ledger
            .process_payment(operator(), alice(), bob(), 10, PaymentKind::P2P)
            .unwrap_err(),
        CustodiaError::ContractPaused
    );
    assert_eq!(
        h.ledger.process_fiat_payment(operator(), alice(), 10).unwrap_err(),
        CustodiaError::ContractPaused
    );
    assert_eq!(h.ledger.withdraw(alice(), 10).unwrap_err(), CustodiaError::ContractPaused);
    assert_eq!(h.ledger.withdraw_all(alice()).unwrap_err(), CustodiaError::ContractPaused);
    assert_eq!(h.ledger.pause(operator()).unwrap_err(), CustodiaError::ContractPaused);

    // Governance stays available.
    h.ledger
        .propose_fee_change(operator(), FeeConfig::default())
        .unwrap();
    h.ledger.set_daily_withdrawal_limit(operator(), 42).unwrap();

    h.ledger.unpause(operator()).unwrap();
    assert_eq!(h.ledger.unpause(operator()).unwrap_err(), CustodiaError::NotPaused);
    h.ledger.withdraw(alice(), 10).unwrap();
}

#[test]
fn emergency_withdraw_after_max_pause() {
    let h = with_limit(10);
    h.fund(alice(), 5_000);

    assert_eq!(
        h.ledger.emergency_withdraw(alice()).unwrap_err(),
        CustodiaError::NotPaused
    );

    h.ledger.pause(operator()).unwrap();
    let paused_at = h.ledger.lifecycle().paused_at().unwrap();
    h.clock.advance(Duration::days(6));
    assert_eq!(
        h.ledger.emergency_withdraw(alice()).unwrap_err(),
        CustodiaError::PauseDurationNotElapsed {
            available_at: paused_at + Duration::days(7)
        }
    );

    h.clock.advance(Duration::days(1));
    // Drains exactly the balance, past the daily limit of 10.
    assert_eq!(h.ledger.emergency_withdraw(alice()).unwrap(), 5_000);
    assert_eq!(h.ledger.balance_of(&alice()), 0);
    assert_eq!(h.custody.wallet_balance(&alice()), 5_000);
    assert!(matches!(
        h.ledger.emergency_withdraw(alice()),
        Err(CustodiaError::InvalidAmount { .. })
    ));
    h.assert_conserved();
}

// =========================================================================
// Platform wallet and destinations
// =========================================================================

#[test]
fn platform_wallet_migrates_balance() {
    let h = Harness::new();
    h.fund(alice(), 10_000);
    h.ledger
        .process_payment(operator(), alice(), bob(), 10_000, PaymentKind::P2P)
        .unwrap();
    let fees = h.ledger.balance_of(&fee_wallet());
    assert_eq!(fees, 50);

    let new_wallet = PrincipalId::from_u8(0x77);
    assert_eq!(h.ledger.set_platform_wallet(operator(), new_wallet).unwrap(), fees);
    assert_eq!(h.ledger.fee_recipient(), new_wallet);
    assert_eq!(h.ledger.balance_of(&fee_wallet()), 0);
    assert_eq!(h.ledger.balance_of(&new_wallet), fees);

    // Future fees go to the new wallet.
    h.ledger
        .process_payment(operator(), bob(), carol(), 100, PaymentKind::P2P)
        .unwrap();
    assert_eq!(h.ledger.balance_of(&new_wallet), fees + 1);
    h.assert_conserved();
}

#[test]
fn platform_wallet_guards() {
    let h = Harness::new();
    for bad in [PrincipalId::ZERO, fee_wallet(), PrincipalId::from_u8(0xd4)] {
        assert!(matches!(
            h.ledger.set_platform_wallet(operator(), bad),
            Err(CustodiaError::InvalidPrincipal { .. })
        ));
    }
    assert_eq!(h.ledger.fee_recipient(), fee_wallet());
}

#[test]
fn destination_rotation() {
    let h = Harness::new();
    h.fund(alice(), 100);
    let fresh = PrincipalId::from_u8(0xe1);

    let old = h
        .ledger
        .rotate_settlement_destination(operator(), 2, fresh)
        .unwrap();
    assert_eq!(old, PrincipalId::from_u8(0xd3));
    assert_eq!(h.ledger.settlement_destinations()[2], fresh);

    let taken = PrincipalId::from_u8(0xd1);
    assert_eq!(
        h.ledger
            .rotate_settlement_destination(operator(), 2, taken)
            .unwrap_err(),
        CustodiaError::DuplicateSettlementDestination(taken)
    );
    assert_eq!(
        h.ledger
            .rotate_settlement_destination(operator(), 5, PrincipalId::from_u8(0xe2))
            .unwrap_err(),
        CustodiaError::InvalidDestinationIndex { index: 5 }
    );
    for bad in [alice(), fee_wallet(), operator(), PrincipalId::ZERO] {
        assert!(
            matches!(
                h.ledger.rotate_settlement_destination(operator(), 0, bad),
                Err(CustodiaError::InvalidPrincipal { .. })
            ),
            "{bad} should be rejected"
        );
    }
}

#[test]
fn snapshot_serializes() {
    let h = Harness::new();
    h.fund(alice(), 1_000);
    h.ledger
        .process_payment(operator(), alice(), bob(), 500, PaymentKind::P2P)
        .unwrap();

    let snap = h.ledger.snapshot();
    let json = snap.to_json().unwrap();
    let back: custodia_engine::LedgerSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snap);
    assert_eq!(back.payment_count, 1);
    assert_eq!(back.total_deposits, 1_000);
}
