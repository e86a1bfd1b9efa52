//! Property-based tests for LedgerService.
//!
//! These cover the lifecycle rules for arbitrary statuses, actors, and amounts
//! using proptest for randomized input generation.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::error::LedgerError;
use crate::ledger::service::tests::tx_with;
use crate::ledger::service::{Completion, LedgerService};
use crate::ledger::types::{Direction, TransactionStatus};
use crate::tenant::{Actor, CompanySettings, Role};

/// Strategy for generating random TransactionStatus values.
fn arb_status() -> impl Strategy<Value = TransactionStatus> {
    prop::sample::select(TransactionStatus::ALL.to_vec())
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

/// Positive amounts with two decimal places, up to one million.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::In), Just(Direction::Out)]
}

/// A member actor who is never the initiator and holds enough rank for anything.
fn owner() -> Actor {
    Actor::Member {
        membership_id: Uuid::new_v4(),
        role: Role::Owner,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Applying a transition from any status other than its source fails with InvalidState.
    #[test]
    fn prop_wrong_source_status_is_invalid_state(
        status in arb_status(),
        amount in arb_amount(),
    ) {
        let tx = tx_with(status, amount);
        let settings = CompanySettings::default();
        let now = Utc::now();

        if status != TransactionStatus::Pending {
            prop_assert!(
                matches!(
                    LedgerService::approve(&tx, owner(), &settings, now),
                    Err(LedgerError::InvalidState { .. })
                ),
                "approve from {status}"
            );
            let rejected = matches!(
                LedgerService::reject(&tx, owner(), None, now),
                Err(LedgerError::InvalidState { .. })
            );
            prop_assert!(rejected);
        }
        if status != TransactionStatus::Approved {
            let rejected = matches!(
                LedgerService::fail(&tx, Actor::System, None, now),
                Err(LedgerError::InvalidState { .. })
            );
            prop_assert!(rejected);
        }
        if status != TransactionStatus::Approved && status != TransactionStatus::Completed {
            let rejected = matches!(
                LedgerService::complete(&tx, Actor::System, now),
                Err(LedgerError::InvalidState { .. })
            );
            prop_assert!(rejected);
        }
        if status != TransactionStatus::Completed {
            let rejected = matches!(
                LedgerService::reverse(&tx, owner(), None, now),
                Err(LedgerError::InvalidState { .. })
            );
            prop_assert!(rejected);
        }
    }

    /// Every successful transition is one the state machine allows.
    #[test]
    fn prop_successful_transitions_are_valid(
        status in arb_status(),
        amount in arb_amount(),
    ) {
        let tx = tx_with(status, amount);
        let settings = CompanySettings::default();
        let now = Utc::now();

        let mut results = Vec::new();
        results.push(LedgerService::approve(&tx, owner(), &settings, now).ok());
        results.push(LedgerService::reject(&tx, owner(), None, now).ok());
        results.push(LedgerService::fail(&tx, Actor::System, None, now).ok());
        results.push(LedgerService::reverse(&tx, owner(), None, now).ok().map(|(t, _)| t));
        if let Ok(Completion::Apply(t)) = LedgerService::complete(&tx, Actor::System, now) {
            results.push(Some(t));
        }

        for next in results.into_iter().flatten() {
            prop_assert!(LedgerService::is_valid_transition(status, next.status));
            prop_assert_eq!(next.id, tx.id);
            prop_assert_eq!(next.amount, tx.amount);
        }
    }

    /// Completion and reversal deltas net to zero.
    #[test]
    fn prop_reversal_nets_to_zero(amount in arb_amount(), direction in arb_direction()) {
        let mut tx = tx_with(TransactionStatus::Completed, amount);
        tx.direction = direction;

        let (_, record) = LedgerService::reverse(&tx, owner(), None, Utc::now()).unwrap();
        prop_assert_eq!(LedgerService::balance_delta(&tx) + record.delta, Decimal::ZERO);
        prop_assert_eq!(LedgerService::balance_delta(&tx).abs(), amount);
    }

    /// The initiator is never recorded as approver, whatever their role.
    #[test]
    fn prop_self_approval_always_rejected(role in arb_role(), amount in arb_amount()) {
        let tx = tx_with(TransactionStatus::Pending, amount);
        let initiator = Actor::Member { membership_id: tx.initiated_by, role };

        let result = LedgerService::approve(&tx, initiator, &CompanySettings::default(), Utc::now());
        prop_assert!(result.is_err());
        if role.at_least(Role::Manager) {
            prop_assert!(matches!(result, Err(LedgerError::SelfApproval)));
        }
    }

    /// Approval over the threshold succeeds exactly for admin and above.
    #[test]
    fn prop_threshold_override_needs_admin(role in arb_role(), amount in arb_amount()) {
        let tx = tx_with(TransactionStatus::Pending, amount);
        let settings = CompanySettings::default();
        let approver = Actor::Member { membership_id: Uuid::new_v4(), role };

        let result = LedgerService::approve(&tx, approver, &settings, Utc::now());
        let allowed = role.at_least(Role::Admin)
            || (role.at_least(Role::Manager) && amount <= settings.require_approval_above);
        prop_assert_eq!(result.is_ok(), allowed);
    }
}
