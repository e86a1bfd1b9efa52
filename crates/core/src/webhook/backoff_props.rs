//! Property-based tests for the retry schedule and delivery state machine.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::events::{DomainEvent, EventType};
use crate::webhook::backoff::BackoffPolicy;
use crate::webhook::delivery::{AttemptOutcome, DeliveryService, DeliveryStatus};
use crate::webhook::endpoint::{EndpointService, NewEndpoint};

fn arb_policy() -> impl Strategy<Value = BackoffPolicy> {
    (1i64..120, 1u32..12).prop_map(|(base, attempts)| {
        BackoffPolicy::new(
            Duration::seconds(base),
            Duration::seconds(base << 20),
            attempts,
        )
    })
}

fn arb_failure() -> impl Strategy<Value = AttemptOutcome> {
    prop_oneof![
        (400u16..600, ".{0,40}").prop_map(|(status_code, body)| AttemptOutcome::Rejected {
            status_code,
            body
        }),
        ".{1,40}".prop_map(AttemptOutcome::Transport),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Below the cap, each consecutive failure waits strictly longer than the last.
    #[test]
    fn prop_delay_strictly_increases_until_cap(policy in arb_policy(), attempt in 1u32..20) {
        let here = policy.delay_for(attempt);
        let next = policy.delay_for(attempt + 1);
        if here < policy.max_delay {
            prop_assert!(next > here);
        } else {
            prop_assert_eq!(next, policy.max_delay);
        }
        prop_assert!(next <= policy.max_delay);
    }

    /// Consecutive failures exhaust exactly at `max_attempts`, with increasing schedule.
    #[test]
    fn prop_failures_exhaust_at_cap(
        policy in arb_policy(),
        failures in prop::collection::vec(arb_failure(), 12),
    ) {
        let company = Uuid::new_v4();
        let endpoint = EndpointService::create(
            company,
            NewEndpoint { url: "https://example.com/h".into(), events: vec![] },
            Utc::now(),
        ).unwrap();
        let event = DomainEvent::new(
            EventType::TransactionCreated,
            company,
            Uuid::new_v4(),
            json!({}),
            Utc::now(),
        );
        let now = Utc::now();
        let mut delivery = DeliveryService::enqueue(&endpoint, &event, now).unwrap();
        let mut last_delay = Duration::zero();

        for outcome in &failures {
            if delivery.status.is_terminal() {
                break;
            }
            delivery = DeliveryService::apply_attempt(&delivery, outcome, &policy, now);
            if let Some(at) = delivery.next_attempt_at {
                let delay = at - now;
                prop_assert!(delay > last_delay);
                last_delay = delay;
            }
        }

        prop_assert_eq!(delivery.status, DeliveryStatus::Exhausted);
        prop_assert_eq!(delivery.attempts, policy.max_attempts);
        prop_assert!(delivery.last_error.is_some());
    }
}
