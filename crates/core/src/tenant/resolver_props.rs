//! Property-based tests for TenantResolver.

use proptest::prelude::*;
use uuid::Uuid;

use crate::tenant::context::Membership;
use crate::tenant::error::TenantError;
use crate::tenant::resolver::TenantResolver;
use crate::tenant::role::Role;

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Teller),
        Just(Role::Manager),
        Just(Role::Admin),
        Just(Role::Owner),
    ]
}

/// A membership for one of four fixed companies, randomly active or not.
fn arb_membership(user_id: Uuid) -> impl Strategy<Value = Membership> {
    (0u128..4, arb_role(), any::<bool>(), any::<bool>()).prop_map(
        move |(company, role, is_active, company_active)| Membership {
            id: Uuid::new_v4(),
            user_id,
            company_id: Uuid::from_u128(company + 1),
            role,
            branch_id: None,
            is_active,
            company_active,
        },
    )
}

fn arb_memberships() -> impl Strategy<Value = (Uuid, Vec<Membership>)> {
    let user = Uuid::from_u128(42);
    prop::collection::vec(arb_membership(user), 0..6).prop_map(move |ms| (user, ms))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Without a selector, resolution succeeds exactly when one usable membership exists.
    #[test]
    fn prop_unselected_resolution_needs_exactly_one((user, ms) in arb_memberships()) {
        let usable = ms.iter().filter(|m| m.is_usable()).count();
        let result = TenantResolver::resolve(user, None, &ms);

        match usable {
            0 => prop_assert!(matches!(result, Err(TenantError::NoTenant))),
            1 => prop_assert!(result.is_ok()),
            n => prop_assert!(matches!(result, Err(TenantError::AmbiguousTenant(k)) if k == n)),
        }
    }

    /// A selected context always names the selected company and a usable membership.
    #[test]
    fn prop_selected_context_stays_in_company(
        (user, ms) in arb_memberships(),
        pick in 0u128..4,
    ) {
        let company = Uuid::from_u128(pick + 1);
        match TenantResolver::resolve(user, Some(company), &ms) {
            Ok(ctx) => {
                prop_assert_eq!(ctx.company_id(), company);
                let source = ms.iter().find(|m| m.id == ctx.membership_id());
                prop_assert!(source.is_some_and(Membership::is_usable));
            }
            Err(err) => {
                prop_assert!(matches!(err, TenantError::Unauthorized(id) if id == company));
                prop_assert!(!ms.iter().any(|m| m.company_id == company && m.is_usable()));
            }
        }
    }
}
