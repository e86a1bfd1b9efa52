//! Tenant isolation: nothing crosses a company boundary.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use merchant_core::audit::{AuditLog, AuditQuery};
use merchant_core::ledger::{Direction, LedgerError, Provider};
use merchant_core::tenant::{CompanySettings, TenantDirectory, TenantError};
use merchant_engine::{CachedTenantDirectory, TenantContextResolver};

use common::{bank, harness, tenant};

#[tokio::test(flavor = "multi_thread")]
async fn test_foreign_transaction_is_not_found() {
    let h = harness().await;
    let other = tenant(&h.store, &h.ledger, CompanySettings::default()).await;
    let t = &h.tenant;

    let tx = h
        .ledger
        .create(&t.teller, bank(t, Direction::In, dec!(2000)))
        .await
        .unwrap();
    let before = h.audit_actions(tx.id).await;

    assert!(matches!(
        h.ledger.get(&other.admin, tx.id).await,
        Err(LedgerError::NotFound(id)) if id == tx.id
    ));
    assert!(matches!(
        h.ledger.approve(&other.admin, tx.id).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        h.ledger.reject(&other.manager, tx.id, None).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        h.ledger.reverse(&other.admin, tx.id, None).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        h.ledger.reversal(&other.admin, tx.id).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        h.ledger.fail_from_provider(other.company.id, tx.id, None).await,
        Err(LedgerError::NotFound(_))
    ));

    assert_eq!(h.audit_actions(tx.id).await, before);
    let foreign_entries = h
        .store
        .entries(
            other.company.id,
            AuditQuery {
                entity_id: Some(tx.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(foreign_entries.is_empty());
    assert!(
        h.ledger
            .list(&other.admin, Default::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(h.ledger.balances(&other.admin).await.unwrap().len(), 2);
    assert_eq!(h.balance(Provider::Ecobank).await, dec!(10000));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_foreign_branch_is_rejected() {
    let h = harness().await;
    let other = tenant(&h.store, &h.ledger, CompanySettings::default()).await;

    let mut input = bank(&h.tenant, Direction::In, dec!(10));
    input.branch_id = other.branch.id;
    let err = h.ledger.create(&h.tenant.teller, input).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_suspended_company_is_locked_out() {
    let h = harness().await;
    let t = &h.tenant;
    h.store.set_company_active(t.company.id, false);

    let err = h
        .ledger
        .create(&t.teller, bank(t, Direction::In, dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized(_)));

    let resolver = TenantContextResolver::new(h.store.clone());
    let err = resolver
        .resolve(t.memberships[0].user_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::NoTenant));

    let active = h.store.active_companies().await.unwrap();
    assert!(active.iter().all(|c| c.id != t.company.id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_user_in_two_companies_must_select() {
    let h = harness().await;
    let other = tenant(&h.store, &h.ledger, CompanySettings::default()).await;

    // Give the first company's teller a manager seat in the second one.
    let user_id = h.tenant.memberships[0].user_id;
    let mut seat = other.memberships[1].clone();
    seat.id = uuid::Uuid::new_v4();
    seat.user_id = user_id;
    h.store.add_membership(seat.clone());

    let directory = Arc::new(CachedTenantDirectory::new(
        h.store.clone(),
        Duration::from_secs(60),
    ));
    let resolver = TenantContextResolver::new(directory);

    let err = resolver.resolve(user_id, None).await.unwrap_err();
    assert!(matches!(err, TenantError::AmbiguousTenant(2)));

    let ctx = resolver
        .resolve(user_id, Some(other.company.id))
        .await
        .unwrap();
    assert_eq!(ctx.company_id(), other.company.id);
    assert_eq!(ctx.membership_id(), seat.id);

    let err = resolver
        .resolve(uuid::Uuid::new_v4(), Some(other.company.id))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::Unauthorized(id) if id == other.company.id));
}
