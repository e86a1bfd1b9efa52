//! Daily closings: window checks, idempotence, forced recomputation,
//! discrepancy detection, and the scheduler loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use merchant_core::audit::{AuditAction, AuditEntry};
use merchant_core::closing::{
    ClosingError, ClosingKey, ClosingService, ClosingStore, DailyClosing, LivePosition,
};
use merchant_core::ledger::{BalanceMovement, Direction, Provider};
use merchant_engine::{CloseOutcome, CloseRequest, ClosingAggregator, MemoryStore};
use merchant_shared::PageRequest;

use common::{Harness, audit_actions, bank, harness, momo};

fn aggregator(h: &Harness) -> ClosingAggregator {
    ClosingAggregator::new(h.store.clone(), h.store.clone(), h.store.clone(), Tz::UTC)
}

fn today() -> NaiveDate {
    ClosingService::local_date(Utc::now(), Tz::UTC)
}

fn yesterday() -> NaiveDate {
    today().checked_sub_days(Days::new(1)).unwrap()
}

fn request(h: &Harness, provider: Provider, date: NaiveDate, force: bool) -> CloseRequest {
    CloseRequest {
        branch_id: h.tenant.branch.id,
        provider,
        date,
        force,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_open_day_cannot_be_closed() {
    let h = harness().await;
    let err = aggregator(&h)
        .close_day(&h.tenant.manager, request(&h, Provider::Ecobank, today(), false))
        .await
        .unwrap_err();
    assert!(matches!(err, ClosingError::WindowOpen(d) if d == today()));
    assert_eq!(err.error_code(), "WINDOW_OPEN");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_day_permissions_and_missing_account() {
    let h = harness().await;
    let closings = aggregator(&h);

    let err = closings
        .close_day(&h.tenant.teller, request(&h, Provider::Ecobank, yesterday(), false))
        .await
        .unwrap_err();
    assert!(matches!(err, ClosingError::InsufficientRole { .. }));

    let err = closings
        .close_day(&h.tenant.manager, request(&h, Provider::Ecobank, yesterday(), true))
        .await
        .unwrap_err();
    assert!(matches!(err, ClosingError::InsufficientRole { .. }));

    let err = closings
        .close_day(&h.tenant.manager, request(&h, Provider::Cash, yesterday(), false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClosingError::AccountNotFound {
            provider: Provider::Cash,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_closing_is_idempotent_and_force_recomputes() {
    let h = harness().await;
    let closings = aggregator(&h);
    let req = request(&h, Provider::Ecobank, yesterday(), false);

    let closed = match closings.close_day(&h.tenant.manager, req).await.unwrap() {
        CloseOutcome::Closed(closing) => closing,
        other => panic!("expected a first closing, got {other:?}"),
    };
    // The account opened today, so nothing moved before yesterday's end.
    assert_eq!(closed.opening_balance, Decimal::ZERO);
    assert_eq!(closed.closing_balance, Decimal::ZERO);
    assert_eq!(closed.transaction_count, 0);
    assert_eq!(closed.live_balance, dec!(10000));
    assert_eq!(closed.discrepancy, Decimal::ZERO);
    assert_eq!(closed.recomputed_at, None);

    let again = closings.close_day(&h.tenant.admin, req).await.unwrap();
    assert_eq!(again, CloseOutcome::AlreadyClosed(closed.clone()));

    let recomputed = match closings
        .close_day(&h.tenant.admin, CloseRequest { force: true, ..req })
        .await
        .unwrap()
    {
        CloseOutcome::Recomputed(closing) => closing,
        other => panic!("expected a recomputation, got {other:?}"),
    };
    assert_eq!(recomputed.id, closed.id);
    assert_eq!(recomputed.created_at, closed.created_at);
    assert!(recomputed.recomputed_at.is_some());

    assert_eq!(
        audit_actions(&h.store, h.tenant.company.id, closed.id).await,
        vec![AuditAction::CloseDay, AuditAction::ForceCloseDay]
    );
    let listed = closings
        .list(&h.tenant.manager, Some(yesterday()), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![recomputed]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_all_rolls_the_day_forward() {
    let h = harness().await;
    let t = &h.tenant;
    h.ledger
        .create(&t.teller, bank(t, Direction::In, dec!(50)))
        .await
        .unwrap();
    h.ledger
        .create(&t.teller, momo(t, Direction::Out, dec!(120)))
        .await
        .unwrap();
    let pending = h
        .ledger
        .create(&t.teller, bank(t, Direction::In, dec!(5000)))
        .await
        .unwrap();
    assert!(pending.requires_approval);

    let closings = aggregator(&h);
    closings
        .close_day(&t.manager, request(&h, Provider::Ecobank, yesterday(), false))
        .await
        .unwrap();

    // A day later, today is the last fully ended day.
    let later = Utc::now() + chrono::Duration::days(1);
    let summary = closings.close_all(later).await.unwrap();
    assert_eq!(summary.closed, 2);
    assert_eq!(summary.failed, 0);

    let rows = closings
        .list(&t.manager, Some(today()), PageRequest::default())
        .await
        .unwrap();
    let bank_row = rows.iter().find(|r| r.provider == Provider::Ecobank).unwrap();
    assert_eq!(bank_row.opening_balance, Decimal::ZERO);
    assert_eq!(bank_row.closing_balance, dec!(10050));
    assert_eq!(bank_row.transaction_count, 1);
    assert_eq!(bank_row.discrepancy, Decimal::ZERO);
    let momo_row = rows.iter().find(|r| r.provider == Provider::Mtn).unwrap();
    assert_eq!(momo_row.closing_balance, dec!(1880));
    assert_eq!(momo_row.live_balance, dec!(1880));

    let summary = closings.close_all(later).await.unwrap();
    assert_eq!(summary.closed, 0);
    assert_eq!(summary.skipped, 2);
}

/// Reports a live balance that drifted from the movement history.
struct DriftedStore {
    inner: Arc<MemoryStore>,
    drift: Decimal,
}

#[async_trait]
impl ClosingStore for DriftedStore {
    async fn find(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError> {
        self.inner.find(key).await
    }

    async fn previous(&self, key: ClosingKey) -> Result<Option<DailyClosing>, ClosingError> {
        self.inner.previous(key).await
    }

    async fn movements(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<BalanceMovement>, ClosingError> {
        self.inner
            .movements(company_id, branch_id, provider, from, until)
            .await
    }

    async fn live_position(
        &self,
        company_id: Uuid,
        branch_id: Uuid,
        provider: Provider,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<LivePosition>, ClosingError> {
        let live = self
            .inner
            .live_position(company_id, branch_id, provider, cutoff)
            .await?;
        Ok(live.map(|p| LivePosition {
            balance: p.balance + self.drift,
            ..p
        }))
    }

    async fn save(
        &self,
        closing: DailyClosing,
        audit: AuditEntry,
        replace: bool,
    ) -> Result<DailyClosing, ClosingError> {
        self.inner.save(closing, audit, replace).await
    }

    async fn list(
        &self,
        company_id: Uuid,
        date: Option<NaiveDate>,
        page: PageRequest,
    ) -> Result<Vec<DailyClosing>, ClosingError> {
        self.inner.list(company_id, date, page).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drifted_balance_is_reported() {
    let h = harness().await;
    let drifted = Arc::new(DriftedStore {
        inner: h.store.clone(),
        drift: dec!(5),
    });
    let closings = ClosingAggregator::new(drifted, h.store.clone(), h.store.clone(), Tz::UTC);

    let outcome = closings
        .close_day(&h.tenant.manager, request(&h, Provider::Ecobank, yesterday(), false))
        .await
        .unwrap();
    let closing = outcome.closing();
    assert_eq!(closing.closing_balance, Decimal::ZERO);
    assert_eq!(closing.live_balance, dec!(10005));
    assert_eq!(closing.discrepancy, dec!(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scheduler_closes_yesterday_until_cancelled() {
    let h = harness().await;
    let closings = Arc::new(aggregator(&h));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        Arc::clone(&closings).run(Duration::from_millis(10), cancel.clone()),
    );

    let mut rows = Vec::new();
    for _ in 0..100 {
        rows = closings
            .list(&h.tenant.manager, Some(yesterday()), PageRequest::default())
            .await
            .unwrap();
        if rows.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(rows.len(), 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
