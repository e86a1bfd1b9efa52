//! Daily closing aggregation and its scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use merchant_core::audit::{AuditAction, AuditRecorder, EntityType};
use merchant_core::closing::{ClosingError, ClosingKey, ClosingService, ClosingStore, DailyClosing};
use merchant_core::ledger::{LedgerStore, Provider};
use merchant_core::tenant::{Actor, Role, TenantContext, TenantDirectory};
use merchant_shared::PageRequest;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Request to close one account's day.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CloseRequest {
    /// Branch of the account.
    pub branch_id: Uuid,
    /// Provider of the account.
    pub provider: Provider,
    /// Local business day.
    pub date: NaiveDate,
    /// Recompute an existing closing (admin+).
    #[serde(default)]
    pub force: bool,
}

/// What a close call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "closing", rename_all = "snake_case")]
pub enum CloseOutcome {
    /// First closing for the day.
    Closed(DailyClosing),
    /// The day was already closed; the stored row is returned unchanged.
    AlreadyClosed(DailyClosing),
    /// A forced recomputation overwrote the figures.
    Recomputed(DailyClosing),
}

impl CloseOutcome {
    /// The closing row.
    #[must_use]
    pub const fn closing(&self) -> &DailyClosing {
        match self {
            Self::Closed(c) | Self::AlreadyClosed(c) | Self::Recomputed(c) => c,
        }
    }
}

/// Counts from one scheduled pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSummary {
    /// New closings written.
    pub closed: usize,
    /// Accounts already closed for the day.
    pub skipped: usize,
    /// Accounts that failed to close.
    pub failed: usize,
}

/// Computes and stores daily closings.
pub struct ClosingAggregator {
    store: Arc<dyn ClosingStore>,
    ledger: Arc<dyn LedgerStore>,
    directory: Arc<dyn TenantDirectory>,
    tz: Tz,
}

impl ClosingAggregator {
    /// Creates an aggregator working in timezone `tz`.
    #[must_use]
    pub fn new(
        store: Arc<dyn ClosingStore>,
        ledger: Arc<dyn LedgerStore>,
        directory: Arc<dyn TenantDirectory>,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            ledger,
            directory,
            tz,
        }
    }

    /// Close a day for one account on behalf of a member.
    ///
    /// Manager+ may close; forcing a recomputation needs admin+.
    pub async fn close_day(
        &self,
        ctx: &TenantContext,
        request: CloseRequest,
    ) -> Result<CloseOutcome, ClosingError> {
        let required = if request.force {
            Role::Admin
        } else {
            Role::Manager
        };
        if !ctx.role().at_least(required) {
            return Err(ClosingError::InsufficientRole {
                role: ctx.role(),
                required,
            });
        }
        let key = ClosingKey {
            company_id: ctx.company_id(),
            branch_id: request.branch_id,
            provider: request.provider,
            date: request.date,
        };
        self.close(key, ctx.actor(), request.force, Utc::now()).await
    }

    /// Closings of the caller's company, newest day first.
    pub async fn list(
        &self,
        ctx: &TenantContext,
        date: Option<NaiveDate>,
        page: PageRequest,
    ) -> Result<Vec<DailyClosing>, ClosingError> {
        self.store.list(ctx.company_id(), date, page).await
    }

    /// Close the last fully ended day for every account of every active
    /// company. Existing closings are left untouched.
    pub async fn close_all(&self, now: DateTime<Utc>) -> Result<CloseSummary, ClosingError> {
        let mut summary = CloseSummary::default();
        let Some(date) = ClosingService::last_closed_day(now, self.tz) else {
            return Ok(summary);
        };
        let companies = self
            .directory
            .active_companies()
            .await
            .map_err(|e| ClosingError::Storage(e.to_string()))?;

        for company in companies {
            let balances = self
                .ledger
                .balances(company.id)
                .await
                .map_err(|e| ClosingError::Storage(e.to_string()))?;
            for account in balances {
                let key = ClosingKey {
                    company_id: company.id,
                    branch_id: account.branch_id,
                    provider: account.provider,
                    date,
                };
                match self.close(key, Actor::System, false, now).await {
                    Ok(CloseOutcome::AlreadyClosed(_)) => summary.skipped += 1,
                    Ok(_) => summary.closed += 1,
                    Err(err) => {
                        summary.failed += 1;
                        error!(
                            company_id = %company.id,
                            branch_id = %account.branch_id,
                            provider = %account.provider,
                            %date,
                            error = %err,
                            "Daily closing failed"
                        );
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Scheduler loop: run `close_all` every `interval` until cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), timezone = %self.tz, "Closing scheduler started");
        loop {
            match self.close_all(Utc::now()).await {
                Ok(summary) if summary.closed > 0 || summary.failed > 0 => info!(
                    closed = summary.closed,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Closing pass finished"
                ),
                Ok(_) => {}
                Err(err) => error!(error = %err, "Closing pass failed"),
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        info!("Closing scheduler stopped");
    }

    async fn close(
        &self,
        key: ClosingKey,
        actor: Actor,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<CloseOutcome, ClosingError> {
        let window = ClosingService::window(key.date, self.tz)?;
        if now < window.1 {
            return Err(ClosingError::WindowOpen(key.date));
        }

        let existing = self.store.find(key).await?;
        if let Some(existing) = existing.as_ref().filter(|_| !force) {
            return Ok(CloseOutcome::AlreadyClosed(existing.clone()));
        }

        let Some(live) = self
            .store
            .live_position(key.company_id, key.branch_id, key.provider, window.1)
            .await?
        else {
            return Err(ClosingError::AccountNotFound {
                branch_id: key.branch_id,
                provider: key.provider,
            });
        };
        let previous = self.store.previous(key).await?;
        let movements = self
            .store
            .movements(
                key.company_id,
                key.branch_id,
                key.provider,
                previous.as_ref().map(|p| p.window_end),
                window.1,
            )
            .await?;

        let fresh = ClosingService::compute(key, window, previous.as_ref(), &movements, live, now);
        let (closing, action) = match &existing {
            Some(existing) => (
                ClosingService::recomputed(existing, fresh, now),
                AuditAction::ForceCloseDay,
            ),
            None => (fresh, AuditAction::CloseDay),
        };
        let audit = AuditRecorder::record(
            key.company_id,
            actor,
            action,
            (EntityType::DailyClosing, closing.id),
            existing.as_ref(),
            Some(&closing),
            now,
        )?;

        match self.store.save(closing, audit, existing.is_some()).await {
            Ok(saved) => {
                if !saved.discrepancy.is_zero() {
                    warn!(
                        company_id = %saved.company_id,
                        branch_id = %saved.branch_id,
                        provider = %saved.provider,
                        date = %saved.date,
                        discrepancy = %saved.discrepancy,
                        "Closing found a discrepancy"
                    );
                }
                info!(
                    company_id = %saved.company_id,
                    branch_id = %saved.branch_id,
                    provider = %saved.provider,
                    date = %saved.date,
                    forced = existing.is_some(),
                    "Day closed"
                );
                Ok(if existing.is_some() {
                    CloseOutcome::Recomputed(saved)
                } else {
                    CloseOutcome::Closed(saved)
                })
            }
            // Another closer won the race for a first closing.
            Err(ClosingError::AlreadyClosed(date)) => self
                .store
                .find(key)
                .await?
                .map(CloseOutcome::AlreadyClosed)
                .ok_or(ClosingError::AlreadyClosed(date)),
            Err(err) => Err(err),
        }
    }
}
