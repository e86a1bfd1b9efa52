//! Daily closing arithmetic.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::closing::error::ClosingError;
use crate::closing::types::{ClosingKey, DailyClosing, LivePosition};
use crate::ledger::types::BalanceMovement;

/// Stateless closing computations.
pub struct ClosingService;

impl ClosingService {
    /// Parse an IANA timezone name.
    ///
    /// # Errors
    /// * `ClosingError::InvalidWindow` for an unknown name
    pub fn timezone(name: &str) -> Result<Tz, ClosingError> {
        name.parse::<Tz>()
            .map_err(|_| ClosingError::InvalidWindow(format!("unknown timezone {name}")))
    }

    /// UTC bounds `[start, end)` of a local day.
    ///
    /// # Errors
    /// * `ClosingError::InvalidWindow` if either midnight cannot be resolved
    pub fn window(date: NaiveDate, tz: Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), ClosingError> {
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ClosingError::InvalidWindow(format!("no day after {date}")))?;
        Ok((Self::local_midnight(date, tz)?, Self::local_midnight(next, tz)?))
    }

    /// Local business day containing `at`.
    #[must_use]
    pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
        at.with_timezone(&tz).date_naive()
    }

    /// The most recent day whose window has fully ended at `now`.
    #[must_use]
    pub fn last_closed_day(now: DateTime<Utc>, tz: Tz) -> Option<NaiveDate> {
        Self::local_date(now, tz).checked_sub_days(Days::new(1))
    }

    /// Compute the closing row for one account and day.
    ///
    /// # Arguments
    /// * `key` - Account and day
    /// * `window` - UTC bounds of the day
    /// * `previous` - Latest closing before this day, if any
    /// * `movements` - Movements since the previous window end (or since the
    ///   account opened) and before this window end
    /// * `live` - Live balance plus movements at or after this window end
    /// * `now` - Computation time
    #[must_use]
    pub fn compute(
        key: ClosingKey,
        window: (DateTime<Utc>, DateTime<Utc>),
        previous: Option<&DailyClosing>,
        movements: &[BalanceMovement],
        live: LivePosition,
        now: DateTime<Utc>,
    ) -> DailyClosing {
        let opening_balance = previous.map_or(Decimal::ZERO, |p| p.closing_balance);
        let moved: Decimal = movements.iter().map(|m| m.delta).sum();
        let closing_balance = opening_balance + moved;
        let count = movements
            .iter()
            .filter(|m| m.kind.is_transactional())
            .count();
        let expected_at_end = live.balance - live.moved_since;

        DailyClosing {
            id: Uuid::new_v4(),
            company_id: key.company_id,
            branch_id: key.branch_id,
            provider: key.provider,
            date: key.date,
            window_start: window.0,
            window_end: window.1,
            opening_balance,
            closing_balance,
            transaction_count: u32::try_from(count).unwrap_or(u32::MAX),
            live_balance: live.balance,
            discrepancy: expected_at_end - closing_balance,
            created_at: now,
            recomputed_at: None,
        }
    }

    /// Carry identity and creation time of an existing row into a recomputation.
    #[must_use]
    pub fn recomputed(existing: &DailyClosing, fresh: DailyClosing, now: DateTime<Utc>) -> DailyClosing {
        DailyClosing {
            id: existing.id,
            created_at: existing.created_at,
            recomputed_at: Some(now),
            ..fresh
        }
    }

    fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, ClosingError> {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        let local = tz.from_local_datetime(&midnight);
        local
            .earliest()
            .or_else(|| {
                // Midnight falls in a DST gap; the day starts at the first valid instant.
                (1..=4)
                    .filter_map(|h| {
                        tz.from_local_datetime(&(midnight + chrono::Duration::hours(h)))
                            .earliest()
                    })
                    .next()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| ClosingError::InvalidWindow(format!("no local midnight on {date}")))
    }
}
