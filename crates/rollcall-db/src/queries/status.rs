use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::time::{fmt_date, fmt_ts};
use crate::{CheckinError, Database};

// `?1` is the current instant. Each expression is 1 while the activity is
// inside its window and 0 otherwise, mirroring `ActivityWindow::contains`.
const ONE_OFF_OPEN: &str =
    "(?1 >= start_time AND ?1 < datetime(start_time, '+' || duration_minutes || ' minutes'))";
const RECURRING_OPEN: &str =
    "(date(?1) BETWEEN start_date AND end_date AND time(?1) < daily_cutoff)";

/// What one daily reconciliation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub ledger_reset: usize,
    pub status_changed: usize,
    pub purged: usize,
}

impl Database {
    /// Bring every stored status in line with `now`. Only rows whose status
    /// actually flips are written, so a repeat call at the same instant
    /// returns 0.
    pub fn recompute_active_statuses(&self, now: NaiveDateTime) -> Result<usize, CheckinError> {
        let affected = self.with_tx(|tx| Ok(recompute(tx, now)?))?;
        if affected > 0 {
            info!(affected, "Activity statuses updated");
        } else {
            debug!("Activity statuses unchanged");
        }
        Ok(affected)
    }

    /// Daily pass: reopen recurring check-ins left from earlier days, recompute
    /// every status, and purge activities closed for more than
    /// `retention_days`. All in one transaction.
    ///
    /// Only days already counted by [`Database::rollup`] are reopened, so a
    /// run after a failed or missed roll-up leaves those rows for the next one.
    pub fn daily_reconcile(
        &self,
        now: NaiveDateTime,
        retention_days: u32,
    ) -> Result<ReconcileReport, CheckinError> {
        let report = self.with_tx(|tx| {
            let ledger_reset = reset_counted_days(tx, now.date())?;
            let status_changed = recompute(tx, now)?;
            let purged = purge_expired(tx, now, retention_days)?;
            Ok(ReconcileReport {
                ledger_reset,
                status_changed,
                purged,
            })
        })?;

        info!(
            ledger_reset = report.ledger_reset,
            status_changed = report.status_changed,
            purged = report.purged,
            "Daily reconciliation complete"
        );
        Ok(report)
    }
}

fn recompute(conn: &Connection, now: NaiveDateTime) -> rusqlite::Result<usize> {
    let now = fmt_ts(now);
    let one_off = conn.execute(
        &format!(
            "UPDATE activities SET status = {ONE_OFF_OPEN}
             WHERE kind = 'one_off' AND status != {ONE_OFF_OPEN}"
        ),
        [&now],
    )?;
    let recurring = conn.execute(
        &format!(
            "UPDATE activities SET status = {RECURRING_OPEN}
             WHERE kind = 'recurring' AND status != {RECURRING_OPEN}"
        ),
        [&now],
    )?;
    Ok(one_off + recurring)
}

/// Reopen checks made before `today` on recurring activities still running
/// today, up to the roll-up watermark. Rows of ended activities keep their
/// last check.
fn reset_counted_days(conn: &Connection, today: NaiveDate) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE ledger SET checked = 0, check_time = NULL
         WHERE checked = 1
           AND date(check_time) < ?1
           AND date(check_time) <= (SELECT last_day FROM rollup_state WHERE id = 1)
           AND activity_id IN (
               SELECT id FROM activities
               WHERE kind = 'recurring' AND ?1 BETWEEN start_date AND end_date
           )",
        [fmt_date(today)],
    )
}

fn purge_expired(conn: &Connection, now: NaiveDateTime, retention_days: u32) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM activities
         WHERE status = 0
           AND (
               (kind = 'one_off'
                   AND ?1 > datetime(start_time, '+' || duration_minutes || ' minutes',
                                     '+' || ?2 || ' days'))
               OR
               (kind = 'recurring' AND date(?1) > date(end_date, '+' || ?2 || ' days'))
           )",
        (fmt_ts(now), retention_days),
    )
}
