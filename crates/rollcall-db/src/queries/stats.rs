use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use rollcall_types::models::PeriodType;

use crate::models::StatRow;
use crate::time::{date_at, fmt_date, opt_date_at, opt_ts_at, uuid_at};
use crate::{CheckinError, Database};

// Aggregates only grow: a recompute after the ledger row moved on (reset,
// carried over to a later day) must not erase a check already counted.
const UPSERT_TAIL: &str = "
    ON CONFLICT(activity_id, member_id, period_type, period_start)
    DO UPDATE SET period_end = excluded.period_end,
                  check_count = MAX(check_count, excluded.check_count),
                  last_check_time = COALESCE(MAX(last_check_time, excluded.last_check_time),
                                             last_check_time, excluded.last_check_time)";

/// What one roll-up wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupReport {
    /// First day aggregated. Earlier than `through` when missed days were
    /// caught up.
    pub from: NaiveDate,
    /// The day before `as_of`.
    pub through: NaiveDate,
    pub days: usize,
    pub weeks: usize,
    pub months: usize,
}

impl Database {
    /// Aggregate every day not yet rolled up, through the day before `as_of`,
    /// for each recurring activity running on it. A day that closes an ISO
    /// week or a month also rolls that period from its day aggregates.
    ///
    /// Advances the watermark the ledger reset is bounded by, so a day's
    /// checks are only cleared once they are counted here.
    pub fn rollup(&self, as_of: NaiveDate) -> Result<RollupReport, CheckinError> {
        let through = as_of - Duration::days(1);

        let report = self.with_tx(|tx| {
            let from = first_pending_day(tx, through)?;
            let mut report = RollupReport {
                from,
                through,
                days: 0,
                weeks: 0,
                months: 0,
            };

            for day in from.iter_days().take_while(|d| *d <= through) {
                report.days += upsert_day(tx, day)?;

                if day.weekday() == Weekday::Sun {
                    let start = day - Duration::days(6);
                    report.weeks += upsert_from_days(tx, PeriodType::Week, start, day)?;
                }
                if is_month_end(day) {
                    let start = day.with_day(1).unwrap_or(day);
                    report.months += upsert_from_days(tx, PeriodType::Month, start, day)?;
                }
            }

            tx.execute(
                "INSERT INTO rollup_state (id, last_day) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET last_day = MAX(last_day, excluded.last_day)",
                [fmt_date(through)],
            )?;
            Ok(report)
        })?;

        info!(
            from = %report.from,
            through = %report.through,
            days = report.days,
            weeks = report.weeks,
            months = report.months,
            "Statistics rolled up"
        );
        Ok(report)
    }

    /// Aggregates of one period type for an activity, latest period first.
    pub fn statistics(
        &self,
        activity_id: Uuid,
        period: PeriodType,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.activity_id, s.member_id, u.username, s.period_start, s.period_end,
                        s.check_count, s.last_check_time
                 FROM stats s
                 JOIN users u ON u.id = s.member_id
                 WHERE s.activity_id = ?1 AND s.period_type = ?2
                 ORDER BY s.period_start DESC, u.username
                 LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt
                .query_map(
                    (activity_id.to_string(), period.as_str(), limit, offset),
                    |row| {
                        Ok(StatRow {
                            activity_id: uuid_at(row, 0)?,
                            member_id: uuid_at(row, 1)?,
                            username: row.get(2)?,
                            period,
                            period_start: date_at(row, 3)?,
                            period_end: date_at(row, 4)?,
                            check_count: row.get(5)?,
                            last_check_time: opt_ts_at(row, 6)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Count a recurring row's check from an earlier day than `now` into that
/// day's aggregate, ahead of the row being reused for today.
pub(crate) fn bank_earlier_check(
    conn: &Connection,
    activity_key: &str,
    member_key: &str,
    now: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO stats (activity_id, member_id, period_type, period_start, period_end,
                                check_count, last_check_time)
             SELECT activity_id, member_id, 'day', date(check_time), date(check_time), 1, check_time
             FROM ledger
             WHERE activity_id = ?1 AND member_id = ?2
               AND checked = 1 AND date(check_time) < date(?3)
             {UPSERT_TAIL}"
        ),
        (activity_key, member_key, now),
    )
}

/// The day after the watermark. Before the first roll-up, the earliest day
/// holding a recurring check or a banked aggregate. Never later than `through`.
fn first_pending_day(conn: &Connection, through: NaiveDate) -> rusqlite::Result<NaiveDate> {
    let watermark = conn
        .query_row("SELECT last_day FROM rollup_state WHERE id = 1", [], |row| {
            date_at(row, 0)
        })
        .optional()?;

    let from = match watermark {
        Some(last) => last.succ_opt(),
        None => conn.query_row(
            "SELECT MIN(d) FROM (
                 SELECT date(g.check_time) AS d
                 FROM ledger g
                 JOIN activities a ON a.id = g.activity_id
                 WHERE a.kind = 'recurring' AND g.checked = 1
                 UNION ALL
                 SELECT period_start FROM stats WHERE period_type = 'day'
             )",
            [],
            |row| opt_date_at(row, 0),
        )?,
    };

    Ok(from.map_or(through, |day| day.min(through)))
}

fn is_month_end(day: NaiveDate) -> bool {
    day.succ_opt().is_none_or(|next| next.month() != day.month())
}

fn upsert_day(conn: &Connection, day: NaiveDate) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO stats (activity_id, member_id, period_type, period_start, period_end,
                                check_count, last_check_time)
             SELECT g.activity_id, g.member_id, 'day', ?1, ?1,
                    SUM(CASE WHEN g.checked = 1 AND date(g.check_time) = ?1 THEN 1 ELSE 0 END),
                    MAX(CASE WHEN g.checked = 1 AND date(g.check_time) = ?1 THEN g.check_time END)
             FROM ledger g
             JOIN activities a ON a.id = g.activity_id
             WHERE a.kind = 'recurring' AND ?1 BETWEEN a.start_date AND a.end_date
             GROUP BY g.activity_id, g.member_id
             {UPSERT_TAIL}"
        ),
        [fmt_date(day)],
    )
}

fn upsert_from_days(
    conn: &Connection,
    period: PeriodType,
    start: NaiveDate,
    end: NaiveDate,
) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO stats (activity_id, member_id, period_type, period_start, period_end,
                                check_count, last_check_time)
             SELECT activity_id, member_id, ?1, ?2, ?3, SUM(check_count), MAX(last_check_time)
             FROM stats
             WHERE period_type = 'day' AND period_start BETWEEN ?2 AND ?3
             GROUP BY activity_id, member_id
             {UPSERT_TAIL}"
        ),
        (period.as_str(), fmt_date(start), fmt_date(end)),
    )
}
