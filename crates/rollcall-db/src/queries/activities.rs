use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;
use uuid::Uuid;

use rollcall_types::models::{ActivityKind, ActivityStatus, ActivityWindow, Verification, VerifyMode};

use crate::models::{ActivityListing, ActivityRow, CreatedActivity, NewActivity, RosterRow};
use crate::time::{date_at, fmt_date, fmt_time, fmt_ts, opt_ts_at, time_at, ts_at, uuid_at};
use crate::{CheckinError, Database};

pub(crate) const ACTIVITY_COLUMNS: &str = "a.id, a.author_id, a.list_id, a.title, a.content, \
     a.kind, a.verification, a.status, a.password, a.start_time, a.duration_minutes, \
     a.start_date, a.end_date, a.daily_cutoff, a.latitude, a.longitude, a.radius_m, \
     a.created_at, a.updated_at";

const LISTING_FROM: &str = "FROM activities a
     JOIN users u ON u.id = a.author_id
     JOIN member_lists l ON l.id = a.list_id";

// One unchecked row per current member, written in the creation transaction.
const FAN_OUT_CREATE: &str = "
    INSERT INTO ledger (activity_id, member_id, list_id, checked, check_time)
    SELECT ?1, member_id, list_id, 0, NULL FROM memberships WHERE list_id = ?2";

impl Database {
    /// Publish an activity and fan it out to the bound list's members.
    ///
    /// The list must exist and belong to the author, and must have at least
    /// one member. The initial status is evaluated at `now`.
    pub fn create_activity(
        &self,
        new: &NewActivity,
        now: NaiveDateTime,
    ) -> Result<CreatedActivity, CheckinError> {
        new.window.validate().map_err(CheckinError::Configuration)?;

        let id = Uuid::now_v7();
        let status = if new.window.contains(now) {
            ActivityStatus::Active
        } else {
            ActivityStatus::Inactive
        };
        let list_key = new.list_id.to_string();
        let author_key = new.author_id.to_string();

        let participants = self.with_tx(|tx| {
            let owner: Option<String> = tx
                .query_row(
                    "SELECT author_id FROM member_lists WHERE id = ?1",
                    [&list_key],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.as_deref() != Some(author_key.as_str()) {
                return Err(CheckinError::ListNotFound);
            }

            insert_activity(tx, id, new, status, now)?;

            let seeded = tx.execute(FAN_OUT_CREATE, (id.to_string(), &list_key))?;
            if seeded == 0 {
                return Err(CheckinError::ListEmpty);
            }
            Ok(seeded)
        })?;

        info!(
            activity_id = %id,
            list_id = %new.list_id,
            kind = new.window.kind().as_str(),
            affected = participants,
            "Activity created"
        );

        Ok(CreatedActivity {
            id,
            participants,
            status,
        })
    }

    /// Hard-delete an activity; its ledger rows and statistics cascade.
    pub fn delete_activity(&self, id: Uuid, author_id: Uuid) -> Result<(), CheckinError> {
        let deleted = self.with_tx(|tx| {
            Ok(tx.execute(
                "DELETE FROM activities WHERE id = ?1 AND author_id = ?2",
                (id.to_string(), author_id.to_string()),
            )?)
        })?;
        if deleted == 0 {
            return Err(CheckinError::ActivityNotFound);
        }
        info!(activity_id = %id, "Activity deleted");
        Ok(())
    }

    pub fn get_activity(&self, id: Uuid) -> Result<Option<ActivityRow>> {
        self.with_conn(|conn| Ok(query_activity(conn, id)?))
    }

    pub fn get_activity_listing(&self, id: Uuid) -> Result<Option<ActivityListing>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ACTIVITY_COLUMNS}, u.username, l.name {LISTING_FROM} WHERE a.id = ?1"),
                    [id.to_string()],
                    listing_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Active activities `member_id` still has to check in to, newest first.
    /// A recurring check from an earlier day no longer counts.
    pub fn open_activities_for(
        &self,
        member_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ActivityListing>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTIVITY_COLUMNS}, u.username, l.name {LISTING_FROM}
                 JOIN ledger g ON g.activity_id = a.id
                 WHERE g.member_id = ?1 AND a.status = 1
                   AND (g.checked = 0
                        OR (a.kind = 'recurring'
                            AND date(g.check_time) < date('now', 'localtime')))
                 ORDER BY a.created_at DESC, a.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map((member_id.to_string(), limit, offset), listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn activities_by_author(
        &self,
        author_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ActivityListing>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTIVITY_COLUMNS}, u.username, l.name {LISTING_FROM}
                 WHERE a.author_id = ?1
                 ORDER BY a.created_at DESC, a.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map((author_id.to_string(), limit, offset), listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Check-ins `member_id` has completed, most recent first.
    pub fn history_for(
        &self,
        member_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<(ActivityListing, NaiveDateTime)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTIVITY_COLUMNS}, u.username, l.name, g.check_time {LISTING_FROM}
                 JOIN ledger g ON g.activity_id = a.id
                 WHERE g.member_id = ?1 AND g.checked = 1
                 ORDER BY g.check_time DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map((member_id.to_string(), limit, offset), |row| {
                    Ok((listing_from_row(row)?, ts_at(row, 21)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// `(checked, unchecked)` ledger counts for an activity.
    pub fn roster_counts(&self, activity_id: Uuid) -> Result<(i64, i64)> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT COALESCE(SUM(checked), 0), COUNT(*) - COALESCE(SUM(checked), 0)
                 FROM ledger WHERE activity_id = ?1",
                [activity_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(counts)
        })
    }

    /// One page of the checked (or unchecked) side of an activity's roster.
    pub fn roster(
        &self,
        activity_id: Uuid,
        checked: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RosterRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, g.check_time
                 FROM ledger g
                 JOIN users u ON u.id = g.member_id
                 WHERE g.activity_id = ?1 AND g.checked = ?2
                 ORDER BY g.check_time, u.username
                 LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt
                .query_map(
                    (activity_id.to_string(), checked, limit, offset),
                    |row| {
                        Ok(RosterRow {
                            user_id: uuid_at(row, 0)?,
                            username: row.get(1)?,
                            check_time: opt_ts_at(row, 2)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn insert_activity(
    conn: &Connection,
    id: Uuid,
    new: &NewActivity,
    status: ActivityStatus,
    now: NaiveDateTime,
) -> rusqlite::Result<()> {
    let (start_time, duration_minutes, start_date, end_date, daily_cutoff) = match new.window {
        ActivityWindow::OneOff {
            start_time,
            duration_minutes,
        } => (Some(fmt_ts(start_time)), Some(duration_minutes), None, None, None),
        ActivityWindow::Recurring {
            start_date,
            end_date,
            daily_cutoff,
        } => (
            None,
            None,
            Some(fmt_date(start_date)),
            Some(fmt_date(end_date)),
            Some(fmt_time(daily_cutoff)),
        ),
    };

    let (password, latitude, longitude, radius_m) = match &new.verification {
        Verification::Password { password } => (Some(password.as_str()), None, None, None),
        Verification::QrToken => (None, None, None, None),
        Verification::Geofence {
            latitude,
            longitude,
            radius_m,
        } => (None, Some(*latitude), Some(*longitude), Some(*radius_m)),
    };

    let stamp = fmt_ts(now);
    conn.execute(
        "INSERT INTO activities (
            id, author_id, list_id, title, content, kind, verification, status,
            password, start_time, duration_minutes, start_date, end_date, daily_cutoff,
            latitude, longitude, radius_m, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
        params![
            id.to_string(),
            new.author_id.to_string(),
            new.list_id.to_string(),
            new.title,
            new.content,
            new.window.kind().as_str(),
            new.verification.mode().as_str(),
            status.flag(),
            password,
            start_time,
            duration_minutes,
            start_date,
            end_date,
            daily_cutoff,
            latitude,
            longitude,
            radius_m,
            stamp,
        ],
    )?;
    Ok(())
}

pub(crate) fn query_activity(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<ActivityRow>> {
    conn.query_row(
        &format!("SELECT {ACTIVITY_COLUMNS} FROM activities a WHERE a.id = ?1"),
        [id.to_string()],
        activity_from_row,
    )
    .optional()
}

fn corrupt(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

/// Rebuild an activity from the first 19 columns of `ACTIVITY_COLUMNS`.
pub(crate) fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityRow> {
    let kind: String = row.get(5)?;
    let window = match ActivityKind::parse(&kind) {
        Some(ActivityKind::OneOff) => ActivityWindow::OneOff {
            start_time: ts_at(row, 9)?,
            duration_minutes: row.get(10)?,
        },
        Some(ActivityKind::Recurring) => ActivityWindow::Recurring {
            start_date: date_at(row, 11)?,
            end_date: date_at(row, 12)?,
            daily_cutoff: time_at(row, 13)?,
        },
        None => return Err(corrupt(5, format!("unknown activity kind '{kind}'"))),
    };

    let mode: String = row.get(6)?;
    let verification = match VerifyMode::parse(&mode) {
        Some(VerifyMode::Password) => Verification::Password {
            password: row.get(8)?,
        },
        Some(VerifyMode::QrToken) => Verification::QrToken,
        Some(VerifyMode::Geofence) => Verification::Geofence {
            latitude: row.get(14)?,
            longitude: row.get(15)?,
            radius_m: row.get(16)?,
        },
        None => return Err(corrupt(6, format!("unknown verification mode '{mode}'"))),
    };

    Ok(ActivityRow {
        id: uuid_at(row, 0)?,
        author_id: uuid_at(row, 1)?,
        list_id: uuid_at(row, 2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        status: ActivityStatus::from_flag(row.get(7)?),
        window,
        verification,
        created_at: ts_at(row, 17)?,
        updated_at: ts_at(row, 18)?,
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityListing> {
    Ok(ActivityListing {
        activity: activity_from_row(row)?,
        author_name: row.get(19)?,
        list_name: row.get(20)?,
    })
}
