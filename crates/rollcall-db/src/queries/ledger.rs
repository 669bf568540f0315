use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::{OptionalExtension, Row};
use tracing::{error, info};
use uuid::Uuid;

use rollcall_proof::ProofVerifier;
use rollcall_types::models::{ActivityKind, ActivityStatus, Proof};

use crate::models::LedgerRow;
use crate::queries::activities::query_activity;
use crate::queries::stats::bank_earlier_check;
use crate::time::{fmt_ts, opt_ts_at, truncate, uuid_at};
use crate::{CheckinError, Database};

impl Database {
    /// Mark `member_id` present for `activity_id`.
    ///
    /// Runs in one transaction: load the activity, check the proof, require an
    /// Active status, then flip the ledger row with a conditional update. The
    /// update's affected-row count is what makes the mark exactly-once; the
    /// connection lock only serializes it.
    ///
    /// On a recurring activity a row still holding a check from an earlier day
    /// counts as unchecked today. That check is banked into its day aggregate
    /// before the row is reused, so check-ins open at midnight whether or not
    /// the daily reset has run.
    pub fn participate(
        &self,
        activity_id: Uuid,
        member_id: Uuid,
        proof: &Proof,
        verifier: &ProofVerifier,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime, CheckinError> {
        let check_time = truncate(now);
        let activity_key = activity_id.to_string();
        let member_key = member_id.to_string();

        let result = self.with_tx(|tx| {
            let activity =
                query_activity(tx, activity_id)?.ok_or(CheckinError::ActivityNotFound)?;

            verifier.verify(activity_id, &activity.verification, proof)?;

            if activity.status != ActivityStatus::Active {
                return Err(CheckinError::ActivityNotActive);
            }

            let stamp = fmt_ts(check_time);
            let mut marked = tx.execute(
                "UPDATE ledger SET checked = 1, check_time = ?3
                 WHERE activity_id = ?1 AND member_id = ?2 AND checked = 0",
                (&activity_key, &member_key, &stamp),
            )?;

            if marked == 0 && activity.window.kind() == ActivityKind::Recurring {
                bank_earlier_check(tx, &activity_key, &member_key, &stamp)?;
                marked = tx.execute(
                    "UPDATE ledger SET check_time = ?3
                     WHERE activity_id = ?1 AND member_id = ?2
                       AND checked = 1 AND date(check_time) < date(?3)",
                    (&activity_key, &member_key, &stamp),
                )?;
            }

            if marked == 0 {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM ledger WHERE activity_id = ?1 AND member_id = ?2)",
                    (&activity_key, &member_key),
                    |row| row.get(0),
                )?;
                return Err(if exists {
                    CheckinError::AlreadyChecked
                } else {
                    CheckinError::ActivityNotFound
                });
            }

            Ok(check_time)
        });

        match &result {
            Ok(_) => info!(%activity_id, %member_id, "Checked in"),
            Err(e) if e.is_business() => {
                info!(%activity_id, %member_id, reason = %e, "Check-in refused")
            }
            Err(e) => error!(%activity_id, %member_id, error = %e, "Check-in failed"),
        }
        result
    }

    pub fn ledger_row(&self, activity_id: Uuid, member_id: Uuid) -> Result<Option<LedgerRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT activity_id, member_id, list_id, checked, check_time
                     FROM ledger WHERE activity_id = ?1 AND member_id = ?2",
                    (activity_id.to_string(), member_id.to_string()),
                    ledger_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }
}

fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerRow> {
    Ok(LedgerRow {
        activity_id: uuid_at(row, 0)?,
        member_id: uuid_at(row, 1)?,
        list_id: uuid_at(row, 2)?,
        checked: row.get(3)?,
        check_time: opt_ts_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::queries::fixtures::*;
    use rollcall_proof::ProofError;
    use rollcall_proof::geo::offset_north;
    use rollcall_types::models::{PeriodType, Verification};

    #[test]
    fn thirty_minute_window_with_three_members() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let members: Vec<Uuid> = ["a", "b", "c"].iter().map(|n| user(&db, n)).collect();
        let list = list_with(&db, ann, &members);
        let verifier = verifier();

        let t = at("2025-03-01 09:00:00");
        let id = activity(&db, ann, list, one_off("2025-03-01 09:00:00", 30), pin("1234"), at("2025-03-01 08:00:00"));

        let t15 = t + chrono::Duration::minutes(15);
        db.recompute_active_statuses(t15).unwrap();
        for member in &members {
            let stamp = db.participate(id, *member, &password("1234"), &verifier, t15).unwrap();
            assert_eq!(stamp, t15);
        }
        for member in &members {
            assert!(matches!(
                db.participate(id, *member, &password("1234"), &verifier, t15),
                Err(CheckinError::AlreadyChecked)
            ));
        }

        let t31 = t + chrono::Duration::minutes(31);
        db.recompute_active_statuses(t31).unwrap();
        let late = user(&db, "late");
        db.add_member(list, late).unwrap();
        assert!(matches!(
            db.participate(id, late, &password("1234"), &verifier, t31),
            Err(CheckinError::ActivityNotActive)
        ));
    }

    #[test]
    fn non_participant_and_unknown_activity_are_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let stranger = user(&db, "eve");
        let list = list_with(&db, ann, &[bob]);
        let now = at("2025-03-01 09:05:00");
        let id = activity(&db, ann, list, one_off("2025-03-01 09:00:00", 30), pin("1"), now);

        assert!(matches!(
            db.participate(id, stranger, &password("1"), &verifier(), now),
            Err(CheckinError::ActivityNotFound)
        ));
        assert!(matches!(
            db.participate(Uuid::now_v7(), bob, &password("1"), &verifier(), now),
            Err(CheckinError::ActivityNotFound)
        ));
    }

    #[test]
    fn wrong_proof_leaves_row_unchecked() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);
        let now = at("2025-03-01 09:05:00");
        let id = activity(&db, ann, list, one_off("2025-03-01 09:00:00", 30), pin("1"), now);

        assert!(matches!(
            db.participate(id, bob, &password("2"), &verifier(), now),
            Err(CheckinError::ProofInvalid(ProofError::WrongPassword))
        ));
        assert!(matches!(
            db.participate(id, bob, &Proof::QrToken { token: "x".into() }, &verifier(), now),
            Err(CheckinError::ProofInvalid(ProofError::WrongMethod { .. }))
        ));
        assert!(!db.ledger_row(id, bob).unwrap().unwrap().checked);
    }

    #[test]
    fn geofence_hundred_meter_radius() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);
        let now = at("2025-03-01 09:05:00");
        let fence = Verification::Geofence {
            latitude: 30.0,
            longitude: 120.0,
            radius_m: 100.0,
        };
        let id = activity(&db, ann, list, one_off("2025-03-01 09:00:00", 30), fence, now);
        let verifier = verifier();

        let far = Proof::Geofence {
            latitude: offset_north(30.0, 150.0),
            longitude: 120.0,
        };
        assert!(matches!(
            db.participate(id, bob, &far, &verifier, now),
            Err(CheckinError::ProofInvalid(ProofError::OutOfRange { .. }))
        ));

        let near = Proof::Geofence {
            latitude: offset_north(30.0, 50.0),
            longitude: 120.0,
        };
        db.participate(id, bob, &near, &verifier, now).unwrap();
    }

    #[test]
    fn qr_token_proof_is_bound_to_activity() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);
        let now = at("2025-03-01 09:05:00");
        let window = one_off("2025-03-01 09:00:00", 30);
        let id = activity(&db, ann, list, window, Verification::QrToken, now);
        let other = activity(&db, ann, list, window, Verification::QrToken, now);
        let verifier = verifier();

        let (token, _) = verifier.tokens().issue(other, chrono::Duration::minutes(5)).unwrap();
        assert!(matches!(
            db.participate(id, bob, &Proof::QrToken { token }, &verifier, now),
            Err(CheckinError::ProofInvalid(ProofError::TokenMismatch))
        ));

        let (token, _) = verifier.tokens().issue(id, chrono::Duration::minutes(5)).unwrap();
        db.participate(id, bob, &Proof::QrToken { token }, &verifier, now).unwrap();
    }

    #[test]
    fn concurrent_marks_succeed_exactly_once() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);
        let now = at("2025-03-01 09:05:00");
        let id = activity(&db, ann, list, one_off("2025-03-01 09:00:00", 30), pin("1"), now);
        let verifier = Arc::new(verifier());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let verifier = verifier.clone();
                thread::spawn(move || db.participate(id, bob, &password("1"), &verifier, now))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let already = results
            .iter()
            .filter(|r| matches!(r, Err(CheckinError::AlreadyChecked)))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(already, 7);

        let row = db.ledger_row(id, bob).unwrap().unwrap();
        assert!(row.checked);
        assert_eq!(row.check_time, Some(now));
    }

    #[test]
    fn recurring_check_in_opens_at_midnight_before_the_daily_reset() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);
        let id = activity(&db, ann, list, recurring("2025-03-01", "2025-03-07", (18, 0)), pin("1"), at("2025-03-01 08:00:00"));
        let v = verifier();

        db.participate(id, bob, &password("1"), &v, at("2025-03-01 10:00:00")).unwrap();

        // Day 2 is open from 00:00; the daily pass has not run yet.
        let midnight = at("2025-03-02 00:01:00");
        db.recompute_active_statuses(midnight).unwrap();
        assert_eq!(db.participate(id, bob, &password("1"), &v, midnight).unwrap(), midnight);
        assert!(matches!(
            db.participate(id, bob, &password("1"), &v, at("2025-03-02 09:00:00")),
            Err(CheckinError::AlreadyChecked)
        ));
        assert_eq!(db.ledger_row(id, bob).unwrap().unwrap().check_time, Some(midnight));

        // Day 1's check was banked before the row moved on, and the late
        // roll-up does not erase it.
        db.rollup(day("2025-03-03")).unwrap();
        let stats = db.statistics(id, PeriodType::Day, 10, 0).unwrap();
        let count_on = |d: &str| {
            stats
                .iter()
                .find(|r| r.period_start == day(d))
                .map(|r| (r.check_count, r.last_check_time))
        };
        assert_eq!(count_on("2025-03-01"), Some((1, Some(at("2025-03-01 10:00:00")))));
        assert_eq!(count_on("2025-03-02"), Some((1, Some(midnight))));
    }

    #[test]
    fn one_off_check_is_never_carried_over() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);
        let id = activity(&db, ann, list, one_off("2025-03-01 23:50:00", 30), pin("1"), at("2025-03-01 23:55:00"));
        let v = verifier();

        db.participate(id, bob, &password("1"), &v, at("2025-03-01 23:55:00")).unwrap();
        assert!(matches!(
            db.participate(id, bob, &password("1"), &v, at("2025-03-02 00:10:00")),
            Err(CheckinError::AlreadyChecked)
        ));
    }
}
