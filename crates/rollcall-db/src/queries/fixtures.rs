//! Shared setup for the query tests.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use rollcall_proof::ProofVerifier;
use rollcall_proof::token::CheckinTokens;
use rollcall_types::models::{ActivityWindow, Proof, Verification};

use crate::Database;
use crate::models::NewActivity;

pub(crate) fn at(s: &str) -> NaiveDateTime {
    crate::time::parse_ts(s).unwrap()
}

pub(crate) fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub(crate) fn verifier() -> ProofVerifier {
    ProofVerifier::new(CheckinTokens::new(b"fixture-secret"))
}

pub(crate) fn password(p: &str) -> Proof {
    Proof::Password { password: p.into() }
}

pub(crate) fn user(db: &Database, name: &str) -> Uuid {
    let id = Uuid::now_v7();
    db.create_user(id, name, "hash").unwrap();
    id
}

/// A list owned by `author` with `members` already joined.
pub(crate) fn list_with(db: &Database, author: Uuid, members: &[Uuid]) -> Uuid {
    let id = Uuid::now_v7();
    db.create_list(id, author, &format!("list-{id}")).unwrap().unwrap();
    for member in members {
        db.add_member(id, *member).unwrap();
    }
    id
}

pub(crate) fn one_off(start: &str, minutes: u32) -> ActivityWindow {
    ActivityWindow::OneOff {
        start_time: at(start),
        duration_minutes: minutes,
    }
}

pub(crate) fn recurring(start: &str, end: &str, cutoff: (u32, u32)) -> ActivityWindow {
    ActivityWindow::Recurring {
        start_date: day(start),
        end_date: day(end),
        daily_cutoff: NaiveTime::from_hms_opt(cutoff.0, cutoff.1, 0).unwrap(),
    }
}

pub(crate) fn activity(
    db: &Database,
    author: Uuid,
    list: Uuid,
    window: ActivityWindow,
    verification: Verification,
    now: NaiveDateTime,
) -> Uuid {
    db.create_activity(
        &NewActivity {
            author_id: author,
            list_id: list,
            title: "standup".into(),
            content: String::new(),
            window,
            verification,
        },
        now,
    )
    .unwrap()
    .id
}

pub(crate) fn pin(p: &str) -> Verification {
    Verification::Password { password: p.into() }
}
