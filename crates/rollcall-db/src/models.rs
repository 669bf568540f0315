//! Database row types. Distinct from the rollcall-types API models so the
//! storage layer can change without touching the wire format.

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use rollcall_types::models::{ActivityStatus, ActivityWindow, PeriodType, Verification};

pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct ListRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub member_count: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user_id: Uuid,
    pub username: String,
}

/// Fields an author supplies when publishing an activity.
pub struct NewActivity {
    pub author_id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub content: String,
    pub window: ActivityWindow,
    pub verification: Verification,
}

/// Result of publishing: the new id, how many ledger rows fan-out wrote,
/// and the status the activity starts in.
#[derive(Debug, Clone, Copy)]
pub struct CreatedActivity {
    pub id: Uuid,
    pub participants: usize,
    pub status: ActivityStatus,
}

#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub content: String,
    pub status: ActivityStatus,
    pub window: ActivityWindow,
    pub verification: Verification,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// An activity joined with the display names listings show.
#[derive(Debug, Clone)]
pub struct ActivityListing {
    pub activity: ActivityRow,
    pub author_name: String,
    pub list_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub activity_id: Uuid,
    pub member_id: Uuid,
    pub list_id: Uuid,
    pub checked: bool,
    pub check_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct RosterRow {
    pub user_id: Uuid,
    pub username: String,
    pub check_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct StatRow {
    pub activity_id: Uuid,
    pub member_id: Uuid,
    pub username: String,
    pub period: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub check_count: i64,
    pub last_check_time: Option<NaiveDateTime>,
}
