use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ActivityKind, ActivityStatus, ActivityWindow, PeriodType, Verification, VerifyMode,
};

// -- JWT Claims --

/// Session token claims. `sub` is the member id every protected handler acts as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Paging --

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageQuery {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;

    /// Returns `(limit, offset)` with page clamped to >= 1 and size to 1..=100.
    pub fn limit_offset(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let size = self
            .size
            .unwrap_or(Self::DEFAULT_SIZE)
            .clamp(1, Self::MAX_SIZE);
        (size, (page - 1).saturating_mul(size))
    }
}

// -- Member lists --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub id: Uuid,
    pub name: String,
    pub member_count: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListDetailResponse {
    pub list: ListResponse,
    pub members: Vec<MemberResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub member_id: Uuid,
}

// -- Activities --

/// Flat creation payload. Kind and verification mode arrive as strings so an
/// unsupported value is reported as a configuration error rather than a parse
/// failure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateActivityRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub list_id: Uuid,
    pub kind: String,
    pub verification: String,
    pub password: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub duration_minutes: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub daily_cutoff: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_m: Option<f64>,
}

impl CreateActivityRequest {
    pub fn window(&self) -> Result<ActivityWindow, String> {
        let kind = ActivityKind::parse(&self.kind)
            .ok_or_else(|| format!("unsupported activity kind '{}'", self.kind))?;
        let window = match kind {
            ActivityKind::OneOff => ActivityWindow::OneOff {
                start_time: self.start_time.ok_or("one_off requires start_time")?,
                duration_minutes: self
                    .duration_minutes
                    .ok_or("one_off requires duration_minutes")?,
            },
            ActivityKind::Recurring => ActivityWindow::Recurring {
                start_date: self.start_date.ok_or("recurring requires start_date")?,
                end_date: self.end_date.ok_or("recurring requires end_date")?,
                daily_cutoff: self.daily_cutoff.ok_or("recurring requires daily_cutoff")?,
            },
        };
        window.validate()?;
        Ok(window)
    }

    pub fn verification(&self) -> Result<Verification, String> {
        let mode = VerifyMode::parse(&self.verification)
            .ok_or_else(|| format!("unsupported verification mode '{}'", self.verification))?;
        match mode {
            VerifyMode::Password => {
                let password = self
                    .password
                    .clone()
                    .filter(|p| !p.is_empty())
                    .ok_or("password mode requires a non-empty password")?;
                Ok(Verification::Password { password })
            }
            VerifyMode::QrToken => Ok(Verification::QrToken),
            VerifyMode::Geofence => {
                let (Some(latitude), Some(longitude), Some(radius_m)) =
                    (self.latitude, self.longitude, self.radius_m)
                else {
                    return Err("geofence mode requires latitude, longitude and radius_m".into());
                };
                if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                    return Err("geofence center is out of range".into());
                }
                if !(radius_m > 0.0) {
                    return Err("radius_m must be positive".into());
                }
                Ok(Verification::Geofence {
                    latitude,
                    longitude,
                    radius_m,
                })
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateActivityResponse {
    pub id: Uuid,
    pub participants: usize,
    pub status: ActivityStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub list_id: Uuid,
    pub list_name: String,
    pub title: String,
    pub content: String,
    pub kind: ActivityKind,
    pub verification: VerifyMode,
    pub status: ActivityStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Participant view of one activity.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityDetailResponse {
    #[serde(flatten)]
    pub summary: ActivitySummary,
    pub window: ActivityWindow,
    pub checked: bool,
    pub check_time: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub summary: ActivitySummary,
    pub check_time: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: Uuid,
    pub username: String,
    pub check_time: Option<NaiveDateTime>,
}

/// Author view of who has and has not checked in.
#[derive(Debug, Serialize, Deserialize)]
pub struct RosterResponse {
    pub checked_count: i64,
    pub unchecked_count: i64,
    pub checked: Vec<RosterEntry>,
    pub unchecked: Vec<RosterEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipateResponse {
    pub activity_id: Uuid,
    pub check_time: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QrCodeResponse {
    pub token: String,
    /// What the QR code encodes. Only a carrier for `token`: the participate
    /// endpoint is POST-only, so a scanning client reads the `token` query
    /// value and submits it as a `qr_token` proof body.
    pub url: String,
    pub expires_at: NaiveDateTime,
    pub svg: String,
}

// -- Statistics --

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub period: PeriodType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsEntry {
    pub user_id: Uuid,
    pub username: String,
    pub period: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub check_count: i64,
    pub last_check_time: Option<NaiveDateTime>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> CreateActivityRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn page_query_clamps() {
        let q = PageQuery {
            page: Some(0),
            size: Some(1000),
        };
        assert_eq!(q.limit_offset(), (100, 0));

        let q = PageQuery {
            page: Some(3),
            size: None,
        };
        assert_eq!(q.limit_offset(), (10, 20));
    }

    #[test]
    fn unsupported_kind_is_a_configuration_problem() {
        let req = request(
            r#"{"title":"t","list_id":"00000000-0000-0000-0000-000000000001",
                "kind":"weekly","verification":"qr_token"}"#,
        );
        assert!(req.window().unwrap_err().contains("weekly"));
        assert_eq!(req.verification().unwrap(), Verification::QrToken);
    }

    #[test]
    fn one_off_requires_its_fields() {
        let req = request(
            r#"{"title":"t","list_id":"00000000-0000-0000-0000-000000000001",
                "kind":"one_off","verification":"password","password":"1234",
                "start_time":"2025-03-01T09:00:00"}"#,
        );
        assert!(req.window().unwrap_err().contains("duration_minutes"));
    }

    #[test]
    fn geofence_requires_center_and_radius() {
        let req = request(
            r#"{"title":"t","list_id":"00000000-0000-0000-0000-000000000001",
                "kind":"recurring","verification":"geofence",
                "start_date":"2025-03-01","end_date":"2025-03-31","daily_cutoff":"18:00:00",
                "latitude":31.2,"longitude":121.5}"#,
        );
        assert!(req.window().is_ok());
        assert!(req.verification().is_err());
    }
}
