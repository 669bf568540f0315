use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Shape of an activity's attendance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    OneOff,
    Recurring,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneOff => "one_off",
            Self::Recurring => "recurring",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_off" => Some(Self::OneOff),
            "recurring" => Some(Self::Recurring),
            _ => None,
        }
    }
}

/// How a participant proves presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    Password,
    QrToken,
    Geofence,
}

impl VerifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::QrToken => "qr_token",
            Self::Geofence => "geofence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "password" => Some(Self::Password),
            "qr_token" => Some(Self::QrToken),
            "geofence" => Some(Self::Geofence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Inactive,
    Active,
}

impl ActivityStatus {
    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 { Self::Inactive } else { Self::Active }
    }

    pub fn flag(&self) -> i64 {
        match self {
            Self::Inactive => 0,
            Self::Active => 1,
        }
    }
}

/// Granularity of a statistics aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Day,
    Week,
    Month,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// When an activity accepts check-ins.
///
/// One-off windows are the half-open range `[start_time, start_time + duration)`.
/// Recurring windows are open on every date in `[start_date, end_date]` while the
/// time of day is before `daily_cutoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityWindow {
    OneOff {
        start_time: NaiveDateTime,
        duration_minutes: u32,
    },
    Recurring {
        start_date: NaiveDate,
        end_date: NaiveDate,
        daily_cutoff: NaiveTime,
    },
}

impl ActivityWindow {
    pub fn kind(&self) -> ActivityKind {
        match self {
            Self::OneOff { .. } => ActivityKind::OneOff,
            Self::Recurring { .. } => ActivityKind::Recurring,
        }
    }

    pub fn contains(&self, now: NaiveDateTime) -> bool {
        match *self {
            Self::OneOff {
                start_time,
                duration_minutes,
            } => {
                let end = start_time + Duration::minutes(i64::from(duration_minutes));
                start_time <= now && now < end
            }
            Self::Recurring {
                start_date,
                end_date,
                daily_cutoff,
            } => {
                let date = now.date();
                start_date <= date && date <= end_date && now.time() < daily_cutoff
            }
        }
    }

    /// End of the window `now` currently sits in, or `None` if it is closed.
    pub fn closes_at(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if !self.contains(now) {
            return None;
        }
        match *self {
            Self::OneOff { .. } => Some(self.ends_at()),
            Self::Recurring { daily_cutoff, .. } => Some(now.date().and_time(daily_cutoff)),
        }
    }

    /// Last instant the activity can ever be open.
    pub fn ends_at(&self) -> NaiveDateTime {
        match *self {
            Self::OneOff {
                start_time,
                duration_minutes,
            } => start_time + Duration::minutes(i64::from(duration_minutes)),
            Self::Recurring {
                end_date,
                daily_cutoff,
                ..
            } => end_date.and_time(daily_cutoff),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::OneOff {
                duration_minutes, ..
            } => {
                if duration_minutes == 0 {
                    return Err("duration_minutes must be positive".into());
                }
            }
            Self::Recurring {
                start_date,
                end_date,
                daily_cutoff,
            } => {
                if end_date < start_date {
                    return Err("end_date is before start_date".into());
                }
                if daily_cutoff == NaiveTime::MIN {
                    return Err("daily_cutoff of 00:00 leaves no open time".into());
                }
            }
        }
        Ok(())
    }
}

/// Stored verification settings of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Verification {
    Password {
        password: String,
    },
    QrToken,
    Geofence {
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    },
}

impl Verification {
    pub fn mode(&self) -> VerifyMode {
        match self {
            Self::Password { .. } => VerifyMode::Password,
            Self::QrToken => VerifyMode::QrToken,
            Self::Geofence { .. } => VerifyMode::Geofence,
        }
    }
}

/// What a participant submits to check in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Proof {
    Password { password: String },
    QrToken { token: String },
    Geofence { latitude: f64, longitude: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn one_off_window_is_half_open() {
        let window = ActivityWindow::OneOff {
            start_time: at("2025-03-01 09:00:00"),
            duration_minutes: 30,
        };
        assert!(!window.contains(at("2025-03-01 08:59:59")));
        assert!(window.contains(at("2025-03-01 09:00:00")));
        assert!(window.contains(at("2025-03-01 09:29:59")));
        assert!(!window.contains(at("2025-03-01 09:30:00")));
        assert_eq!(window.ends_at(), at("2025-03-01 09:30:00"));
    }

    #[test]
    fn recurring_window_respects_dates_and_cutoff() {
        let window = ActivityWindow::Recurring {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            daily_cutoff: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        };
        assert!(window.contains(at("2025-03-01 00:00:00")));
        assert!(window.contains(at("2025-03-07 17:59:59")));
        assert!(!window.contains(at("2025-03-07 18:00:00")));
        assert!(!window.contains(at("2025-02-28 10:00:00")));
        assert!(!window.contains(at("2025-03-08 10:00:00")));
    }

    #[test]
    fn closes_at_tracks_the_current_day() {
        let window = ActivityWindow::Recurring {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            daily_cutoff: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        };
        assert_eq!(
            window.closes_at(at("2025-03-03 10:00:00")),
            Some(at("2025-03-03 18:00:00"))
        );
        assert_eq!(window.closes_at(at("2025-03-03 19:00:00")), None);
    }

    #[test]
    fn validate_rejects_degenerate_windows() {
        let empty = ActivityWindow::OneOff {
            start_time: at("2025-03-01 09:00:00"),
            duration_minutes: 0,
        };
        assert!(empty.validate().is_err());

        let backwards = ActivityWindow::Recurring {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            daily_cutoff: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        };
        assert!(backwards.validate().is_err());
    }

    #[test]
    fn proof_body_is_tagged_by_method() {
        let proof: Proof =
            serde_json::from_str(r#"{"method":"geofence","latitude":1.5,"longitude":2.5}"#)
                .unwrap();
        assert_eq!(
            proof,
            Proof::Geofence {
                latitude: 1.5,
                longitude: 2.5
            }
        );
    }
}
