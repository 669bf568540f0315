use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use rollcall_db::models::{ActivityListing, NewActivity, RosterRow};
use rollcall_db::{CheckinError, Database};
use rollcall_proof::qr;
use rollcall_types::api::{
    ActivityDetailResponse, ActivitySummary, Claims, CreateActivityRequest,
    CreateActivityResponse, HistoryEntry, PageQuery, QrCodeResponse, RosterEntry, RosterResponse,
    StatisticsEntry, StatisticsQuery,
};
use rollcall_types::models::Verification;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

const MAX_TITLE: usize = 128;

pub async fn create_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateActivityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() || title.len() > MAX_TITLE {
        return Err(ApiError::BadRequest(format!(
            "title must be 1 to {MAX_TITLE} characters"
        )));
    }

    // Unsupported kinds or modes and missing window fields are rejected
    // before any transaction opens.
    let window = req.window().map_err(CheckinError::Configuration)?;
    let verification = req.verification().map_err(CheckinError::Configuration)?;

    let new = NewActivity {
        author_id: claims.sub,
        list_id: req.list_id,
        title,
        content: req.content,
        window,
        verification,
    };

    let db = state.db.clone();
    let created = blocking(move || {
        let now = db.now()?;
        Ok::<_, ApiError>(db.create_activity(&new, now)?)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateActivityResponse {
            id: created.id,
            participants: created.participants,
            status: created.status,
        }),
    ))
}

pub async fn delete_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(activity_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    blocking(move || db.delete_activity(activity_id, claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Open activities the caller still has to check in to.
pub async fn open_activities(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let db = state.db.clone();
    let rows = blocking(move || db.open_activities_for(claims.sub, limit, offset)).await?;
    Ok(Json(rows.into_iter().map(summary).collect::<Vec<_>>()))
}

pub async fn created_activities(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let db = state.db.clone();
    let rows = blocking(move || db.activities_by_author(claims.sub, limit, offset)).await?;
    Ok(Json(rows.into_iter().map(summary).collect::<Vec<_>>()))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let db = state.db.clone();
    let rows = blocking(move || db.history_for(claims.sub, limit, offset)).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(listing, check_time)| HistoryEntry {
                summary: summary(listing),
                check_time,
            })
            .collect::<Vec<_>>(),
    ))
}

/// One activity as seen by a participant (or its author).
pub async fn get_activity(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(activity_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let (listing, ledger) = blocking(move || {
        let listing = db
            .get_activity_listing(activity_id)?
            .ok_or(CheckinError::ActivityNotFound)?;
        let ledger = db.ledger_row(activity_id, claims.sub)?;
        if ledger.is_none() && listing.activity.author_id != claims.sub {
            return Err(ApiError::from(CheckinError::ActivityNotFound));
        }
        Ok::<_, ApiError>((listing, ledger))
    })
    .await?;

    let window = listing.activity.window;
    Ok(Json(ActivityDetailResponse {
        summary: summary(listing),
        window,
        checked: ledger.as_ref().is_some_and(|row| row.checked),
        check_time: ledger.and_then(|row| row.check_time),
    }))
}

/// Author view: who has and has not checked in.
pub async fn roster(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(activity_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let db = state.db.clone();
    let response = blocking(move || {
        authored(&db, activity_id, claims.sub)?;
        let (checked_count, unchecked_count) = db.roster_counts(activity_id)?;
        let checked = db.roster(activity_id, true, limit, offset)?;
        let unchecked = db.roster(activity_id, false, limit, offset)?;
        Ok::<_, ApiError>(RosterResponse {
            checked_count,
            unchecked_count,
            checked: checked.into_iter().map(roster_entry).collect(),
            unchecked: unchecked.into_iter().map(roster_entry).collect(),
        })
    })
    .await?;

    Ok(Json(response))
}

/// Author view: a token and QR code that stay valid until the current
/// window closes. The encoded URL names the participate endpoint and carries
/// the token as a query value for the scanning client to POST.
pub async fn qrcode(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(activity_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let (listing, now) = blocking(move || {
        let listing = authored(&db, activity_id, claims.sub)?;
        let now = db.now()?;
        Ok::<_, ApiError>((listing, now))
    })
    .await?;

    if listing.activity.verification != Verification::QrToken {
        return Err(CheckinError::Configuration(
            "activity does not use qr_token verification".into(),
        )
        .into());
    }

    let closes_at = listing
        .activity
        .window
        .closes_at(now)
        .ok_or(CheckinError::ActivityNotActive)?;

    let (token, _) = state
        .verifier
        .tokens()
        .issue(activity_id, closes_at - now)
        .map_err(CheckinError::from)?;

    let url = format!(
        "{}/checkins/{}/participate?token={}",
        state.public_url.trim_end_matches('/'),
        activity_id,
        token
    );
    let svg = qr::render_svg(&url)?;

    info!(%activity_id, expires_at = %closes_at, "Issued check-in QR token");

    Ok(Json(QrCodeResponse {
        token,
        url,
        expires_at: closes_at,
        svg,
    }))
}

/// Author view: rolled-up attendance for one period type.
pub async fn statistics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(activity_id): Path<Uuid>,
    Query(query): Query<StatisticsQuery>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let db = state.db.clone();
    let rows = blocking(move || {
        authored(&db, activity_id, claims.sub)?;
        Ok::<_, ApiError>(db.statistics(activity_id, query.period, limit, offset)?)
    })
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|row| StatisticsEntry {
                user_id: row.member_id,
                username: row.username,
                period: row.period,
                period_start: row.period_start,
                period_end: row.period_end,
                check_count: row.check_count,
                last_check_time: row.last_check_time,
            })
            .collect::<Vec<_>>(),
    ))
}

/// Author-only views treat other callers as if the activity did not exist.
fn authored(db: &Arc<Database>, activity_id: Uuid, caller: Uuid) -> Result<ActivityListing, ApiError> {
    match db.get_activity_listing(activity_id)? {
        Some(listing) if listing.activity.author_id == caller => Ok(listing),
        _ => Err(CheckinError::ActivityNotFound.into()),
    }
}

fn summary(listing: ActivityListing) -> ActivitySummary {
    let a = listing.activity;
    ActivitySummary {
        id: a.id,
        author_id: a.author_id,
        author_name: listing.author_name,
        list_id: a.list_id,
        list_name: listing.list_name,
        title: a.title,
        content: a.content,
        kind: a.window.kind(),
        verification: a.verification.mode(),
        status: a.status,
        created_at: a.created_at,
        updated_at: a.updated_at,
    }
}

fn roster_entry(row: RosterRow) -> RosterEntry {
    RosterEntry {
        user_id: row.user_id,
        username: row.username,
        check_time: row.check_time,
    }
}
