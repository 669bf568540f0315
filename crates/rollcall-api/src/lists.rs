use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use rollcall_db::models::{ListRow, MemberRow};
use rollcall_db::{CheckinError, Database};
use rollcall_types::api::{
    AddMemberRequest, Claims, CreateListRequest, ListDetailResponse, ListResponse, MemberResponse,
    PageQuery,
};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

const MAX_LIST_NAME: usize = 64;

pub async fn create_list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.len() > MAX_LIST_NAME {
        return Err(ApiError::BadRequest(format!(
            "list name must be 1 to {MAX_LIST_NAME} characters"
        )));
    }

    let db = state.db.clone();
    let row = blocking(move || db.create_list(Uuid::now_v7(), claims.sub, &name))
        .await?
        .ok_or(ApiError::ListNameTaken)?;

    Ok((StatusCode::CREATED, Json(list_response(row))))
}

pub async fn get_lists(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let db = state.db.clone();
    let rows = blocking(move || db.lists_by_author(claims.sub, limit, offset)).await?;

    Ok(Json(rows.into_iter().map(list_response).collect::<Vec<_>>()))
}

pub async fn get_list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(list_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page.limit_offset();
    let db = state.db.clone();
    let (list, members) = blocking(move || {
        let list = owned_list(&db, list_id, claims.sub)?;
        let members = db.list_members(list_id, limit, offset)?;
        Ok::<_, ApiError>((list, members))
    })
    .await?;

    Ok(Json(ListDetailResponse {
        list: list_response(list),
        members: members.into_iter().map(member_response).collect(),
    }))
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(list_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let member = blocking(move || {
        owned_list(&db, list_id, claims.sub)?;
        let user = db
            .get_user_by_id(req.member_id)?
            .ok_or(ApiError::UserNotFound)?;
        if db.is_member(list_id, user.id)? {
            return Err(CheckinError::DuplicateMembership.into());
        }
        // The insert still reports a duplicate that races past the check.
        db.add_member(list_id, user.id)?;
        Ok::<_, ApiError>(MemberRow {
            user_id: user.id,
            username: user.username,
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(member_response(member))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((list_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    blocking(move || {
        owned_list(&db, list_id, claims.sub)?;
        db.remove_member(list_id, member_id)?;
        Ok::<_, ApiError>(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Lists are private to their author; anyone else sees them as missing.
fn owned_list(db: &Arc<Database>, list_id: Uuid, caller: Uuid) -> Result<ListRow, ApiError> {
    match db.get_list(list_id)? {
        Some(list) if list.author_id == caller => Ok(list),
        _ => Err(CheckinError::ListNotFound.into()),
    }
}

fn list_response(row: ListRow) -> ListResponse {
    ListResponse {
        id: row.id,
        name: row.name,
        member_count: row.member_count,
        created_at: row.created_at,
    }
}

fn member_response(row: MemberRow) -> MemberResponse {
    MemberResponse {
        user_id: row.user_id,
        username: row.username,
    }
}
