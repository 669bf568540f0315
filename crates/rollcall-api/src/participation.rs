use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use rollcall_types::api::{Claims, ParticipateResponse};
use rollcall_types::models::Proof;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// Check the caller in to an activity with the proof its verification mode asks for.
pub async fn participate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(activity_id): Path<Uuid>,
    Json(proof): Json<Proof>,
) -> Result<impl IntoResponse, ApiError> {
    let check_time = blocking(move || {
        let now = state.db.now()?;
        Ok::<_, ApiError>(state.db.participate(
            activity_id,
            claims.sub,
            &proof,
            &state.verifier,
            now,
        )?)
    })
    .await?;

    Ok(Json(ParticipateResponse {
        activity_id,
        check_time,
    }))
}
