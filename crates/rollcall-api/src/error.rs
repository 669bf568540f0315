use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use rollcall_db::CheckinError;
use rollcall_types::api::ErrorBody;

/// Everything a handler can fail with. Rendered as a status code plus a
/// JSON body whose `code` is stable for clients to match on.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Checkin(#[from] CheckinError),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("a list with this name already exists")]
    ListNameTaken,

    #[error("user not found")]
    UserNotFound,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Checkin(e) => match e {
                CheckinError::ActivityNotFound => (StatusCode::NOT_FOUND, "activity_not_found"),
                CheckinError::ActivityNotActive => (StatusCode::CONFLICT, "activity_not_active"),
                CheckinError::AlreadyChecked => (StatusCode::CONFLICT, "already_checked"),
                CheckinError::ProofInvalid(_) => (StatusCode::FORBIDDEN, "proof_invalid"),
                CheckinError::ListNotFound => (StatusCode::NOT_FOUND, "list_not_found"),
                CheckinError::ListEmpty => (StatusCode::UNPROCESSABLE_ENTITY, "list_empty"),
                CheckinError::DuplicateMembership => {
                    (StatusCode::CONFLICT, "duplicate_membership")
                }
                CheckinError::MembershipNotFound => {
                    (StatusCode::NOT_FOUND, "membership_not_found")
                }
                CheckinError::TransactionAborted(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "busy_retry")
                }
                CheckinError::Configuration(_) => (StatusCode::BAD_REQUEST, "invalid_configuration"),
                CheckinError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            },
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::UsernameTaken => (StatusCode::CONFLICT, "username_taken"),
            Self::ListNameTaken => (StatusCode::CONFLICT, "list_name_taken"),
            Self::UserNotFound => (StatusCode::NOT_FOUND, "user_not_found"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Server-side faults are logged with their cause and reported generically.
        let message = if status.is_server_error() {
            error!(code, error = ?self, "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "busy, retry".to_string(),
                _ => "internal error".to_string(),
            }
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorBody {
                code: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<F, T, E>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Checkin(CheckinError::TransactionAborted(e.to_string()))
        })?
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_proof::ProofError;

    #[test]
    fn business_errors_get_distinct_statuses() {
        let cases = [
            (CheckinError::ActivityNotFound, StatusCode::NOT_FOUND),
            (CheckinError::ActivityNotActive, StatusCode::CONFLICT),
            (CheckinError::AlreadyChecked, StatusCode::CONFLICT),
            (
                CheckinError::ProofInvalid(ProofError::WrongPassword),
                StatusCode::FORBIDDEN,
            ),
            (CheckinError::ListEmpty, StatusCode::UNPROCESSABLE_ENTITY),
            (
                CheckinError::TransactionAborted("busy".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn panicking_work_becomes_retryable() {
        let result: Result<(), ApiError> =
            blocking(|| -> Result<(), CheckinError> { panic!("worker died") }).await;
        assert!(matches!(
            result,
            Err(ApiError::Checkin(CheckinError::TransactionAborted(_)))
        ));
    }
}
