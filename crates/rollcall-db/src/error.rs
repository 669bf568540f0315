use rusqlite::ErrorCode;
use thiserror::Error;

use rollcall_proof::ProofError;

/// Failures of the attendance operations. Everything except `Storage`,
/// `TransactionAborted` and `Configuration` is an expected business outcome.
#[derive(Debug, Error)]
pub enum CheckinError {
    #[error("activity not found")]
    ActivityNotFound,

    #[error("activity is not open for check-in")]
    ActivityNotActive,

    #[error("already checked in")]
    AlreadyChecked,

    #[error("proof rejected: {0}")]
    ProofInvalid(#[from] ProofError),

    #[error("member list not found")]
    ListNotFound,

    #[error("member list has no members")]
    ListEmpty,

    #[error("already a member of this list")]
    DuplicateMembership,

    #[error("not a member of this list")]
    MembershipNotFound,

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Storage(anyhow::Error),
}

impl CheckinError {
    /// True for outcomes a client caused and can act on.
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            Self::Storage(_) | Self::TransactionAborted(_) | Self::Configuration(_)
        )
    }
}

impl From<rusqlite::Error> for CheckinError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::TransactionAborted(err.to_string())
            }
            _ => Self::Storage(err.into()),
        }
    }
}

impl From<anyhow::Error> for CheckinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}

/// True when `err` is a UNIQUE or PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_aborted() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(
            CheckinError::from(err),
            CheckinError::TransactionAborted(_)
        ));
    }

    #[test]
    fn other_sqlite_errors_are_storage() {
        let err = CheckinError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, CheckinError::Storage(_)));
        assert!(!err.is_business());
        assert!(CheckinError::AlreadyChecked.is_business());
    }
}
