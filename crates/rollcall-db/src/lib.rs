pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod time;

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{error, info, warn};

pub use error::CheckinError;

/// How long a statement waits on a locked database before failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A holder that panicked has already had its transaction rolled back.
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("DB lock poisoned, recovering connection");
            poisoned.into_inner()
        })
    }

    /// Run a read or single-statement write against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`. An error rolls it back;
    /// so does a panic, which is caught here and reported as
    /// [`CheckinError::TransactionAborted`] so no caller ever unwinds through the
    /// connection lock.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, CheckinError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, CheckinError>,
    {
        let mut conn = self.lock();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<T, CheckinError> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        }));

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Transaction panicked and was rolled back");
                Err(CheckinError::TransactionAborted(message))
            }
        }
    }

    /// The store's current local time, truncated to whole seconds.
    pub fn now(&self) -> Result<NaiveDateTime> {
        self.with_conn(|conn| {
            let raw: String = conn.query_row(
                "SELECT strftime('%Y-%m-%d %H:%M:%S', 'now', 'localtime')",
                [],
                |row| row.get(0),
            )?;
            Ok(time::parse_ts(&raw)?)
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in transaction".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_users(db: &Database) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn error_rolls_back_transaction() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), CheckinError> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (id, username, password) VALUES ('u1', 'ann', 'x')",
                [],
            )?;
            Err(CheckinError::ListNotFound)
        });
        assert!(matches!(result, Err(CheckinError::ListNotFound)));
        assert_eq!(count_users(&db), 0);
    }

    #[test]
    fn panic_rolls_back_and_surfaces_as_aborted() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), CheckinError> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (id, username, password) VALUES ('u1', 'ann', 'x')",
                [],
            )?;
            panic!("boom");
        });
        match result {
            Err(CheckinError::TransactionAborted(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(count_users(&db), 0);

        // The connection stays usable afterwards.
        db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (id, username, password) VALUES ('u2', 'bob', 'x')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count_users(&db), 1);
    }

    #[test]
    fn opens_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.db");
        {
            let db = Database::open(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO users (id, username, password) VALUES ('u1', 'ann', 'x')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }
        // Reopening re-runs migrations without touching existing rows.
        let db = Database::open(&path).unwrap();
        assert_eq!(count_users(&db), 1);
    }

    #[test]
    fn now_comes_from_the_store() {
        let db = Database::open_in_memory().unwrap();
        let now = db.now().unwrap();
        assert!(now.and_utc().timestamp() > 1_600_000_000);
    }
}
