use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use rollcall_db::queries::{ReconcileReport, RollupReport};
use rollcall_db::{CheckinError, Database};

/// Background task that keeps activity statuses current.
///
/// The first tick fires immediately, so statuses are corrected at startup.
/// Each tick runs on the blocking pool; a failed or panicked tick is logged and
/// the next one retries.
pub async fn run_status_loop(db: Arc<Database>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let db = db.clone();
        match tokio::task::spawn_blocking(move || status_tick(&db)).await {
            Ok(Ok(affected)) => debug!(affected, "Status tick complete"),
            Ok(Err(e)) => warn!("Status tick failed: {}", e),
            Err(e) => error!("Status tick aborted: {}", e),
        }
    }
}

fn status_tick(db: &Database) -> Result<usize, CheckinError> {
    let now = db.now()?;
    db.recompute_active_statuses(now)
}

/// Background task that runs [`run_daily`] once a day at `at` local time.
pub async fn run_daily_loop(db: Arc<Database>, at: NaiveTime, retention_days: u32) {
    loop {
        let wait = until_next(Local::now().naive_local(), at);
        info!("Next daily run in {}s", wait.as_secs());
        tokio::time::sleep(wait).await;

        let db = db.clone();
        match tokio::task::spawn_blocking(move || run_daily(&db, retention_days)).await {
            Ok(Ok(outcome)) => info!(
                rolled_up = outcome.rollup.is_some(),
                ledger_reset = outcome.reconcile.ledger_reset,
                purged = outcome.reconcile.purged,
                "Daily run complete"
            ),
            Ok(Err(e)) => warn!("Daily run failed: {}", e),
            Err(e) => error!("Daily run aborted: {}", e),
        }
    }
}

#[derive(Debug)]
pub struct DailyOutcome {
    /// `None` when the roll-up failed. The reconcile then leaves uncounted
    /// days checked and the next run's roll-up catches them up.
    pub rollup: Option<RollupReport>,
    pub reconcile: ReconcileReport,
}

/// Roll up every day not yet counted, then reconcile. The reset inside the
/// reconcile only reopens days the roll-up has counted.
pub fn run_daily(db: &Database, retention_days: u32) -> Result<DailyOutcome, CheckinError> {
    let now = db.now()?;

    let rollup = match db.rollup(now.date()) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = %e, "Roll-up failed, uncounted days stay checked");
            None
        }
    };

    let reconcile = db.daily_reconcile(now, retention_days)?;
    Ok(DailyOutcome { rollup, reconcile })
}

/// Time from `now` until the next occurrence of `at`, never zero.
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today = now.date().and_time(at);
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}
