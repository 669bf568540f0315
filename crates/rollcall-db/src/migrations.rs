use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
            );

            CREATE TABLE member_lists (
                id            TEXT PRIMARY KEY,
                author_id     TEXT NOT NULL REFERENCES users(id),
                name          TEXT NOT NULL,
                member_count  INTEGER NOT NULL DEFAULT 0 CHECK (member_count >= 0),
                created_at    TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
                UNIQUE(author_id, name)
            );

            CREATE TABLE memberships (
                list_id     TEXT NOT NULL REFERENCES member_lists(id) ON DELETE CASCADE,
                member_id   TEXT NOT NULL REFERENCES users(id),
                joined_at   TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
                PRIMARY KEY (list_id, member_id)
            );

            CREATE INDEX idx_memberships_member ON memberships(member_id);

            -- Exactly one window shape is populated, matching `kind`.
            CREATE TABLE activities (
                id                TEXT PRIMARY KEY,
                author_id         TEXT NOT NULL REFERENCES users(id),
                list_id           TEXT NOT NULL REFERENCES member_lists(id),
                title             TEXT NOT NULL,
                content           TEXT NOT NULL DEFAULT '',
                kind              TEXT NOT NULL CHECK (kind IN ('one_off', 'recurring')),
                verification      TEXT NOT NULL
                                  CHECK (verification IN ('password', 'qr_token', 'geofence')),
                status            INTEGER NOT NULL DEFAULT 0 CHECK (status IN (0, 1)),
                password          TEXT,
                start_time        TEXT,
                duration_minutes  INTEGER CHECK (duration_minutes > 0),
                start_date        TEXT,
                end_date          TEXT,
                daily_cutoff      TEXT,
                latitude          REAL,
                longitude         REAL,
                radius_m          REAL,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL,
                CHECK (
                    (kind = 'one_off'
                        AND start_time IS NOT NULL AND duration_minutes IS NOT NULL
                        AND start_date IS NULL AND end_date IS NULL AND daily_cutoff IS NULL)
                    OR
                    (kind = 'recurring'
                        AND start_time IS NULL AND duration_minutes IS NULL
                        AND start_date IS NOT NULL AND end_date IS NOT NULL
                        AND daily_cutoff IS NOT NULL AND start_date <= end_date)
                )
            );

            CREATE INDEX idx_activities_author ON activities(author_id, created_at);
            CREATE INDEX idx_activities_list ON activities(list_id);

            CREATE TABLE ledger (
                activity_id  TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                member_id    TEXT NOT NULL REFERENCES users(id),
                list_id      TEXT NOT NULL,
                checked      INTEGER NOT NULL DEFAULT 0 CHECK (checked IN (0, 1)),
                check_time   TEXT,
                PRIMARY KEY (activity_id, member_id),
                CHECK ((checked = 1) = (check_time IS NOT NULL))
            );

            CREATE INDEX idx_ledger_member ON ledger(member_id, checked);

            CREATE TABLE stats (
                activity_id      TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                member_id        TEXT NOT NULL REFERENCES users(id),
                period_type      TEXT NOT NULL CHECK (period_type IN ('day', 'week', 'month')),
                period_start     TEXT NOT NULL,
                period_end       TEXT NOT NULL,
                check_count      INTEGER NOT NULL DEFAULT 0,
                last_check_time  TEXT,
                PRIMARY KEY (activity_id, member_id, period_type, period_start)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (rollup watermark)");
        conn.execute_batch(
            "
            -- Last calendar day whose check-ins are aggregated into stats.
            CREATE TABLE rollup_state (
                id        INTEGER PRIMARY KEY CHECK (id = 1),
                last_day  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
