use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::{ListRow, MemberRow};
use crate::time::{ts_at, uuid_at};
use crate::{CheckinError, Database};

// Seeds the joining member into every activity bound to the list. A row left
// from an earlier membership comes back as a fresh unchecked row.
const FAN_OUT_JOIN: &str = "
    INSERT INTO ledger (activity_id, member_id, list_id, checked, check_time)
    SELECT id, ?2, list_id, 0, NULL FROM activities WHERE list_id = ?1
    ON CONFLICT(activity_id, member_id)
    DO UPDATE SET checked = 0, check_time = NULL, list_id = excluded.list_id";

impl Database {
    /// Create a list. Returns `None` if the author already has a list with this name.
    pub fn create_list(&self, id: Uuid, author_id: Uuid, name: &str) -> Result<Option<ListRow>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO member_lists (id, author_id, name) VALUES (?1, ?2, ?3)",
                (id.to_string(), author_id.to_string(), name),
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_list(conn, id)
        })
    }

    pub fn get_list(&self, id: Uuid) -> Result<Option<ListRow>> {
        self.with_conn(|conn| query_list(conn, id))
    }

    pub fn lists_by_author(&self, author_id: Uuid, limit: u32, offset: u32) -> Result<Vec<ListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, name, member_count, created_at
                 FROM member_lists
                 WHERE author_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map((author_id.to_string(), limit, offset), list_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_members(&self, list_id: Uuid, limit: u32, offset: u32) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username
                 FROM memberships m
                 JOIN users u ON u.id = m.member_id
                 WHERE m.list_id = ?1
                 ORDER BY m.joined_at, u.username
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map((list_id.to_string(), limit, offset), |row| {
                    Ok(MemberRow {
                        user_id: uuid_at(row, 0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_member(&self, list_id: Uuid, member_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM memberships WHERE list_id = ?1 AND member_id = ?2)",
                (list_id.to_string(), member_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Add a member and seed their ledger rows. Returns how many rows were seeded.
    pub fn add_member(&self, list_id: Uuid, member_id: Uuid) -> Result<usize, CheckinError> {
        let list_key = list_id.to_string();
        let member_key = member_id.to_string();

        let seeded = self.with_tx(|tx| {
            let bumped = tx.execute(
                "UPDATE member_lists SET member_count = member_count + 1 WHERE id = ?1",
                [&list_key],
            )?;
            if bumped == 0 {
                return Err(CheckinError::ListNotFound);
            }

            match tx.execute(
                "INSERT INTO memberships (list_id, member_id) VALUES (?1, ?2)",
                (&list_key, &member_key),
            ) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Err(CheckinError::DuplicateMembership),
                Err(e) => return Err(e.into()),
            }

            Ok(tx.execute(FAN_OUT_JOIN, (&list_key, &member_key))?)
        })?;

        info!(%list_id, %member_id, affected = seeded, "Member joined list");
        Ok(seeded)
    }

    /// Remove a member. Their ledger rows are kept as history.
    pub fn remove_member(&self, list_id: Uuid, member_id: Uuid) -> Result<(), CheckinError> {
        let list_key = list_id.to_string();
        let member_key = member_id.to_string();

        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM memberships WHERE list_id = ?1 AND member_id = ?2",
                (&list_key, &member_key),
            )?;
            if removed == 0 {
                return Err(CheckinError::MembershipNotFound);
            }

            let dropped = tx.execute(
                "UPDATE member_lists SET member_count = member_count - 1 WHERE id = ?1",
                [&list_key],
            )?;
            if dropped == 0 {
                return Err(CheckinError::ListNotFound);
            }
            Ok(())
        })?;

        info!(%list_id, %member_id, "Member left list");
        Ok(())
    }
}

fn query_list(conn: &Connection, id: Uuid) -> Result<Option<ListRow>> {
    let row = conn
        .query_row(
            "SELECT id, author_id, name, member_count, created_at FROM member_lists WHERE id = ?1",
            [id.to_string()],
            list_from_row,
        )
        .optional()?;
    Ok(row)
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<ListRow> {
    Ok(ListRow {
        id: uuid_at(row, 0)?,
        author_id: uuid_at(row, 1)?,
        name: row.get(2)?,
        member_count: row.get(3)?,
        created_at: ts_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::*;
    use rollcall_types::models::Verification;

    fn count_members(db: &Database, list: Uuid) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM memberships WHERE list_id = ?1",
                [list.to_string()],
                |r| r.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn list_names_are_unique_per_author() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");

        assert!(db.create_list(Uuid::now_v7(), ann, "team").unwrap().is_some());
        assert!(db.create_list(Uuid::now_v7(), ann, "team").unwrap().is_none());
        assert!(db.create_list(Uuid::now_v7(), bob, "team").unwrap().is_some());
    }

    #[test]
    fn member_count_tracks_memberships() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let members: Vec<Uuid> = ["a", "b", "c"].iter().map(|n| user(&db, n)).collect();
        let list = list_with(&db, ann, &members);

        assert_eq!(db.get_list(list).unwrap().unwrap().member_count, 3);
        assert_eq!(count_members(&db, list), 3);

        db.remove_member(list, members[1]).unwrap();
        assert_eq!(db.get_list(list).unwrap().unwrap().member_count, 2);
        assert_eq!(count_members(&db, list), 2);
        assert!(!db.is_member(list, members[1]).unwrap());
        assert!(db.is_member(list, members[0]).unwrap());
    }

    #[test]
    fn duplicate_and_missing_memberships_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);

        assert!(matches!(
            db.add_member(list, bob),
            Err(CheckinError::DuplicateMembership)
        ));
        // The failed add must not have bumped the count.
        assert_eq!(db.get_list(list).unwrap().unwrap().member_count, 1);

        assert!(matches!(
            db.add_member(Uuid::now_v7(), bob),
            Err(CheckinError::ListNotFound)
        ));
        assert!(matches!(
            db.remove_member(list, ann),
            Err(CheckinError::MembershipNotFound)
        ));
    }

    #[test]
    fn joining_seeds_rows_for_every_bound_activity() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let cat = user(&db, "cat");
        let list = list_with(&db, ann, &[bob]);
        let now = at("2025-03-01 08:00:00");

        // One open, one long finished: both get a row for the newcomer.
        let open = activity(&db, ann, list, one_off("2025-03-01 07:30:00", 60), pin("1"), now);
        let past = activity(&db, ann, list, one_off("2025-01-01 07:30:00", 60), Verification::QrToken, now);

        assert_eq!(db.add_member(list, cat).unwrap(), 2);
        for id in [open, past] {
            let row = db.ledger_row(id, cat).unwrap().unwrap();
            assert!(!row.checked);
            assert_eq!(row.list_id, list);
        }
    }

    #[test]
    fn leaving_keeps_history_and_rejoining_starts_fresh() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let bob = user(&db, "bob");
        let list = list_with(&db, ann, &[bob]);
        let now = at("2025-03-01 08:00:00");
        let id = activity(&db, ann, list, one_off("2025-03-01 07:30:00", 60), pin("1"), now);

        db.participate(id, bob, &password("1"), &verifier(), now).unwrap();
        db.remove_member(list, bob).unwrap();
        assert!(db.ledger_row(id, bob).unwrap().unwrap().checked);

        db.add_member(list, bob).unwrap();
        let row = db.ledger_row(id, bob).unwrap().unwrap();
        assert!(!row.checked);
        assert_eq!(row.check_time, None);
    }

    #[test]
    fn members_page_in_join_order() {
        let db = Database::open_in_memory().unwrap();
        let ann = user(&db, "ann");
        let members: Vec<Uuid> = ["m1", "m2", "m3"].iter().map(|n| user(&db, n)).collect();
        let list = list_with(&db, ann, &members);

        let page = db.list_members(list, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        let rest = db.list_members(list, 2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(db.lists_by_author(ann, 10, 0).unwrap().len(), 1);
    }
}
