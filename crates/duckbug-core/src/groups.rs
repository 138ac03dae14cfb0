//! Group listing and lookup.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use tracing::{debug, info};

use crate::db::filter::{Page, Predicate, SortDirection, WhereClause};
use crate::error::{Error, Record, Result, storage};
use crate::model::{EventKind, Group, GroupOrigin, GroupStatus};

/// Filters for group listings. Every set field must match (AND); blank
/// strings count as unset. Results sort by `last_seen_at` only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupQuery {
    pub project_id: Option<String>,
    /// Inclusive lower bound on `last_seen_at` (unix seconds).
    pub seen_from: Option<i64>,
    /// Inclusive upper bound on `last_seen_at` (unix seconds).
    pub seen_to: Option<i64>,
    /// Case-insensitive substring of `message`.
    pub search: Option<String>,
    pub status: Option<GroupStatus>,
    pub sort: SortDirection,
    pub page: Page,
}

impl GroupQuery {
    pub(crate) fn where_clause(&self) -> Result<WhereClause> {
        if let (Some(from), Some(to)) = (self.seen_from, self.seen_to)
            && from > to
        {
            return Err(Error::invalid_filter(format!(
                "last-seen range is empty: from {from} is after to {to}"
            )));
        }

        Ok(WhereClause::new()
            .and_opt(Predicate::text_eq("project_id", self.project_id.as_deref()))
            .and_opt(
                self.seen_from
                    .map(|t| Predicate::Gte("last_seen_at", Value::Integer(t))),
            )
            .and_opt(
                self.seen_to
                    .map(|t| Predicate::Lte("last_seen_at", Value::Integer(t))),
            )
            .and_opt(Predicate::search("message", self.search.as_deref()))
            .and_opt(
                self.status
                    .map(|s| Predicate::Eq("status", Value::Text(s.as_str().into()))),
            ))
    }
}

const fn columns(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Error => {
            "id, project_id, message, first_seen_at, last_seen_at, counter, status, file, line"
        }
        EventKind::Log => {
            "id, project_id, message, first_seen_at, last_seen_at, counter, status, level"
        }
    }
}

/// Read access to group rows, plus explicit removal.
#[derive(Debug, Clone, Copy)]
pub struct GroupStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> GroupStore<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Fetch one group by fingerprint.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no group has `id`; [`Error::Storage`] on
    /// query failure.
    pub fn get(&self, kind: EventKind, id: &str) -> Result<Group> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            columns(kind),
            kind.group_table()
        );
        self.conn
            .query_row(&sql, [id], |row| row_to_group(kind, row))
            .optional()
            .map_err(storage("get group"))?
            .ok_or_else(|| not_found(kind, id))
    }

    /// One page of groups plus the total matching the filters.
    ///
    /// Groups with equal `last_seen_at` keep insertion order.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an inverted range; [`Error::Storage`] on
    /// query failure.
    pub fn list(&self, kind: EventKind, query: &GroupQuery) -> Result<(Vec<Group>, u64)> {
        let (where_sql, params) = query.where_clause()?.build();
        let sql = format!(
            "SELECT {} FROM {}{where_sql}{}{}",
            columns(kind),
            kind.group_table(),
            query.sort.order_by("last_seen_at"),
            query.page.sql()
        );
        debug!(%kind, params = params.len(), sort = %query.sort, "list groups");

        let mut stmt = self.conn.prepare(&sql).map_err(storage("prepare list groups"))?;
        let groups = stmt
            .query_map(params_from_iter(params.iter()), |row| row_to_group(kind, row))
            .map_err(storage("list groups"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("read group row"))?;

        let total = self.count(kind, query)?;
        Ok((groups, total))
    }

    /// Number of groups matching the filters (ignores sort and page).
    ///
    /// # Errors
    ///
    /// Same as [`Self::list`].
    pub fn count(&self, kind: EventKind, query: &GroupQuery) -> Result<u64> {
        let (where_sql, params) = query.where_clause()?.build();
        let sql = format!("SELECT COUNT(*) FROM {}{where_sql}", kind.group_table());
        self.conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(storage("count groups"))
    }

    /// Remove one group row. Its events stay in place.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no row has `id`; [`Error::Storage`] on write
    /// failure.
    pub fn delete(&self, kind: EventKind, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", kind.group_table()),
                [id],
            )
            .map_err(storage("delete group"))?;
        if changed == 0 {
            return Err(not_found(kind, id));
        }
        info!(%kind, id, "deleted group");
        Ok(())
    }
}

pub(crate) fn not_found(kind: EventKind, id: &str) -> Error {
    Error::NotFound {
        kind,
        record: Record::Group,
        id: id.to_string(),
    }
}

fn row_to_group(kind: EventKind, row: &Row<'_>) -> rusqlite::Result<Group> {
    let origin = match kind {
        EventKind::Error => GroupOrigin::Error {
            file: row.get(7)?,
            line: row.get(8)?,
        },
        EventKind::Log => GroupOrigin::Log { level: row.get(7)? },
    };
    Ok(Group {
        id: row.get(0)?,
        project_id: row.get(1)?,
        origin,
        message: row.get(2)?,
        first_seen_at: row.get(3)?,
        last_seen_at: row.get(4)?,
        counter: row.get(5)?,
        status: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{GroupQuery, GroupStore};
    use crate::db::filter::{Page, SortDirection};
    use crate::db::open_in_memory;
    use crate::error::{ErrorCode, Result};
    use crate::ingest::Ingestor;
    use crate::model::{EventKind, Group, GroupOrigin, GroupStatus, NewEvent};
    use rusqlite::Connection;

    const T0: i64 = 1_700_000_000_000;

    /// Groups g0..g4 with `last_seen_at` = T0/1000 + 0..4 s.
    fn seeded() -> Connection {
        let conn = open_in_memory().expect("store");
        let ingestor = Ingestor::new(&conn);
        let rows = [
            ("g0", "p1", "Undefined index: user"),
            ("g1", "p1", "Division by zero"),
            ("g2", "p2", "undefined INDEX: cart"),
            ("g3", "p1", "Timeout after 30s"),
            ("g4", "p1", "Memory 100% used"),
        ];
        for (offset, (id, project, message)) in (0_i64..).zip(rows) {
            ingestor
                .create_event_at(
                    NewEvent::error(project, id, message, "src/app.php", 10),
                    T0 + offset * 1_000,
                )
                .expect("seed group");
        }
        conn.execute("UPDATE error_groups SET status = 'resolved' WHERE id = 'g1'", [])
            .expect("resolve g1");
        conn
    }

    fn ids(groups: &[Group]) -> Vec<&str> {
        groups.iter().map(|g| g.id.as_str()).collect()
    }

    #[test]
    fn get_maps_error_origin() -> Result<()> {
        let conn = seeded();
        let group = GroupStore::new(&conn).get(EventKind::Error, "g1")?;
        assert_eq!(group.status, GroupStatus::Resolved);
        assert_eq!(group.counter, 1);
        assert_eq!(
            group.origin,
            GroupOrigin::Error {
                file: "src/app.php".into(),
                line: 10
            }
        );
        Ok(())
    }

    #[test]
    fn get_missing_group_is_not_found() {
        let conn = seeded();
        let err = GroupStore::new(&conn)
            .get(EventKind::Log, "g1")
            .expect_err("log table is empty");
        assert_eq!(err.code(), ErrorCode::GroupNotFound);
    }

    #[test]
    fn default_listing_is_newest_first() -> Result<()> {
        let conn = seeded();
        let (groups, total) = GroupStore::new(&conn).list(EventKind::Error, &GroupQuery::default())?;
        assert_eq!(ids(&groups), vec!["g4", "g3", "g2", "g1", "g0"]);
        assert_eq!(total, 5);
        Ok(())
    }

    #[test]
    fn filters_and_sorting_compose() -> Result<()> {
        let conn = seeded();
        let store = GroupStore::new(&conn);
        let base = T0 / 1_000;

        let query = GroupQuery {
            project_id: Some("p1".into()),
            seen_from: Some(base + 1),
            seen_to: Some(base + 3),
            sort: SortDirection::Asc,
            ..GroupQuery::default()
        };
        let (groups, total) = store.list(EventKind::Error, &query)?;
        assert_eq!(ids(&groups), vec!["g1", "g3"]);
        assert_eq!(total, 2);

        let query = GroupQuery {
            search: Some("undefined index".into()),
            ..GroupQuery::default()
        };
        let (groups, _) = store.list(EventKind::Error, &query)?;
        assert_eq!(ids(&groups), vec!["g2", "g0"]);

        let query = GroupQuery {
            search: Some("100%".into()),
            ..GroupQuery::default()
        };
        assert_eq!(store.count(EventKind::Error, &query)?, 1);

        let query = GroupQuery {
            status: Some(GroupStatus::Unresolved),
            project_id: Some("p1".into()),
            ..GroupQuery::default()
        };
        assert_eq!(store.count(EventKind::Error, &query)?, 3);
        Ok(())
    }

    #[test]
    fn search_folds_non_ascii_case() -> Result<()> {
        let conn = seeded();
        Ingestor::new(&conn).create_event_at(
            NewEvent::error("p3", "g5", "ОШИБКА базы Données", "src/db.php", 3),
            T0 + 5_000,
        )?;
        let store = GroupStore::new(&conn);
        for needle in ["ошибка", "données", "DONNÉES"] {
            let query = GroupQuery {
                search: Some(needle.into()),
                ..GroupQuery::default()
            };
            assert_eq!(store.count(EventKind::Error, &query)?, 1, "needle {needle}");
        }
        Ok(())
    }

    #[test]
    fn blank_project_filter_is_ignored() -> Result<()> {
        let conn = seeded();
        let query = GroupQuery {
            project_id: Some(String::new()),
            ..GroupQuery::default()
        };
        assert_eq!(GroupStore::new(&conn).count(EventKind::Error, &query)?, 5);
        Ok(())
    }

    #[test]
    fn paging_keeps_total() -> Result<()> {
        let conn = seeded();
        let query = GroupQuery {
            page: Page::new(2, 1),
            ..GroupQuery::default()
        };
        let (groups, total) = GroupStore::new(&conn).list(EventKind::Error, &query)?;
        assert_eq!(ids(&groups), vec!["g3", "g2"]);
        assert_eq!(total, 5);
        Ok(())
    }

    #[test]
    fn inverted_range_is_rejected() {
        let conn = seeded();
        let query = GroupQuery {
            seen_from: Some(10),
            seen_to: Some(9),
            ..GroupQuery::default()
        };
        let err = GroupStore::new(&conn)
            .list(EventKind::Error, &query)
            .expect_err("inverted range");
        assert_eq!(err.code(), ErrorCode::InvalidFilter);
    }

    #[test]
    fn delete_group_leaves_events() -> Result<()> {
        let conn = seeded();
        let store = GroupStore::new(&conn);
        store.delete(EventKind::Error, "g0")?;
        assert!(store.get(EventKind::Error, "g0").is_err());

        let events: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM errors WHERE fingerprint = 'g0'",
                [],
                |row| row.get(0),
            )
            .expect("count events");
        assert_eq!(events, 1);

        let err = store.delete(EventKind::Error, "g0").expect_err("second delete");
        assert!(err.is_not_found());
        Ok(())
    }
}
