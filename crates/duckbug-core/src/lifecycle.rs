//! Operator-driven status changes on groups.
//!
//! Updates are unconditional: any status may be set from any status. The
//! only automatic transition (`resolved` → `unresolved` on a new event)
//! lives in the ingestion transaction.

use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params, params_from_iter};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use crate::db::filter::{Predicate, WhereClause};
use crate::db::{abort, begin_immediate};
use crate::error::{Result, storage};
use crate::groups::not_found;
use crate::model::{EventKind, GroupStatus};

/// Result of a batch status change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    /// Distinct ids that existed and were set.
    pub updated: Vec<String>,
    /// Distinct requested ids with no group row.
    pub missing: Vec<String>,
}

/// Sets group status, one at a time or in bulk.
#[derive(Debug, Clone, Copy)]
pub struct GroupLifecycle<'conn> {
    conn: &'conn Connection,
}

impl<'conn> GroupLifecycle<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Set one group's status.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] when no group has `id`;
    /// [`crate::Error::Storage`] on write failure.
    pub fn update_status(&self, kind: EventKind, id: &str, status: GroupStatus) -> Result<()> {
        let changed = self
            .conn
            .execute(
                &format!("UPDATE {} SET status = ?1 WHERE id = ?2", kind.group_table()),
                params![status, id],
            )
            .map_err(storage("update group status"))?;
        if changed == 0 {
            return Err(not_found(kind, id));
        }
        info!(%kind, id, %status, "set group status");
        Ok(())
    }

    /// Set the status of every listed group in one transaction.
    ///
    /// Duplicate ids collapse. An empty list succeeds without touching
    /// storage. When some ids exist the update applies to those and the
    /// rest are reported in [`BatchUpdate::missing`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] (carrying the comma-joined ids) when none
    /// of the ids exist; [`crate::Error::Storage`] on failure, in which case
    /// no status changes.
    pub fn batch_update_status(
        &self,
        kind: EventKind,
        ids: &[String],
        status: GroupStatus,
    ) -> Result<BatchUpdate> {
        let requested: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        if requested.is_empty() {
            return Ok(BatchUpdate::default());
        }

        let tx = begin_immediate(self.conn, "begin batch status transaction")?;
        let outcome = match apply_batch(&tx, kind, &requested, status) {
            Ok(outcome) => outcome,
            Err(err) => return Err(abort(tx, "batch update status", err)),
        };
        tx.commit().map_err(storage("commit batch status transaction"))?;

        if outcome.updated.is_empty() {
            let joined = requested.into_iter().collect::<Vec<_>>().join(",");
            return Err(not_found(kind, &joined));
        }
        info!(
            %kind,
            %status,
            updated = outcome.updated.len(),
            missing = outcome.missing.len(),
            "batch set group status"
        );
        Ok(outcome)
    }
}

fn apply_batch(
    tx: &Transaction<'_>,
    kind: EventKind,
    requested: &BTreeSet<&str>,
    status: GroupStatus,
) -> Result<BatchUpdate> {
    let id_values: Vec<Value> = requested
        .iter()
        .map(|id| Value::Text((*id).to_string()))
        .collect();
    let (where_sql, params) = WhereClause::new()
        .and(Predicate::InList("id", id_values))
        .build();

    let mut stmt = tx
        .prepare(&format!(
            "SELECT id FROM {}{where_sql} ORDER BY id",
            kind.group_table()
        ))
        .map_err(storage("prepare batch lookup"))?;
    let existing = stmt
        .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))
        .map_err(storage("batch lookup"))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .map_err(storage("read batch lookup row"))?;
    drop(stmt);

    if existing.is_empty() {
        return Ok(BatchUpdate {
            updated: Vec::new(),
            missing: requested.iter().map(|id| (*id).to_string()).collect(),
        });
    }

    let (update_where, update_params) = WhereClause::new()
        .and(Predicate::InList(
            "id",
            existing.iter().map(|id| Value::Text(id.clone())).collect(),
        ))
        .build_after(vec![Value::Text(status.as_str().to_string())]);
    tx.execute(
        &format!(
            "UPDATE {} SET status = ?1{update_where}",
            kind.group_table()
        ),
        params_from_iter(update_params.iter()),
    )
    .map_err(storage("batch update status"))?;

    let missing = requested
        .iter()
        .filter(|id| !existing.contains(**id))
        .map(|id| (*id).to_string())
        .collect();
    Ok(BatchUpdate {
        updated: existing.into_iter().collect(),
        missing,
    })
}
