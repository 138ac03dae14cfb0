//! Ingestion transaction: one group upsert plus one event insert, atomically.
//!
//! For every accepted event exactly one group row changes and exactly one
//! event row is inserted, inside a single `BEGIN IMMEDIATE` transaction:
//!
//! 1. validate the payload (no storage call on failure)
//! 2. upsert the group: create with `counter = 1`, or bump `counter`,
//!    refresh `last_seen_at`, and reopen it if it was `resolved`
//! 3. insert the event row
//! 4. commit, or roll back both writes
//!
//! Concurrent ingestions for the same fingerprint serialise on the SQLite
//! write lock, so no increment is lost.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::db::{abort, begin_immediate};
use crate::error::{Result, storage};
use crate::model::{Event, EventBody, EventKind, GroupStatus, NewEvent};

/// What the ingestion transaction did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// The persisted event, with its generated id and storage stamps.
    pub event: Event,
    /// Group counter after the upsert.
    pub group_counter: u64,
    /// Group status after the upsert.
    pub group_status: GroupStatus,
    /// The event created its group.
    pub created: bool,
    /// The event moved its group from `resolved` back to `unresolved`.
    pub reopened: bool,
}

/// Writes events and keeps their groups' aggregates in step.
#[derive(Debug, Clone, Copy)]
pub struct Ingestor<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Ingestor<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Ingest `event` using the current wall clock.
    ///
    /// # Errors
    ///
    /// See [`Self::create_event_at`].
    pub fn create_event(&self, event: NewEvent) -> Result<IngestOutcome> {
        self.create_event_at(event, Utc::now().timestamp_millis())
    }

    /// Ingest `event` as if it arrived at `now_ms` (unix milliseconds).
    ///
    /// `now_ms` stamps the group's `first_seen_at`/`last_seen_at` and the
    /// event's `created_at`/`updated_at` (all in seconds), and becomes the
    /// event `time` when the payload carries none.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] before touching storage when a
    /// required field is blank, and [`crate::Error::Storage`] when the
    /// transaction cannot begin, either write fails, or the commit fails. In
    /// the storage case neither the group nor the event is changed.
    pub fn create_event_at(&self, event: NewEvent, now_ms: i64) -> Result<IngestOutcome> {
        event.validate()?;

        let tx = begin_immediate(self.conn, "begin ingest transaction")?;
        let outcome = match write_event(&tx, event, now_ms) {
            Ok(outcome) => outcome,
            Err(err) => return Err(abort(tx, "ingest event", err)),
        };
        tx.commit().map_err(storage("commit ingest transaction"))?;

        let kind = outcome.event.kind();
        let fingerprint = outcome.event.fingerprint.as_str();
        if outcome.created {
            info!(%kind, fingerprint, project_id = %outcome.event.project_id, "created group");
        } else if outcome.reopened {
            info!(%kind, fingerprint, counter = outcome.group_counter, "reopened resolved group");
        } else {
            debug!(%kind, fingerprint, counter = outcome.group_counter, "recorded event");
        }

        Ok(outcome)
    }
}

fn write_event(tx: &Transaction<'_>, event: NewEvent, now_ms: i64) -> Result<IngestOutcome> {
    let kind = event.kind();
    let now_s = now_ms.div_euclid(1_000);

    let previous: Option<GroupStatus> = tx
        .query_row(
            &format!("SELECT status FROM {} WHERE id = ?1", kind.group_table()),
            [&event.fingerprint],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage("read group status"))?;

    let (counter, status) = upsert_group(tx, &event, now_s)?;

    let persisted = Event {
        id: event
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        project_id: event.project_id,
        fingerprint: event.fingerprint,
        message: event.message,
        context: event.context,
        time: event.time.unwrap_or(now_ms),
        created_at: now_s,
        updated_at: now_s,
        body: event.body,
    };
    insert_event(tx, &persisted)?;

    Ok(IngestOutcome {
        event: persisted,
        group_counter: counter,
        group_status: status,
        created: previous.is_none(),
        reopened: previous == Some(GroupStatus::Resolved) && status == GroupStatus::Unresolved,
    })
}

const UPSERT_TAIL: &str = "ON CONFLICT (id) DO UPDATE SET
    counter = counter + 1,
    last_seen_at = excluded.last_seen_at,
    status = CASE WHEN status = 'resolved' THEN 'unresolved' ELSE status END
RETURNING counter, status";

fn upsert_group(tx: &Transaction<'_>, event: &NewEvent, now_s: i64) -> Result<(u64, GroupStatus)> {
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(u64, GroupStatus)> {
        Ok((row.get(0)?, row.get(1)?))
    };
    let result = match &event.body {
        EventBody::Error(details) => tx.query_row(
            &format!(
                "INSERT INTO {} (id, project_id, file, line, message, first_seen_at, last_seen_at, counter, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 1, 'unresolved')
                 {UPSERT_TAIL}",
                EventKind::Error.group_table()
            ),
            params![
                event.fingerprint,
                event.project_id,
                details.file,
                details.line,
                event.message,
                now_s
            ],
            map_row,
        ),
        EventBody::Log { level } => tx.query_row(
            &format!(
                "INSERT INTO {} (id, project_id, level, message, first_seen_at, last_seen_at, counter, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1, 'unresolved')
                 {UPSERT_TAIL}",
                EventKind::Log.group_table()
            ),
            params![event.fingerprint, event.project_id, level, event.message, now_s],
            map_row,
        ),
    };
    result.map_err(storage("upsert group"))
}

pub(crate) fn json_text(value: Option<&Value>) -> Option<String> {
    value.map(Value::to_string)
}

fn insert_event(tx: &Transaction<'_>, event: &Event) -> Result<()> {
    match &event.body {
        EventBody::Error(details) => {
            let request = &details.request;
            tx.execute(
                "INSERT INTO errors (
                    id, project_id, fingerprint, message, stacktrace, file, line, context,
                    ip, url, method, headers, query_params, body_params, cookies, session,
                    files, env, time, created_at, updated_at
                 ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21
                 )",
                params![
                    event.id,
                    event.project_id,
                    event.fingerprint,
                    event.message,
                    json_text(details.stacktrace.as_ref()),
                    details.file,
                    details.line,
                    json_text(event.context.as_ref()),
                    request.ip,
                    request.url,
                    request.method,
                    json_text(request.headers.as_ref()),
                    json_text(request.query_params.as_ref()),
                    json_text(request.body_params.as_ref()),
                    json_text(request.cookies.as_ref()),
                    json_text(request.session.as_ref()),
                    json_text(request.files.as_ref()),
                    json_text(request.env.as_ref()),
                    event.time,
                    event.created_at,
                    event.updated_at,
                ],
            )
        }
        EventBody::Log { level } => tx.execute(
            "INSERT INTO logs (
                id, project_id, fingerprint, level, message, context, time, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.id,
                event.project_id,
                event.fingerprint,
                level,
                event.message,
                json_text(event.context.as_ref()),
                event.time,
                event.created_at,
                event.updated_at,
            ],
        ),
    }
    .map_err(storage("insert event"))?;
    Ok(())
}
