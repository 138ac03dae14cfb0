use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use duckbug_core::model::EventBody;
use duckbug_core::{Event, EventKind, EventPatch, EventQuery, EventStore, LogLevel, SortDirection};
use serde::Serialize;
use std::io::{self, Write};

use super::{Context, format_millis, format_secs, parse_instant};
use crate::output::{pretty_kv, pretty_rule, pretty_section, render};

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Pipeline whose events to operate on (`error` or `log`).
    pub kind: EventKind,

    #[command(subcommand)]
    pub action: EventsAction,
}

#[derive(Subcommand, Debug)]
pub enum EventsAction {
    /// List events, newest first.
    List(EventListArgs),
    /// Show one event.
    Show {
        /// Event id.
        id: String,
    },
    /// Patch fields of one event with a JSON object.
    Update {
        /// Event id.
        id: String,
        /// JSON object of fields to change, e.g. `{"message":"..."}`.
        #[arg(long)]
        patch: String,
    },
    /// Delete one event. Its group aggregate is not touched.
    Delete {
        /// Event id.
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct EventListArgs {
    /// Only events of this project.
    #[arg(long)]
    pub project: Option<String>,

    /// Only events of this group.
    #[arg(long)]
    pub fingerprint: Option<String>,

    /// Lower bound on event time (RFC 3339 or unix seconds).
    #[arg(long, value_parser = parse_instant)]
    pub since: Option<DateTime<Utc>>,

    /// Upper bound on event time (RFC 3339 or unix seconds).
    #[arg(long, value_parser = parse_instant)]
    pub until: Option<DateTime<Utc>>,

    /// Case-insensitive substring match on the message.
    #[arg(long)]
    pub search: Option<String>,

    /// Only log events at this level.
    #[arg(long)]
    pub level: Option<LogLevel>,

    /// Sort direction on event time.
    #[arg(long, default_value_t = SortDirection::Desc)]
    pub sort: SortDirection,

    /// Maximum rows to return.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Rows to skip.
    #[arg(long)]
    pub offset: Option<u32>,
}

impl EventListArgs {
    fn query(&self, ctx: &Context) -> EventQuery {
        EventQuery {
            project_id: self.project.clone(),
            fingerprint: self.fingerprint.clone(),
            time_from: self.since.map(|dt| dt.timestamp_millis()),
            time_to: self.until.map(|dt| dt.timestamp_millis()),
            search: self.search.clone(),
            level: self.level,
            sort: self.sort,
            page: ctx.config.listing.page(self.limit, self.offset),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventPage {
    items: Vec<Event>,
    total: u64,
}

#[derive(Debug, Serialize)]
struct Deleted {
    deleted: String,
}

/// Execute `duckbug events <kind> ...`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the event does not exist,
/// the patch is malformed, or a filter is rejected.
pub fn run_events(args: &EventsArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open_store()?;
    let store = EventStore::new(&conn);
    let kind = args.kind;

    match &args.action {
        EventsAction::List(list) => {
            let (items, total) = store.list(kind, &list.query(ctx)).context("list events")?;
            let page = EventPage { items, total };
            render(ctx.output, &page, |p, w| {
                if ctx.output.is_pretty() {
                    pretty_section(w, &format!("{kind} events ({} of {})", p.items.len(), p.total))?;
                }
                for event in &p.items {
                    write_event_row(w, event)?;
                }
                Ok(())
            })
        }
        EventsAction::Show { id } => {
            let event = store.get(kind, id).context("show event")?;
            render(ctx.output, &event, |e, w| write_event_detail(w, e))
        }
        EventsAction::Update { id, patch } => {
            let patch: EventPatch =
                serde_json::from_str(patch).context("parse --patch as an event patch object")?;
            let event = store.update(kind, id, &patch).context("update event")?;
            render(ctx.output, &event, |e, w| write_event_detail(w, e))
        }
        EventsAction::Delete { id } => {
            store.delete(kind, id).context("delete event")?;
            let deleted = Deleted { deleted: id.clone() };
            render(ctx.output, &deleted, |d, w| writeln!(w, "deleted {}", d.deleted))
        }
    }
}

fn write_event_row(w: &mut dyn Write, event: &Event) -> io::Result<()> {
    let origin = match &event.body {
        EventBody::Error(details) => format!("{}:{}", details.file, details.line),
        EventBody::Log { level } => level.to_string(),
    };
    writeln!(
        w,
        "{}\t{}\t{}\t{origin}\t{}",
        event.id,
        format_millis(event.time),
        event.fingerprint,
        event.message
    )
}

fn write_event_detail(w: &mut dyn Write, event: &Event) -> io::Result<()> {
    pretty_section(w, &format!("{} event {}", event.kind(), event.id))?;
    pretty_kv(w, "project", &event.project_id)?;
    pretty_kv(w, "fingerprint", &event.fingerprint)?;
    pretty_kv(w, "time", format_millis(event.time))?;
    match &event.body {
        EventBody::Error(details) => {
            pretty_kv(w, "file", format!("{}:{}", details.file, details.line))?;
            if let Some(url) = &details.request.url {
                let method = details.request.method.as_deref().unwrap_or("");
                pretty_kv(w, "request", format!("{method} {url}").trim_start())?;
            }
        }
        EventBody::Log { level } => pretty_kv(w, "level", level.as_str())?,
    }
    pretty_kv(w, "updated", format_secs(event.updated_at))?;
    pretty_rule(w)?;
    writeln!(w, "{}", event.message)?;
    if let Some(context) = &event.context {
        writeln!(w, "{context}")?;
    }
    Ok(())
}
