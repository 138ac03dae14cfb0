use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use duckbug_core::model::GroupOrigin;
use duckbug_core::{
    BatchUpdate, EventKind, Group, GroupLifecycle, GroupQuery, GroupStatus, GroupStore,
    SortDirection,
};
use serde::Serialize;
use std::io::{self, Write};

use super::{Context, format_secs, parse_instant};
use crate::output::{pretty_kv, pretty_rule, pretty_section, render};

#[derive(Args, Debug)]
pub struct GroupsArgs {
    /// Pipeline whose groups to operate on (`error` or `log`).
    pub kind: EventKind,

    #[command(subcommand)]
    pub action: GroupsAction,
}

#[derive(Subcommand, Debug)]
pub enum GroupsAction {
    /// List groups, most recently seen first.
    List(GroupListArgs),
    /// Show one group.
    Show {
        /// Group id (the fingerprint).
        id: String,
    },
    /// Set the status of one or more groups.
    Status(StatusArgs),
    /// Delete one group. Its events are kept.
    Delete {
        /// Group id (the fingerprint).
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct GroupListArgs {
    /// Only groups belonging to this project.
    #[arg(long)]
    pub project: Option<String>,

    /// Only groups in this status.
    #[arg(long)]
    pub status: Option<GroupStatus>,

    /// Case-insensitive substring match on the group message.
    #[arg(long)]
    pub search: Option<String>,

    /// Lower bound on last-seen time (RFC 3339 or unix seconds).
    #[arg(long, value_parser = parse_instant)]
    pub since: Option<DateTime<Utc>>,

    /// Upper bound on last-seen time (RFC 3339 or unix seconds).
    #[arg(long, value_parser = parse_instant)]
    pub until: Option<DateTime<Utc>>,

    /// Sort direction on last-seen time.
    #[arg(long, default_value_t = SortDirection::Desc)]
    pub sort: SortDirection,

    /// Maximum rows to return.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Rows to skip.
    #[arg(long)]
    pub offset: Option<u32>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// New status: unresolved, resolved, or ignored.
    pub status: GroupStatus,

    /// Group ids to update.
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GroupPage {
    items: Vec<Group>,
    total: u64,
}

#[derive(Debug, Serialize)]
struct Deleted {
    deleted: String,
}

impl GroupListArgs {
    fn query(&self, ctx: &Context) -> GroupQuery {
        GroupQuery {
            project_id: self.project.clone(),
            seen_from: self.since.map(|dt| dt.timestamp()),
            seen_to: self.until.map(|dt| dt.timestamp()),
            search: self.search.clone(),
            status: self.status,
            sort: self.sort,
            page: ctx.config.listing.page(self.limit, self.offset),
        }
    }
}

/// Execute `duckbug groups <kind> ...`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the group does not exist,
/// or a filter is rejected.
pub fn run_groups(args: &GroupsArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open_store()?;
    let kind = args.kind;

    match &args.action {
        GroupsAction::List(list) => {
            let (items, total) = GroupStore::new(&conn)
                .list(kind, &list.query(ctx))
                .context("list groups")?;
            let page = GroupPage { items, total };
            render(ctx.output, &page, |p, w| {
                if ctx.output.is_pretty() {
                    pretty_section(w, &format!("{kind} groups ({} of {})", p.items.len(), p.total))?;
                }
                for group in &p.items {
                    write_group_row(w, group)?;
                }
                Ok(())
            })
        }
        GroupsAction::Show { id } => {
            let group = GroupStore::new(&conn).get(kind, id).context("show group")?;
            render(ctx.output, &group, |g, w| write_group_detail(w, g))
        }
        GroupsAction::Status(status) => {
            let outcome = set_status(&GroupLifecycle::new(&conn), kind, status)?;
            render(ctx.output, &outcome, |o, w| {
                for id in &o.updated {
                    writeln!(w, "{id}\t{}", status.status)?;
                }
                for id in &o.missing {
                    writeln!(w, "{id}\tnot found")?;
                }
                Ok(())
            })
        }
        GroupsAction::Delete { id } => {
            GroupStore::new(&conn).delete(kind, id).context("delete group")?;
            let deleted = Deleted { deleted: id.clone() };
            render(ctx.output, &deleted, |d, w| writeln!(w, "deleted {}", d.deleted))
        }
    }
}

/// One id goes through the single-group path so a miss is a plain not-found.
fn set_status(
    lifecycle: &GroupLifecycle<'_>,
    kind: EventKind,
    args: &StatusArgs,
) -> Result<BatchUpdate> {
    if let [id] = args.ids.as_slice() {
        lifecycle
            .update_status(kind, id, args.status)
            .context("update group status")?;
        return Ok(BatchUpdate {
            updated: vec![id.clone()],
            missing: Vec::new(),
        });
    }
    lifecycle
        .batch_update_status(kind, &args.ids, args.status)
        .context("batch update group status")
}

fn origin_label(origin: &GroupOrigin) -> String {
    match origin {
        GroupOrigin::Error { file, line } => format!("{file}:{line}"),
        GroupOrigin::Log { level } => level.to_string(),
    }
}

fn write_group_row(w: &mut dyn Write, group: &Group) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}",
        group.id,
        group.status,
        group.counter,
        format_secs(group.last_seen_at),
        origin_label(&group.origin),
        group.message
    )
}

fn write_group_detail(w: &mut dyn Write, group: &Group) -> io::Result<()> {
    pretty_section(w, &format!("{} group {}", group.kind(), group.id))?;
    pretty_kv(w, "project", &group.project_id)?;
    pretty_kv(w, "status", group.status.as_str())?;
    pretty_kv(w, "counter", group.counter.to_string())?;
    pretty_kv(w, "origin", origin_label(&group.origin))?;
    pretty_kv(w, "first seen", format_secs(group.first_seen_at))?;
    pretty_kv(w, "last seen", format_secs(group.last_seen_at))?;
    pretty_rule(w)?;
    writeln!(w, "{}", group.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use duckbug_core::LogLevel;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: GroupsArgs,
    }

    #[test]
    fn list_args_parse_filters() {
        let w = Wrapper::parse_from([
            "test",
            "error",
            "list",
            "--project",
            "p1",
            "--status",
            "resolved",
            "--since",
            "1700000000",
            "--sort",
            "asc",
            "--limit",
            "10",
        ]);
        assert_eq!(w.args.kind, EventKind::Error);
        let GroupsAction::List(list) = w.args.action else {
            panic!("expected list");
        };
        assert_eq!(list.project.as_deref(), Some("p1"));
        assert_eq!(list.status, Some(GroupStatus::Resolved));
        assert_eq!(list.since.map(|dt| dt.timestamp()), Some(1_700_000_000));
        assert_eq!(list.sort, SortDirection::Asc);
        assert_eq!(list.limit, Some(10));
    }

    #[test]
    fn list_sort_defaults_to_desc() {
        let w = Wrapper::parse_from(["test", "log", "list"]);
        let GroupsAction::List(list) = w.args.action else {
            panic!("expected list");
        };
        assert_eq!(list.sort, SortDirection::Desc);
    }

    #[test]
    fn status_requires_at_least_one_id() {
        assert!(Wrapper::try_parse_from(["test", "error", "status", "resolved"]).is_err());
        let w = Wrapper::parse_from(["test", "error", "status", "ignored", "a", "b"]);
        let GroupsAction::Status(status) = w.args.action else {
            panic!("expected status");
        };
        assert_eq!(status.status, GroupStatus::Ignored);
        assert_eq!(status.ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn status_rejects_unknown_value() {
        assert!(Wrapper::try_parse_from(["test", "error", "status", "closed", "a"]).is_err());
    }

    #[test]
    fn group_row_is_tab_separated() {
        let group = Group {
            id: "f1".into(),
            project_id: "p1".into(),
            origin: GroupOrigin::Log {
                level: LogLevel::Warn,
            },
            message: "disk almost full".into(),
            first_seen_at: 0,
            last_seen_at: 60,
            counter: 3,
            status: GroupStatus::Unresolved,
        };
        let mut buf = Vec::new();
        write_group_row(&mut buf, &group).expect("write");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "f1\tunresolved\t3\t1970-01-01 00:01:00\tWARN\tdisk almost full\n"
        );
    }
}
