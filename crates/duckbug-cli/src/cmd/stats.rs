use anyhow::{Context as _, Result};
use clap::{ArgGroup, Args};
use duckbug_core::{EventKind, GroupStatus, StatsAggregator, WindowCounts};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

use super::Context;
use crate::output::{pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["project", "projects"])))]
pub struct StatsArgs {
    /// Pipeline to count (`error` or `log`).
    pub kind: EventKind,

    /// Window counts for one project.
    #[arg(long)]
    pub project: Option<String>,

    /// Narrow `--project` to one group.
    #[arg(long, requires = "project")]
    pub fingerprint: Option<String>,

    /// Window counts for several projects (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub projects: Vec<String>,

    /// With `--projects`, also count groups in this status per project.
    #[arg(long, requires = "projects")]
    pub groups: Option<GroupStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStats {
    #[serde(flatten)]
    counts: WindowCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<u64>,
}

/// Execute `duckbug stats`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or a query fails.
pub fn run_stats(args: &StatsArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open_store()?;
    let stats = StatsAggregator::new(&conn);

    if let Some(project) = &args.project {
        let counts = stats
            .get_stats(args.kind, project, args.fingerprint.as_deref())
            .context("compute window counts")?;
        let heading = args.fingerprint.as_ref().map_or_else(
            || format!("{} stats for {project}", args.kind),
            |fp| format!("{} stats for {project} / {fp}", args.kind),
        );
        return render(ctx.output, &counts, |c, w| {
            if ctx.output.is_pretty() {
                pretty_section(w, &heading)?;
                pretty_kv(w, "last 24h", c.last_24h.to_string())?;
                pretty_kv(w, "last 7d", c.last_7d.to_string())?;
                pretty_kv(w, "last 30d", c.last_30d.to_string())
            } else {
                write_counts_row(w, project, c, None)
            }
        });
    }

    let per_project = load_batch(&stats, args)?;
    render(ctx.output, &per_project, |rows, w| {
        if ctx.output.is_pretty() {
            pretty_section(w, &format!("{} stats", args.kind))?;
        }
        for (project, row) in rows {
            write_counts_row(w, project, &row.counts, row.groups)?;
        }
        Ok(())
    })
}

fn load_batch(
    stats: &StatsAggregator<'_>,
    args: &StatsArgs,
) -> Result<BTreeMap<String, ProjectStats>> {
    let counts = stats
        .batch_get_stats(args.kind, &args.projects)
        .context("compute batch window counts")?;
    let mut groups = match args.groups {
        Some(status) => stats
            .batch_count_groups(args.kind, &args.projects, status)
            .context("count groups per project")?,
        None => HashMap::new(),
    };

    Ok(counts
        .into_iter()
        .map(|(project, counts)| {
            let tally = args.groups.map(|_| groups.remove(&project).unwrap_or(0));
            (
                project,
                ProjectStats {
                    counts,
                    groups: tally,
                },
            )
        })
        .collect())
}

fn write_counts_row(
    w: &mut dyn Write,
    project: &str,
    counts: &WindowCounts,
    groups: Option<u64>,
) -> io::Result<()> {
    write!(
        w,
        "{project}\t24h={}\t7d={}\t30d={}",
        counts.last_24h, counts.last_7d, counts.last_30d
    )?;
    match groups {
        Some(n) => writeln!(w, "\tgroups={n}"),
        None => writeln!(w),
    }
}
