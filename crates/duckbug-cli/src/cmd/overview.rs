use anyhow::{Context as _, Result};
use clap::Args;
use duckbug_core::ProjectOverviews;

use super::Context;
use crate::output::{pretty_rule, render};

#[derive(Args, Debug)]
pub struct OverviewArgs {
    /// Project ids to summarise.
    #[arg(required = true)]
    pub projects: Vec<String>,
}

/// Execute `duckbug overview`: open error groups and 24h log volume per
/// project.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or a query fails.
pub fn run_overview(args: &OverviewArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open_store()?;
    let overviews = ProjectOverviews::new(&conn)
        .load(&args.projects)
        .context("load project overviews")?;

    render(ctx.output, &overviews, |rows, w| {
        if ctx.output.is_pretty() {
            writeln!(w, "{:<24} {:>12} {:>12}", "PROJECT", "OPEN ERRORS", "LOGS 24H")?;
            pretty_rule(w)?;
            for (project, o) in rows {
                writeln!(w, "{project:<24} {:>12} {:>12}", o.open_errors, o.logs_last_24h)?;
            }
        } else {
            for (project, o) in rows {
                writeln!(
                    w,
                    "{project}\topen_errors={}\tlogs_24h={}",
                    o.open_errors, o.logs_last_24h
                )?;
            }
        }
        Ok(())
    })
}
