use anyhow::Result;
use clap::Args;
use duckbug_core::db::migrations;
use serde::Serialize;

use super::Context;
use crate::output::{pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct InitArgs {}

#[derive(Debug, Serialize)]
struct InitReport {
    path: String,
    schema_version: u32,
}

/// Execute `duckbug init`: create the store file if needed and bring its
/// schema up to date. Running it again is a no-op.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or migrated.
pub fn run_init(_args: &InitArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open_store()?;
    let report = InitReport {
        path: ctx.store_path.display().to_string(),
        schema_version: migrations::current_schema_version(&conn)?,
    };
    tracing::info!(path = %report.path, version = report.schema_version, "store ready");

    render(ctx.output, &report, |r, w| {
        if ctx.output.is_pretty() {
            pretty_section(w, "Store ready")?;
            pretty_kv(w, "path", &r.path)?;
            pretty_kv(w, "schema", r.schema_version.to_string())
        } else {
            writeln!(w, "{}\tschema={}", r.path, r.schema_version)
        }
    })
}
