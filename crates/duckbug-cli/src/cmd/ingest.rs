use anyhow::{Context as _, Result};
use clap::Args;
use duckbug_core::model::{ErrorEventInput, LogEventInput};
use duckbug_core::{ErrorCode, EventKind, GroupStatus, IngestOutcome, Ingestor, NewEvent};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::warn;

use super::Context;
use crate::output::{pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Pipeline to ingest into (`error` or `log`).
    pub kind: EventKind,

    /// Read JSON lines from this file instead of stdin.
    #[arg(long, short)]
    pub file: Option<PathBuf>,
}

/// Result of ingesting one input line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Accepted {
    line: usize,
    event_id: String,
    fingerprint: String,
    group_counter: u64,
    group_status: GroupStatus,
    created: bool,
    reopened: bool,
}

#[derive(Debug, Serialize)]
struct Rejected {
    line: usize,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct IngestReport {
    accepted: Vec<Accepted>,
    rejected: Vec<Rejected>,
}

impl IngestReport {
    fn record(&mut self, line: usize, result: Result<IngestOutcome, Rejected>) {
        match result {
            Ok(outcome) => self.accepted.push(Accepted {
                line,
                event_id: outcome.event.id,
                fingerprint: outcome.event.fingerprint,
                group_counter: outcome.group_counter,
                group_status: outcome.group_status,
                created: outcome.created,
                reopened: outcome.reopened,
            }),
            Err(rejected) => {
                warn!(line, error = %rejected.message, "event rejected");
                self.rejected.push(rejected);
            }
        }
    }
}

/// Decode one JSON line into an event for the given pipeline.
fn parse_line(kind: EventKind, line: &str) -> serde_json::Result<NewEvent> {
    match kind {
        EventKind::Error => serde_json::from_str::<ErrorEventInput>(line).map(NewEvent::from),
        EventKind::Log => serde_json::from_str::<LogEventInput>(line).map(NewEvent::from),
    }
}

/// Validation code for a line that is well-formed JSON but does not decode
/// into an event. Syntax errors carry no code.
fn decode_error_code(err: &serde_json::Error) -> Option<ErrorCode> {
    if !err.is_data() {
        return None;
    }
    if err.to_string().starts_with("missing field") {
        Some(ErrorCode::MissingField)
    } else {
        Some(ErrorCode::InvalidEnumValue)
    }
}

fn ingest_line(
    ingestor: &Ingestor<'_>,
    kind: EventKind,
    line_no: usize,
    line: &str,
) -> Result<IngestOutcome, Rejected> {
    let event = parse_line(kind, line).map_err(|err| Rejected {
        line: line_no,
        message: format!("malformed {kind} event: {err}"),
        code: decode_error_code(&err).map(|code| code.code().to_string()),
    })?;
    ingestor.create_event(event).map_err(|err| Rejected {
        line: line_no,
        message: err.to_string(),
        code: Some(err.code().code().to_string()),
    })
}

/// Execute `duckbug ingest`: one event per non-blank JSON line.
///
/// Every line is attempted; each accepted line is committed on its own.
///
/// # Errors
///
/// Returns an error if the input cannot be read, the store cannot be opened,
/// or any line was rejected.
pub fn run_ingest(args: &IngestArgs, ctx: &Context) -> Result<()> {
    let reader: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let conn = ctx.open_store()?;
    let ingestor = Ingestor::new(&conn);
    let mut report = IngestReport::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("read event input")?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        report.record(line_no, ingest_line(&ingestor, args.kind, line_no, &line));
    }

    render(ctx.output, &report, |r, w| write_report(r, ctx.output.is_pretty(), w))?;

    if report.rejected.is_empty() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} events rejected",
            report.rejected.len(),
            report.rejected.len() + report.accepted.len()
        )
    }
}

fn write_report(report: &IngestReport, pretty: bool, w: &mut dyn Write) -> io::Result<()> {
    if pretty {
        pretty_section(w, "Ingest")?;
        pretty_kv(w, "accepted", report.accepted.len().to_string())?;
        pretty_kv(w, "rejected", report.rejected.len().to_string())?;
        writeln!(w)?;
    }
    for a in &report.accepted {
        let mark = if a.created {
            " new"
        } else if a.reopened {
            " reopened"
        } else {
            ""
        };
        writeln!(
            w,
            "{}\t{}\tcounter={}\t{}{mark}",
            a.event_id, a.fingerprint, a.group_counter, a.group_status
        )?;
    }
    for r in &report.rejected {
        writeln!(w, "line {}: {}", r.line, r.message)?;
    }
    Ok(())
}
