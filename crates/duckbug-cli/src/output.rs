//! Shared output layer for pretty/text/JSON parity across CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its result
//! accordingly: framed output for humans, compact lines for pipes, or JSON.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / `--json` flag
//! 2. `DUCKBUG_FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

/// Env var consulted when neither `--format` nor `--json` is given.
pub const FORMAT_ENV: &str = "DUCKBUG_FORMAT";

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// One line per record for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if pretty output was requested.
    pub const fn is_pretty(self) -> bool {
        matches!(self, Self::Pretty)
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {} // unknown value, fall through to TTY detection
        }
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var(FORMAT_ENV).ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// A structured error with optional remediation hint and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Stable `E####` code when the failure came from the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl CliError {
    /// Create a simple error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            hint: None,
        }
    }

    /// Build from any command failure, surfacing engine codes when the chain
    /// carries a [`duckbug_core::Error`].
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<duckbug_core::Error>())
            .map_or_else(
                || Self::new(format!("{err:#}")),
                |engine| Self {
                    message: format!("{err:#}"),
                    ..Self::from(engine)
                },
            )
    }
}

impl From<&duckbug_core::Error> for CliError {
    fn from(err: &duckbug_core::Error) -> Self {
        Self {
            message: err.to_string(),
            code: Some(err.code().code().to_string()),
            hint: err.hint().map(str::to_string),
        }
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode, the value is serialized with `serde_json`. In pretty/text
/// mode, `human_fn` writes the output and may branch on the mode itself.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            human_fn(value, &mut out)?;
        }
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(mode, error, &mut out)
}

fn write_error(mode: OutputMode, error: &CliError, out: &mut dyn Write) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(hint) = &error.hint {
                writeln!(out, "  hint: {hint}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckbug_core::{ErrorCode, EventKind};

    #[test]
    fn resolve_format_flag_wins_over_json_and_env() {
        let mode = resolve_output_mode_inner(Some(OutputMode::Text), true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_json_flag_wins_over_env() {
        let mode = resolve_output_mode_inner(None, true, Some("text"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_format_env_case_insensitive() {
        let mode = resolve_output_mode_inner(None, false, Some("JSON"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_unknown_env_falls_through_to_tty() {
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("yaml"), true),
            OutputMode::Pretty
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("yaml"), false),
            OutputMode::Text
        );
    }

    #[test]
    fn cli_error_from_engine_error_carries_code_and_hint() {
        let err = duckbug_core::Error::missing("projectId");
        let cli = CliError::from(&err);
        assert_eq!(cli.code.as_deref(), Some(ErrorCode::MissingField.code()));
        assert!(cli.hint.is_some());
        assert!(cli.message.contains("projectId is required"));
    }

    #[test]
    fn cli_error_from_anyhow_finds_engine_error_under_context() {
        let engine = duckbug_core::Error::NotFound {
            kind: EventKind::Error,
            record: duckbug_core::error::Record::Group,
            id: "f1".into(),
        };
        let err = anyhow::Error::new(engine).context("update group status");
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.code.as_deref(), Some("E2001"));
        assert!(cli.message.starts_with("update group status"));
    }

    #[test]
    fn cli_error_from_plain_anyhow_has_no_code() {
        let cli = CliError::from_anyhow(&anyhow::anyhow!("boom"));
        assert_eq!(cli.message, "boom");
        assert!(cli.code.is_none());
        assert!(cli.hint.is_none());
    }

    #[test]
    fn error_json_is_wrapped() {
        let mut buf = Vec::new();
        let err = CliError {
            message: "missing".into(),
            code: Some("E3001".into()),
            hint: None,
        };
        write_error(OutputMode::Json, &err, &mut buf).expect("write error");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("valid json");
        assert_eq!(value["error"]["code"], "E3001");
        assert_eq!(value["error"]["message"], "missing");
        assert!(value["error"].get("hint").is_none());
    }

    #[test]
    fn error_text_includes_code_and_hint() {
        let mut buf = Vec::new();
        let err = CliError {
            message: "bad".into(),
            code: Some("E3003".into()),
            hint: Some("fix it".into()),
        };
        write_error(OutputMode::Text, &err, &mut buf).expect("write error");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "error[E3003]: bad\n  hint: fix it\n");
    }

    #[test]
    fn pretty_kv_aligns_keys() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "status", "resolved").expect("write");
        let line = String::from_utf8(buf).expect("utf8");
        assert!(line.starts_with("status:"));
        assert!(line.ends_with("resolved\n"));
    }
}
