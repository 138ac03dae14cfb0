//! E2E tests for the write path and group lifecycle:
//! `duckbug init`, `duckbug ingest`, `duckbug groups`.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test harness helpers
// ---------------------------------------------------------------------------

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(dir.path().join("config.toml"), "").expect("write empty config");
        Self { dir }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("duckbug.sqlite3")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("duckbug"));
        cmd.current_dir(self.dir.path());
        cmd.env("DUCKBUG_LOG", "error");
        cmd.env("DUCKBUG_CONFIG", self.dir.path().join("config.toml"));
        cmd.env_remove("DUCKBUG_DB");
        cmd.env_remove("DUCKBUG_FORMAT");
        cmd.arg("--db").arg(self.db());
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .output()
            .expect("command should not crash");
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
    }

    fn ingest(&self, kind: &str, lines: &str) -> Value {
        let output = self
            .cmd()
            .args(["ingest", kind, "--json"])
            .write_stdin(lines.to_string())
            .output()
            .expect("ingest should not crash");
        assert!(
            output.status.success(),
            "ingest failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("valid JSON from ingest")
    }
}

fn error_line(fingerprint: &str, message: &str) -> String {
    format!(
        r#"{{"projectId":"p1","fingerprint":"{fingerprint}","message":"{message}","file":"src/app.php","line":12}}"#
    )
}

fn stderr_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stderr).expect("valid JSON error on stderr")
}

// ---------------------------------------------------------------------------
// duckbug init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_store_and_reports_schema() {
    let env = Env::new();
    let report = env.json(&["init"]);
    assert_eq!(report["schema_version"], 2);
    assert!(env.db().exists());

    // Second run is a no-op on an existing store.
    let again = env.json(&["init"]);
    assert_eq!(again["schema_version"], 2);
}

#[test]
fn store_path_comes_from_config_without_db_flag() {
    let env = Env::new();
    let store = env.dir.path().join("nested").join("from-config.sqlite3");
    std::fs::write(
        env.dir.path().join("config.toml"),
        format!("[store]\npath = {:?}\n", store.display().to_string()),
    )
    .expect("write config");

    Command::new(assert_cmd::cargo::cargo_bin!("duckbug"))
        .env("DUCKBUG_LOG", "error")
        .env("DUCKBUG_CONFIG", env.dir.path().join("config.toml"))
        .env_remove("DUCKBUG_DB")
        .args(["init", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-config.sqlite3"));
    assert!(store.exists());
}

#[test]
fn explicit_missing_config_fails() {
    let env = Env::new();
    env.cmd()
        .args(["--config", "does-not-exist.toml", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn malformed_config_reports_parse_code() {
    let env = Env::new();
    std::fs::write(env.dir.path().join("config.toml"), "[store\npath = 1\n")
        .expect("write broken config");

    let output = env
        .cmd()
        .args(["init", "--json"])
        .output()
        .expect("init should not crash");
    assert!(!output.status.success());
    let err = stderr_json(&output);
    assert_eq!(err["error"]["code"], "E1002");
    assert!(err["error"]["hint"].as_str().expect("hint").contains("config.toml"));
    assert!(!env.db().exists());
}

// ---------------------------------------------------------------------------
// duckbug ingest
// ---------------------------------------------------------------------------

#[test]
fn ingest_groups_events_by_fingerprint() {
    let env = Env::new();
    let lines = [
        error_line("f1", "boom"),
        error_line("f1", "boom again"),
        String::new(),
        error_line("f2", "other"),
        error_line("f1", "boom thrice"),
    ]
    .join("\n");
    let report = env.ingest("error", &lines);

    let accepted = report["accepted"].as_array().expect("accepted array");
    assert_eq!(accepted.len(), 4);
    assert_eq!(accepted[0]["created"], true);
    assert_eq!(accepted[1]["created"], false);
    assert_eq!(accepted[3]["groupCounter"], 3);
    assert_eq!(accepted[3]["line"], 5);
    assert!(report["rejected"].as_array().expect("rejected").is_empty());

    let group = env.json(&["groups", "error", "show", "f1"]);
    assert_eq!(group["counter"], 3);
    assert_eq!(group["status"], "unresolved");
    assert_eq!(group["file"], "src/app.php");
    assert_eq!(group["line"], 12);
}

#[test]
fn ingest_reads_from_file() {
    let env = Env::new();
    let path = env.dir.path().join("logs.jsonl");
    std::fs::write(
        &path,
        r#"{"projectId":"p1","fingerprint":"disk","message":"disk 91%","level":"WARN"}
{"projectId":"p1","fingerprint":"disk","message":"disk 95%","level":"WARN"}
"#,
    )
    .expect("write input");

    env.cmd()
        .args(["ingest", "log", "--file"])
        .arg(&path)
        .assert()
        .success();

    let group = env.json(&["groups", "log", "show", "disk"]);
    assert_eq!(group["counter"], 2);
    assert_eq!(group["level"], "WARN");
}

#[test]
fn ingest_reports_rejected_lines_and_fails() {
    let env = Env::new();
    let lines = [
        error_line("f1", "boom"),
        r#"{"fingerprint":"f1","message":"no project","file":"a.php","line":1}"#.to_string(),
        "not json".to_string(),
    ]
    .join("\n");

    let output = env
        .cmd()
        .args(["ingest", "error", "--json"])
        .write_stdin(lines)
        .output()
        .expect("ingest should not crash");
    assert!(!output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("report JSON");
    assert_eq!(report["accepted"].as_array().expect("accepted").len(), 1);
    let rejected = report["rejected"].as_array().expect("rejected");
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0]["line"], 2);
    assert_eq!(rejected[0]["code"], "E3001");
    assert_eq!(rejected[1]["line"], 3);
    assert!(rejected[1].get("code").is_none(), "syntax errors carry no code");

    let err = stderr_json(&output);
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .contains("2 of 3 events rejected")
    );
}

#[test]
fn undecodable_fields_are_rejected_with_validation_codes() {
    let env = Env::new();
    let lines = [
        r#"{"projectId":"p1","fingerprint":"f1","message":"x","level":"FATAL"}"#,
        r#"{"projectId":"p1","fingerprint":"f1","message":"x"}"#,
    ]
    .join("\n");

    let output = env
        .cmd()
        .args(["ingest", "log", "--json"])
        .write_stdin(lines)
        .output()
        .expect("ingest should not crash");
    assert!(!output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("report JSON");
    let rejected = report["rejected"].as_array().expect("rejected");
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0]["code"], "E3002");
    assert_eq!(rejected[1]["code"], "E3001");
}

// ---------------------------------------------------------------------------
// duckbug groups
// ---------------------------------------------------------------------------

#[test]
fn resolving_then_ingesting_reopens_the_group() {
    let env = Env::new();
    env.ingest("error", &error_line("f1", "boom"));

    let updated = env.json(&["groups", "error", "status", "resolved", "f1"]);
    assert_eq!(updated["updated"][0], "f1");
    assert_eq!(
        env.json(&["groups", "error", "show", "f1"])["status"],
        "resolved"
    );

    let report = env.ingest("error", &error_line("f1", "boom"));
    assert_eq!(report["accepted"][0]["reopened"], true);
    assert_eq!(report["accepted"][0]["groupStatus"], "unresolved");
}

#[test]
fn ignored_groups_stay_ignored() {
    let env = Env::new();
    env.ingest("error", &error_line("f1", "boom"));
    env.json(&["groups", "error", "status", "ignored", "f1"]);

    let report = env.ingest("error", &error_line("f1", "boom"));
    assert_eq!(report["accepted"][0]["groupStatus"], "ignored");
    assert_eq!(report["accepted"][0]["reopened"], false);
}

#[test]
fn batch_status_reports_missing_ids() {
    let env = Env::new();
    env.ingest(
        "error",
        &[error_line("f1", "a"), error_line("f2", "b")].join("\n"),
    );

    let outcome = env.json(&["groups", "error", "status", "resolved", "f1", "f2", "nope"]);
    assert_eq!(outcome["updated"], serde_json::json!(["f1", "f2"]));
    assert_eq!(outcome["missing"], serde_json::json!(["nope"]));

    let list = env.json(&["groups", "error", "list", "--status", "resolved"]);
    assert_eq!(list["total"], 2);
}

#[test]
fn unknown_group_is_not_found_with_code() {
    let env = Env::new();
    env.json(&["init"]);

    let output = env
        .cmd()
        .args(["groups", "error", "show", "missing", "--json"])
        .output()
        .expect("show should not crash");
    assert!(!output.status.success());
    assert_eq!(stderr_json(&output)["error"]["code"], "E2001");

    let output = env
        .cmd()
        .args(["groups", "log", "status", "resolved", "a", "b", "--json"])
        .output()
        .expect("status should not crash");
    assert!(!output.status.success());
    let err = stderr_json(&output);
    assert_eq!(err["error"]["code"], "E2001");
    assert!(err["error"]["message"].as_str().expect("message").contains("a,b"));
}

#[test]
fn group_list_filters_search_and_paginates() {
    let env = Env::new();
    env.ingest(
        "error",
        &[
            error_line("f1", "Database timeout"),
            error_line("f2", "null pointer"),
            error_line("f3", "database locked"),
        ]
        .join("\n"),
    );

    let found = env.json(&["groups", "error", "list", "--search", "DATABASE"]);
    assert_eq!(found["total"], 2);

    let page = env.json(&["groups", "error", "list", "--limit", "1", "--offset", "1"]);
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().expect("items").len(), 1);
}

#[test]
fn deleting_a_group_keeps_its_events() {
    let env = Env::new();
    env.ingest("error", &error_line("f1", "boom"));

    env.json(&["groups", "error", "delete", "f1"]);
    let events = env.json(&["events", "error", "list", "--fingerprint", "f1"]);
    assert_eq!(events["total"], 1);

    env.cmd()
        .args(["groups", "error", "delete", "f1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"));
}

#[test]
fn text_output_is_one_line_per_group() {
    let env = Env::new();
    env.ingest(
        "error",
        &[error_line("f1", "a"), error_line("f2", "b")].join("\n"),
    );
    let output = env
        .cmd()
        .args(["groups", "error", "list", "--format", "text"])
        .output()
        .expect("list should not crash");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(stdout.lines().count(), 2);
    assert!(stdout.lines().all(|l| l.contains("src/app.php:12")));
}
