//! ProcessRunner against small shell scripts standing in for the tools.

#![cfg(unix)]

use pcs_driver::command::{CommandArgs, Opt, ProcessRunner, Switch, Tool, ToolRunner};
use pcs_driver::config::ToolPaths;
use pcs_driver::Error;
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Runner whose query tool is `body`; ingest and digest are no-ops.
fn runner_with_query(dir: &TempDir, body: &str, max_output_bytes: usize) -> ProcessRunner {
    let tools = ToolPaths {
        query: script(dir.path(), "query", body),
        ingest: script(dir.path(), "ingest", "cat > /dev/null"),
        digest: script(dir.path(), "digest", "true"),
    };
    ProcessRunner::new(tools, dir.path(), max_output_bytes)
}

async fn wait_for_file(path: &Path) -> String {
    for _ in 0..200 {
        if let Ok(contents) = std::fs::read_to_string(path) {
            return contents;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("{} was never written", path.display());
}

#[tokio::test]
async fn test_run_json_parses_stdout() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, r#"echo '[{"host": "a", "Count": 3}]'"#, 1024);

    let out = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap();
    assert_eq!(out, json!([{"host": "a", "Count": 3}]));
}

#[tokio::test]
async fn test_arguments_are_passed_without_a_shell() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, r#"printf '{"argc": %d, "filter": "%s"}' "$#" "$3""#, 1024);

    let args = CommandArgs::new()
        .switch(Switch::Laq)
        .opt(Opt::StrFilter, "host:eq:a b;echo x");
    let out = runner.run_json(Tool::Query, &args).await.unwrap();

    assert_eq!(out, json!({"argc": 3, "filter": "host:eq:a b;echo x"}));
}

#[tokio::test]
async fn test_runs_in_work_dir() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, r#"printf '"%s"' "$(pwd -P)""#, 4096);

    let out = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(out, json!(expected.to_string_lossy()));
}

#[tokio::test]
async fn test_invalid_output_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, "echo 'not json'", 1024);

    let err = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert!(err.to_string().starts_with("Error parsing JSON"));
}

#[tokio::test]
async fn test_empty_output_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, "true", 1024);

    let err = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[tokio::test]
async fn test_failed_exit_with_valid_output_succeeds() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, "echo '[1, 2]'; echo 'warning: slow' >&2; exit 3", 1024);

    let out = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap();
    assert_eq!(out, json!([1, 2]));
}

#[tokio::test]
async fn test_output_over_limit_kills_the_tool() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, "exec yes", 64);

    let err = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap_err();
    assert!(matches!(err, Error::OutputLimit { limit: 64 }));
}

#[tokio::test]
async fn test_output_at_limit_is_accepted() {
    let dir = TempDir::new().unwrap();
    let runner = runner_with_query(&dir, "printf '[1]'", 3);

    let out = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap();
    assert_eq!(out, json!([1]));
}

#[tokio::test]
async fn test_missing_tool_is_io_error() {
    let dir = TempDir::new().unwrap();
    let tools = ToolPaths::in_dir(dir.path().join("nowhere"));
    let runner = ProcessRunner::new(tools, dir.path(), 1024);

    let err = runner.run_json(Tool::Query, &CommandArgs::new()).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
async fn test_stream_records_writes_ndjson_to_stdin() {
    let dir = TempDir::new().unwrap();
    let tools = ToolPaths {
        query: script(dir.path(), "query", "true"),
        ingest: script(
            dir.path(),
            "ingest",
            r#"cat > records.tmp && echo "$2" > table.txt && mv records.tmp records.ndjson"#,
        ),
        digest: script(dir.path(), "digest", "true"),
    };
    let runner = ProcessRunner::new(tools, dir.path(), 1024);
    let records = vec![json!({"host": "a", "time": 1}), json!({"host": "b", "time": 2})];

    runner
        .stream_records(
            Tool::Ingest,
            &CommandArgs::new().opt(Opt::Table, "ds.sub"),
            &records,
        )
        .await
        .unwrap();

    let written = wait_for_file(&dir.path().join("records.ndjson")).await;
    let lines: Vec<serde_json::Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines, records);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("table.txt")).unwrap().trim(),
        "ds.sub"
    );
}

#[tokio::test]
async fn test_launch_returns_before_the_tool_finishes() {
    let dir = TempDir::new().unwrap();
    let tools = ToolPaths {
        query: script(dir.path(), "query", "true"),
        ingest: script(dir.path(), "ingest", "true"),
        digest: script(dir.path(), "digest", r#"sleep 0.2; echo "$2" > digested.tmp && mv digested.tmp digested.txt"#),
    };
    let runner = ProcessRunner::new(tools, dir.path(), 1024);

    runner
        .launch(Tool::Digest, &CommandArgs::new().opt(Opt::Table, "ds.sub"))
        .await
        .unwrap();
    assert!(!dir.path().join("digested.txt").exists());

    let digested = wait_for_file(&dir.path().join("digested.txt")).await;
    assert_eq!(digested.trim(), "ds.sub");
}
