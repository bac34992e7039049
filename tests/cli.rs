// tests/cli.rs

use std::io::Write;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::NamedTempFile;

fn dagrun(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dagrun"))
        .args(args)
        .env("DAGRUN_LOG", "warn")
        .output()
        .expect("failed to run dagrun binary")
}

fn json_summary(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not a JSON summary")
}

fn plan(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn inline_actions_succeed_with_json_summary() {
    let out = dagrun(&["sleep:0.01", "noop:done;after=job_1", "--json"]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let summary = json_summary(&out);
    assert_eq!(summary["job_id"], "inline");
    assert_eq!(summary["status"], "succeeded");
    let tasks = summary["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[1]["id"], "job_2");
    assert_eq!(tasks[1]["output"], "done");
    assert_eq!(tasks[1]["attempts"], 1);
}

#[test]
fn exit_code_reflects_overall_status() {
    let partial = dagrun(&["fail", "noop"]);
    assert_eq!(partial.status.code(), Some(1));

    let failed = dagrun(&["fail:boom", "noop;after=job_1", "--format", "json"]);
    assert_eq!(failed.status.code(), Some(2));
    let summary = json_summary(&failed);
    assert_eq!(summary["status"], "failed");
    assert_eq!(summary["tasks"][0]["error"]["kind"], "action");
    assert_eq!(summary["tasks"][1]["status"], "skipped");
    assert_eq!(summary["tasks"][1]["error"]["kind"], "dependency_failed");
}

#[test]
fn flaky_inline_action_retries_until_success() {
    let out = dagrun(&["flaky:fail_until=2", "--json"]);
    assert_eq!(out.status.code(), Some(0));

    let summary = json_summary(&out);
    assert_eq!(summary["tasks"][0]["attempts"], 3);
    let retries = summary["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event"] == "retry_scheduled")
        .count();
    assert_eq!(retries, 2);
}

#[test]
fn invalid_input_exits_64() {
    assert_eq!(dagrun(&["noop;after=ghost"]).status.code(), Some(64));
    assert_eq!(dagrun(&["sleep:soon"]).status.code(), Some(64));
    assert_eq!(dagrun(&[]).status.code(), Some(64));
    assert_eq!(dagrun(&["--plan", "/definitely/not/here.toml"]).status.code(), Some(64));

    let cyclic = plan(
        ".toml",
        r#"
        [[task]]
        id = "a"
        action = "noop"
        after = ["b"]

        [[task]]
        id = "b"
        action = "noop"
        after = ["a"]
        "#,
    );
    let out = dagrun(&["--plan", cyclic.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&out.stderr).contains("cycle"));
}

#[test]
fn plan_file_runs_with_text_summary() {
    let file = plan(
        ".toml",
        r#"
        id = "demo"

        [config]
        concurrency = 2

        [[task]]
        id = "fetch"
        action = "sleep"
        input = { seconds = 0.01 }

        [[task]]
        id = "build"
        action = "noop"
        input = { value = "built" }
        depends_on = ["fetch"]
        "#,
    );

    let out = dagrun(&["--plan", file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("job demo: succeeded"), "{stdout}");
    assert!(stdout.contains("output: \"built\""), "{stdout}");
}

#[test]
fn unknown_plan_action_is_rejected() {
    let file = plan(
        ".json",
        r#"{ "task": [ { "id": "a", "action": "teleport" } ] }"#,
    );
    let out = dagrun(&["--plan", file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&out.stderr).contains("teleport"));
}

#[test]
fn dry_run_prints_the_dag_without_running() {
    let out = dagrun(&["fail;id=a", "noop;id=b;after=a", "--dry-run"]);
    assert_eq!(out.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("dagrun dry-run: job inline"), "{stdout}");
    assert!(stdout.contains("- b [Cooperative]"), "{stdout}");
    assert!(stdout.contains("depends_on: [\"a\"]"), "{stdout}");
}

#[test]
fn isolated_inline_tasks_use_the_worker_pool() {
    let out = dagrun(&["cpu:1000", "crash", "--workers", "1", "--json"]);
    assert_eq!(out.status.code(), Some(1), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let summary = json_summary(&out);
    assert_eq!(summary["tasks"][0]["status"], "succeeded");
    assert_eq!(summary["tasks"][1]["error"]["kind"], "backend_crash");
}
