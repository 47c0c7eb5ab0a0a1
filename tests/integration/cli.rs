//! Integration tests for the `kvtrace` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use super::common::fixtures::{write_trace, TWO_REQUEST_TRACE};
use super::common::simulator::{spawn_stub_simulator, unreachable_url};

/// Command with an isolated data directory
fn kvtrace_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kvtrace").expect("binary should build");
    cmd.env("KVTRACE_DATA_DIR", data_dir.path())
        .env_remove("KVTRACE_SIMULATOR_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_mentions_subcommands() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let out = kvtrace_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let help = String::from_utf8(out).expect("utf8 help");
    for needle in ["inspect", "play", "simulate", "health", "--data-dir"] {
        assert!(help.contains(needle), "help missing `{needle}`");
    }
}

/// Inspecting without --step shows the last step, here a cache hit
#[test]
fn test_inspect_defaults_to_last_step() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "trace.json", TWO_REQUEST_TRACE);

    kvtrace_cmd(&dir)
        .arg("inspect")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("== Step 10 / 10 (request 2) =="))
        .stdout(predicate::str::contains("Token 0 is already cached"))
        .stdout(predicate::str::contains("KV reused from Page 0 (no recompute)"))
        .stdout(predicate::str::contains("2/4 \u{2022} ref=2  shared"))
        .stdout(predicate::str::contains("Total requests: 2"))
        .stdout(predicate::str::contains("Page size: 4"));
}

#[test]
fn test_inspect_at_step() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "trace.json", TWO_REQUEST_TRACE);

    kvtrace_cmd(&dir)
        .args(["inspect", "--step", "3"])
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("== Step 3 / 10 (request 1) =="))
        .stdout(predicate::str::contains("Page 0  [*...] 1/4"))
        .stdout(predicate::str::contains("Token 0 \u{2192} Page 0, Slot 0"))
        .stdout(predicate::str::contains("KV reused").not());
}

/// Steps past the end clamp to the last event
#[test]
fn test_inspect_clamps_step() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "trace.json", TWO_REQUEST_TRACE);

    kvtrace_cmd(&dir)
        .args(["inspect", "--step", "500"])
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("== Step 10 / 10"));
}

/// A previous run with the same prompt marks the shared prefix
#[test]
fn test_inspect_marks_prefix_from_previous_run() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "trace.json", TWO_REQUEST_TRACE);
    let prev = write_trace(dir.path(), "prev.json", TWO_REQUEST_TRACE);

    kvtrace_cmd(&dir)
        .arg("inspect")
        .arg(&trace)
        .arg("--prev")
        .arg(&prev)
        .assert()
        .success()
        .stdout(predicate::str::contains("you  [prefix, cache hit]"))
        .stdout(predicate::str::contains("are  [prefix]"));
}

#[test]
fn test_inspect_missing_trace_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    kvtrace_cmd(&dir)
        .args(["inspect", "does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read trace"));
}

#[test]
fn test_inspect_invalid_json_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "bad.json", "{ nope");

    kvtrace_cmd(&dir)
        .arg("inspect")
        .arg(&trace)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid trace JSON"));
}

/// First run writes the example config and the log file under the data dir
#[test]
fn test_first_run_creates_config_and_log() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "trace.json", TWO_REQUEST_TRACE);

    kvtrace_cmd(&dir).arg("inspect").arg(&trace).assert().success();

    assert!(dir.path().join("config.toml").exists());
    assert!(dir.path().join("logs").join("kvtrace.log").exists());
}

/// Config values flow into rendering
#[test]
fn test_config_limits_recent_events() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("config.toml"),
        "[display]\nrecent_events = 1\n",
    )
    .expect("write config");
    let trace = write_trace(dir.path(), "trace.json", TWO_REQUEST_TRACE);

    kvtrace_cmd(&dir)
        .arg("inspect")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("#11"))
        .stdout(predicate::str::contains("#10").not());
}

#[test]
fn test_play_walks_every_step() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "trace.json", TWO_REQUEST_TRACE);

    kvtrace_cmd(&dir)
        .args(["play", "--interval-ms", "0"])
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("[Step 0 / 10]"))
        .stdout(predicate::str::contains("[Step 5 / 10]"))
        .stdout(predicate::str::contains("[Step 10 / 10]"));
}

#[test]
fn test_play_empty_trace_shows_one_frame() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let trace = write_trace(dir.path(), "empty.json", "{}");

    kvtrace_cmd(&dir)
        .args(["play", "--interval-ms", "0"])
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("[Step 0 / 0]"))
        .stdout(predicate::str::contains("No events yet."));
}

#[test]
fn test_simulate_saves_trace() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let out = dir.path().join("runs").join("out.json");

    kvtrace_cmd(&dir)
        .arg("--simulator-url")
        .arg(spawn_stub_simulator())
        .args(["simulate", "you are"])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved 11 events"));

    let saved = kvtrace::SimulationResult::load(&out).expect("saved trace loads");
    assert_eq!(saved.tokens, vec!["you", "are"]);
}

/// Without --out the trace lands in the data dir's traces folder
#[test]
fn test_simulate_defaults_to_traces_dir() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    kvtrace_cmd(&dir)
        .env("KVTRACE_SIMULATOR_URL", spawn_stub_simulator())
        .args(["simulate", "hello world"])
        .assert()
        .success();

    let saved: Vec<_> = std::fs::read_dir(dir.path().join("traces"))
        .expect("traces dir exists")
        .collect();
    assert_eq!(saved.len(), 1);
}

#[test]
fn test_simulate_rejects_blank_prompt() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    kvtrace_cmd(&dir)
        .arg("--simulator-url")
        .arg(unreachable_url())
        .args(["simulate", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please enter a prompt"));
}

#[test]
fn test_health() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    kvtrace_cmd(&dir)
        .arg("--simulator-url")
        .arg(spawn_stub_simulator())
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("is healthy"));

    kvtrace_cmd(&dir)
        .arg("--simulator-url")
        .arg(unreachable_url())
        .arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not reachable"));
}
