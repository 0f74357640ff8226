//! E2E journey tests for the `tt` binary.
//!
//! Each test replays a visitor journey through separate `tt` invocations
//! sharing one isolated state directory, the way page loads share a
//! browser profile.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const LANDING: &str = "https://x.com/?utm_source=google&utm_medium=cpc&utm_campaign=spring";

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the `tt` binary with its state in `dir`.
fn tt_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tt"));
    cmd.arg("--state-dir").arg(dir);
    cmd.env("TOUCHTRAIL_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

/// Run `tt` with `--json --dry-run` and parse stdout.
fn tt_json(dir: &Path, args: &[&str]) -> Value {
    let output = tt_cmd(dir)
        .args(args)
        .args(["--json", "--dry-run"])
        .output()
        .expect("tt should not crash");
    assert!(
        output.status.success(),
        "tt {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

fn outcome(report: &Value) -> &str {
    report["outcome"].as_str().expect("outcome field")
}

// ---------------------------------------------------------------------------
// Visits
// ---------------------------------------------------------------------------

#[test]
fn campaign_landing_is_recorded_and_dispatched() {
    let dir = TempDir::new().expect("temp dir");
    let report = tt_json(
        dir.path(),
        &["visit", LANDING, "--referrer", "https://google.com/"],
    );

    assert_eq!(outcome(&report), "recorded");
    assert_eq!(report["attribution"]["utm_source"], "google");
    assert_eq!(report["attribution"]["utm_campaign"], "spring");

    let dispatched = report["dispatched"].as_array().expect("dry run captures");
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0]["route"], "create");
    assert_eq!(dispatched[0]["body"]["utm_source"], "google");
    assert_eq!(dispatched[0]["body"]["is_logged_in"], false);
}

#[test]
fn repeats_and_internal_navigation_are_suppressed() {
    let dir = TempDir::new().expect("temp dir");
    assert_eq!(outcome(&tt_json(dir.path(), &["visit", LANDING])), "recorded");

    let same = tt_json(dir.path(), &["visit", LANDING, "--signal", "replace"]);
    assert_eq!(outcome(&same), "suppressed: same url");
    assert!(same.get("dispatched").is_none());

    let internal = tt_json(
        dir.path(),
        &[
            "visit",
            "https://x.com/pricing",
            "--referrer",
            "https://x.com/",
            "--signal",
            "push",
        ],
    );
    assert_eq!(outcome(&internal), "suppressed: duplicate attribution");

    let log = tt_json(dir.path(), &["log"]);
    assert_eq!(log.as_array().expect("event array").len(), 1);
}

#[test]
fn untracked_signal_is_ignored() {
    let dir = TempDir::new().expect("temp dir");
    tt_json(dir.path(), &["visit", LANDING]);
    let hash = tt_json(dir.path(), &["visit", "https://x.com/#faq", "--signal", "hash"]);
    assert_eq!(outcome(&hash), "ignored");
}

#[test]
fn invalid_url_fails_with_message() {
    let dir = TempDir::new().expect("temp dir");
    tt_cmd(dir.path())
        .args(["visit", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid page URL"));
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[test]
fn signup_sends_create_then_identify_and_stops_tracking() {
    let dir = TempDir::new().expect("temp dir");
    tt_json(dir.path(), &["visit", LANDING]);

    let signup = tt_json(dir.path(), &["signup", "U42", "--url", "https://x.com/signup"]);
    assert_eq!(signup["action"], "signup");
    assert_eq!(signup["logged_in"], true);
    assert_eq!(signup["event"]["event_type"], "signup");
    assert_eq!(signup["event"]["deriv_user_id"], "U42");
    assert_eq!(signup["events_stored"], 2);

    let routes: Vec<&str> = signup["dispatched"]
        .as_array()
        .expect("dry run captures")
        .iter()
        .filter_map(|d| d["route"].as_str())
        .collect();
    assert_eq!(routes, ["create", "identify"]);

    let after = tt_json(dir.path(), &["visit", "https://x.com/?utm_source=bing"]);
    assert_eq!(outcome(&after), "suppressed: signup completed");
}

#[test]
fn blank_account_is_rejected_with_hint() {
    let dir = TempDir::new().expect("temp dir");
    tt_cmd(dir.path())
        .args(["login", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn reconcile_rewrites_open_touchpoint() {
    let dir = TempDir::new().expect("temp dir");
    tt_json(dir.path(), &["visit", LANDING]);

    let report = tt_json(dir.path(), &["reconcile", "--account", "U7"]);
    assert_eq!(report["event"]["is_loggedin"], true);
    assert_eq!(report["event"]["deriv_user_id"], "U7");
    assert_eq!(report["dispatched"][0]["route"], "update");

    let log = tt_json(dir.path(), &["log"]);
    assert_eq!(log[0]["deriv_user_id"], "U7");

    let logout = tt_json(dir.path(), &["logout"]);
    assert_eq!(logout["logged_in"], false);
    assert_eq!(logout["event"]["is_loggedin"], false);
    assert!(logout["event"].get("deriv_user_id").is_none());
}

// ---------------------------------------------------------------------------
// Inspection and maintenance
// ---------------------------------------------------------------------------

#[test]
fn identity_is_stable_and_replaceable() {
    let dir = TempDir::new().expect("temp dir");
    let first = tt_json(dir.path(), &["identity"]);
    let second = tt_json(dir.path(), &["identity"]);
    assert_eq!(first["uuid"], second["uuid"]);

    let replaced = tt_json(dir.path(), &["identity", "--set", "ext-visitor-1"]);
    assert_eq!(replaced["uuid"], "ext-visitor-1");
    assert_eq!(replaced["replaced"], true);

    tt_cmd(dir.path())
        .args(["identity", "--set", "has spaces"])
        .assert()
        .failure();
    assert_eq!(tt_json(dir.path(), &["identity"])["uuid"], "ext-visitor-1");
}

#[test]
fn attribution_and_clear() {
    let dir = TempDir::new().expect("temp dir");
    assert!(tt_json(dir.path(), &["attribution"]).is_null());

    tt_json(dir.path(), &["visit", LANDING]);
    let snapshot = tt_json(dir.path(), &["attribution"]);
    assert_eq!(snapshot["utm_medium"], "cpc");
    assert_eq!(snapshot["landing_page"], LANDING);

    let cleared = tt_json(dir.path(), &["clear", "--all"]);
    assert_eq!(cleared["events_removed"], 1);
    assert_eq!(cleared["attribution_cleared"], true);
    assert!(tt_json(dir.path(), &["attribution"]).is_null());
    assert!(tt_json(dir.path(), &["log"]).as_array().expect("array").is_empty());
}

#[test]
fn inspection_commands_create_no_state() {
    let dir = TempDir::new().expect("temp dir");
    let state = dir.path().join("fresh");
    assert!(tt_json(&state, &["log"]).as_array().expect("array").is_empty());
    assert!(tt_json(&state, &["attribution"]).is_null());
    assert!(!state.exists());
}

#[test]
fn text_log_lists_one_line_per_touchpoint() {
    let dir = TempDir::new().expect("temp dir");
    tt_json(dir.path(), &["visit", LANDING]);
    tt_json(dir.path(), &["visit", "https://x.com/?utm_source=newsletter"]);

    tt_cmd(dir.path())
        .args(["log", "--format", "text", "-n", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("newsletter").and(predicate::str::contains("pageview")))
        .stdout(predicate::str::contains("google").not());
}
