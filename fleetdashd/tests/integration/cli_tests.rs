use std::io::Write;

use crate::common::{assert_contains, run_daemon};

#[test]
fn test_help_lists_flags() {
    crate::test_log!("TEST START: test_help_lists_flags");

    let output = run_daemon(&["--help"], &[]);
    assert!(output.status.success(), "fleetdashd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_contains(&stdout, "operations dashboard API");
    for flag in ["--bind", "--workers-config", "--verbose", "--log-json"] {
        assert_contains(&stdout, flag);
    }
    crate::test_log!("TEST PASS: test_help_lists_flags");
}

#[test]
fn test_version_matches_package() {
    crate::test_log!("TEST START: test_version_matches_package");

    let output = run_daemon(&["--version"], &[]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, env!("CARGO_PKG_VERSION"));
    crate::test_log!("TEST PASS: test_version_matches_package");
}

#[test]
fn test_invalid_environment_is_reported_before_startup() {
    crate::test_log!("TEST START: test_invalid_environment_is_reported_before_startup");

    let output = run_daemon(
        &[],
        &[
            ("FLEETDASH_DB_MAX_CONNECTIONS", "500"),
            ("FLEETDASH_PROBE_TIMEOUT_MS", "soon"),
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "FLEETDASH_DB_MAX_CONNECTIONS");
    assert_contains(&stderr, "FLEETDASH_PROBE_TIMEOUT_MS");
    assert_contains(&stderr, "2 invalid environment variable(s)");
    crate::test_log!("TEST PASS: test_invalid_environment_is_reported_before_startup");
}

#[test]
fn test_bad_worker_roster_fails_startup() {
    crate::test_log!("TEST START: test_bad_worker_roster_fails_startup");

    let mut roster = tempfile::NamedTempFile::new().unwrap();
    writeln!(roster, "[[workers]]\nid = \"orphan\"").unwrap();
    let path = roster.path().to_string_lossy().into_owned();

    let output = run_daemon(&["--workers-config", &path], &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "needs health_url or port");
    crate::test_log!("TEST PASS: test_bad_worker_roster_fails_startup");
}
