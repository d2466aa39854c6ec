use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn shelf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("shelf");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/shelf.sqlite"

[calendar]
start = "2026-01-01"
end = "2026-12-31"
"#,
        root.display()
    );

    let config_path = config_dir.join("shelf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_shelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = shelf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shelf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// init + default GBP->USD/EUR rates effective 2026-01-01.
fn init_with_rates(config_path: &Path) {
    let (stdout, stderr, success) = run_shelf(config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    for (to, rate) in [("USD", "1.27"), ("EUR", "1.17")] {
        let (stdout, stderr, success) = run_shelf(
            config_path,
            &[
                "rates", "add", "--from", "GBP", "--to", to, "--rate", rate, "--effective",
                "2026-01-01",
            ],
        );
        assert!(success, "rates add failed: stdout={}, stderr={}", stdout, stderr);
    }
}

fn write_snapshot(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_shelf(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_shelf(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_shelf(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_rates_list_shows_added_rate() {
    let (_tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let (stdout, stderr, success) = run_shelf(&config_path, &["rates", "list"]);
    assert!(success, "rates list failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("USD"));
    assert!(stdout.contains("1.27"));
    assert!(stdout.contains("2026-01-01"));
}

#[test]
fn test_first_batch_adds_books() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let snapshot = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    let (stdout, stderr, success) = run_shelf(
        &config_path,
        &[
            "ingest",
            snapshot.to_str().unwrap(),
            "--date",
            "2026-01-01",
            "--batch-id",
            "b1",
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("new books: 1"));
    assert!(stdout.contains("removed books: 0"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_shelf(&config_path, &["summary", "--date", "2026-01-01"]);
    assert!(success);
    assert!(stdout.contains("books scraped:     1"));
    assert!(stdout.contains("in stock:          1"));
}

#[test]
fn test_price_change_scenario() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    let b2 = write_snapshot(
        tmp.path(),
        "b2.json",
        r#"[{"title": "Alpha", "price": "£12.50", "availability": "In stock"}]"#,
    );

    run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2026-01-01", "--batch-id", "b1"],
    );
    let (stdout, stderr, success) = run_shelf(
        &config_path,
        &["ingest", b2.to_str().unwrap(), "--date", "2026-01-02", "--batch-id", "b2"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("price changes: 1"));
    assert!(stdout.contains("new books: 0"));

    // Old version closed the day before, new one current.
    let (stdout, _, success) = run_shelf(&config_path, &["history", "Alpha"]);
    assert!(success);
    assert!(stdout.contains("2026-01-01"));
    assert!(stdout.contains("current"));
    assert!(stdout.contains("PRICE_CHANGE"));
    assert!(stdout.contains("£12.50"));

    let (stdout, _, success) =
        run_shelf(&config_path, &["events", "--type", "price_change"]);
    assert!(success);
    assert!(stdout.contains("PRICE_CHANGE"));
    assert!(stdout.contains("25.00"));
}

#[test]
fn test_empty_batch_removes_books() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    let b3 = write_snapshot(tmp.path(), "b3.json", "[]");

    run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2026-01-01", "--batch-id", "b1"],
    );
    let (stdout, stderr, success) = run_shelf(
        &config_path,
        &["ingest", b3.to_str().unwrap(), "--date", "2026-01-03", "--batch-id", "b3"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("removed books: 1"));

    let (stdout, _, success) = run_shelf(&config_path, &["summary", "--date", "2026-01-03"]);
    assert!(success);
    assert!(stdout.contains("books scraped:     0"));
    assert!(stdout.contains("in stock:          0"));

    let (stdout, _, _) = run_shelf(&config_path, &["events", "--type", "removed"]);
    assert!(stdout.contains("REMOVED"));
}

#[test]
fn test_duplicate_batch_is_noop() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2026-01-01", "--batch-id", "b1"],
    );
    let (stdout, stderr, success) = run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2026-01-01", "--batch-id", "b1"],
    );
    assert!(success, "reingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("already processed"));

    // Still exactly one version and one event.
    let (stdout, _, _) = run_shelf(&config_path, &["history", "Alpha"]);
    assert_eq!(stdout.matches("NEW").count(), 1);
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    let (stdout, stderr, success) = run_shelf(
        &config_path,
        &[
            "ingest",
            b1.to_str().unwrap(),
            "--date",
            "2026-01-01",
            "--batch-id",
            "b1",
            "--dry-run",
        ],
    );
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("new books: 1"));
    assert!(stdout.contains("no changes written"));

    let (stdout, _, _) = run_shelf(&config_path, &["summary", "--date", "2026-01-01"]);
    assert!(stdout.contains("no summary"));
    let (stdout, _, _) = run_shelf(&config_path, &["history", "Alpha"]);
    assert!(stdout.contains("no history"));
}

#[test]
fn test_missing_rate_fails_batch() {
    let (tmp, config_path) = setup_test_env();
    // init but no rates
    let (_, _, success) = run_shelf(&config_path, &["init"]);
    assert!(success);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    let (stdout, stderr, success) = run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2026-01-01", "--batch-id", "b1"],
    );
    assert!(!success, "expected failure, got: {}", stdout);
    assert!(stderr.contains("no exchange rate"), "stderr was: {}", stderr);

    // Nothing was written.
    let (stdout, _, _) = run_shelf(&config_path, &["history", "Alpha"]);
    assert!(stdout.contains("no history"));
}

#[test]
fn test_date_outside_calendar_fails() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    let (_, stderr, success) = run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2031-06-01", "--batch-id", "b1"],
    );
    assert!(!success);
    assert!(stderr.contains("dim_date"), "stderr was: {}", stderr);
}

#[test]
fn test_json_output() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"},
            {"title": "Beta", "price": "bogus", "availability": "In stock"}]"#,
    );
    let (stdout, stderr, success) = run_shelf(
        &config_path,
        &[
            "ingest",
            b1.to_str().unwrap(),
            "--date",
            "2026-01-01",
            "--batch-id",
            "b1",
            "--json",
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);

    // The warning line precedes the JSON document.
    let json_start = stdout.find('{').expect("no JSON in output");
    let report: serde_json::Value = serde_json::from_str(&stdout[json_start..]).unwrap();
    assert_eq!(report["status"], "ok");
    assert_eq!(report["batch_id"], "b1");
    assert_eq!(report["added"], 1);
    assert_eq!(report["records_read"], 2);
    assert_eq!(report["records_skipped"], 1);
}

#[test]
fn test_stock_and_price_change_logs_two_events() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    let b2 = write_snapshot(
        tmp.path(),
        "b2.json",
        r#"[{"title": "Alpha", "price": "£12.00", "availability": "Out of stock"}]"#,
    );

    run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2026-01-01", "--batch-id", "b1"],
    );
    let (stdout, _, success) = run_shelf(
        &config_path,
        &["ingest", b2.to_str().unwrap(), "--date", "2026-01-02", "--batch-id", "b2"],
    );
    assert!(success);
    assert!(stdout.contains("price changes: 1"));
    assert!(stdout.contains("stock changes: 1"));

    let (stdout, _, _) = run_shelf(&config_path, &["events", "--date", "2026-01-02"]);
    assert!(stdout.contains("PRICE_CHANGE"));
    assert!(stdout.contains("STOCK_CHANGE"));

    // One version row for the compound change, tagged BOTH.
    let (stdout, _, _) = run_shelf(&config_path, &["history", "Alpha"]);
    assert!(stdout.contains("BOTH"));
}

#[test]
fn test_stats_overview() {
    let (tmp, config_path) = setup_test_env();
    init_with_rates(&config_path);

    let b1 = write_snapshot(
        tmp.path(),
        "b1.json",
        r#"[{"title": "Alpha", "price": "£10.00", "availability": "In stock"}]"#,
    );
    run_shelf(
        &config_path,
        &["ingest", b1.to_str().unwrap(), "--date", "2026-01-01", "--batch-id", "b1"],
    );

    let (stdout, stderr, success) = run_shelf(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Versions:        1 (1 current)"));
    assert!(stdout.contains("Batches:         1"));
    assert!(stdout.contains("Last batch:      b1"));
}
