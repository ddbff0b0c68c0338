use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn divelog_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("divelog");
    path
}

fn sample_dives() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data/sample_dives.json")
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/divelog.sqlite"

[retrieval]
mode = "keyword"
top_k = 5
"#,
        root.display()
    );

    let config_path = config_dir.join("divelog.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_divelog(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = divelog_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .current_dir(config_path.parent().unwrap())
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run divelog binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn populated_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    run_divelog(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_divelog(&config_path, &["populate", sample_dives().to_str().unwrap()]);
    assert!(success, "populate failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_divelog(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_divelog(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_divelog(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_populate_reports_counts_and_smoke_search() {
    let (_tmp, config_path) = setup_test_env();
    run_divelog(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_divelog(&config_path, &["populate", sample_dives().to_str().unwrap()]);
    assert!(success, "populate failed: {}", stderr);
    assert!(stdout.contains("Inserting 12 dive log records"));
    assert!(stdout.contains("Success: 12"));
    assert!(stdout.contains("Errors: 0"));
    assert!(stdout.contains("Smoke test search"));
    assert!(!stdout.contains("(no results)"), "got: {}", stdout);
}

#[test]
fn test_populate_skips_invalid_records() {
    let (tmp, config_path) = setup_test_env();
    run_divelog(&config_path, &["init"]);

    let file = tmp.path().join("mixed.json");
    fs::write(
        &file,
        r#"[
  {"site": "Sail Rock", "narrative": "Chimney swim-through", "depth_max": 22,
   "length_minutes": 50, "dive_type": "recreational"},
  {"site": "Nowhere", "narrative": "Missing depth", "length_minutes": 30,
   "dive_type": "recreational"}
]"#,
    )
    .unwrap();

    let (stdout, _, success) = run_divelog(&config_path, &["populate", file.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Success: 1"));
    assert!(stdout.contains("Errors: 1"));
    assert!(stdout.contains("Error inserting dive log 2"));
}

#[test]
fn test_populate_missing_file_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope.json");
    let (_, _, success) = run_divelog(&config_path, &["populate", missing.to_str().unwrap()]);
    assert!(!success);
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = populated_env();

    let (stdout, stderr, success) = run_divelog(&config_path, &["search", "manta rays"]);
    assert!(success, "search failed: {}", stderr);
    assert!(
        stdout.contains("German Channel") || stdout.contains("Manta Point"),
        "Expected a manta dive in results, got: {}",
        stdout
    );
    assert!(!stdout.contains("Chandelier Cave"));
}

#[test]
fn test_search_with_filters() {
    let (_tmp, config_path) = populated_env();

    let (stdout, _, success) = run_divelog(
        &config_path,
        &["search", "", "--location", "Red Sea", "--dive-type", "wreck"],
    );
    assert!(success);
    assert!(stdout.contains("SS Thistlegorm"));
    assert!(stdout.contains("Cargo Wreck"));
    assert!(!stdout.contains("Shark Reef"));
    assert!(!stdout.contains("Zenobia"));
}

#[test]
fn test_search_depth_bounds() {
    let (_tmp, config_path) = populated_env();

    let (stdout, _, success) = run_divelog(&config_path, &["search", "", "--min-depth", "40"]);
    assert!(success);
    assert!(stdout.contains("Zenobia"));
    assert!(!stdout.contains("Thistlegorm"));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = populated_env();

    let (stdout1, _, _) = run_divelog(&config_path, &["search", "wreck visibility"]);
    let (stdout2, _, _) = run_divelog(&config_path, &["search", "wreck visibility"]);
    assert_eq!(stdout1, stdout2, "Search results are not deterministic");
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = populated_env();

    let (stdout, _, success) = run_divelog(&config_path, &["search", "xyzzyplugh"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_dives_lists_all_with_summary() {
    let (_tmp, config_path) = populated_env();

    let (stdout, _, success) = run_divelog(&config_path, &["dives"]);
    assert!(success);
    assert!(stdout.contains("deepest: Zenobia (42m)"));
    // most recent first
    let zenobia = stdout.find("Zenobia").unwrap();
    let sail_rock = stdout.find("Ko Tao Sail Rock").unwrap();
    assert!(zenobia < sail_rock);
}

#[test]
fn test_get_unknown_dive_fails() {
    let (_tmp, config_path) = populated_env();

    let (_, stderr, success) = run_divelog(&config_path, &["get", "no-such-id"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_get_by_id_from_listing() {
    let (_tmp, config_path) = populated_env();

    let (stdout, _, _) = run_divelog(&config_path, &["search", "Thistlegorm"]);
    let id = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id: "))
        .expect("search output carries an id")
        .to_string();

    let (stdout, _, success) = run_divelog(&config_path, &["get", &id]);
    assert!(success);
    assert!(stdout.contains("SS Thistlegorm"));
    assert!(stdout.contains("--- Narrative ---"));
    assert!(stdout.contains("motorbikes"));
}

#[test]
fn test_preferences_persist_between_runs() {
    let (_tmp, config_path) = setup_test_env();
    run_divelog(&config_path, &["init"]);

    let (stdout, _, _) = run_divelog(&config_path, &["pref", "get", "depth_unit"]);
    assert!(stdout.contains("depth_unit is not set"));

    let (_, _, success) = run_divelog(&config_path, &["pref", "set", "depth_unit", "feet"]);
    assert!(success);

    let (stdout, _, _) = run_divelog(&config_path, &["pref", "get", "depth_unit"]);
    assert!(stdout.contains("depth_unit = feet"));

    let (stdout, _, _) = run_divelog(&config_path, &["pref", "list"]);
    assert!(stdout.contains("depth_unit"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = populated_env();

    let (stdout, _, success) = run_divelog(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Dives:       12"));
    assert!(stdout.contains("By country:"));
    assert!(stdout.contains("Egypt"));
}

#[test]
fn test_tools_prints_definitions_without_config() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing.toml");

    let (stdout, _, success) = run_divelog(&missing, &["tools"]);
    assert!(success);
    let defs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let names: Vec<&str> = defs
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["function"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "search_dive_logs",
            "get_all_dives",
            "get_dive_log",
            "create_dive_log",
            "get_user_preference",
            "save_user_preference",
        ]
    );
}

#[test]
fn test_chat_without_api_key_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_divelog(&config_path, &["chat"]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"));
}

#[test]
fn test_chat_reads_api_key_from_dotenv() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(
        config_path.parent().unwrap().join(".env"),
        "OPENAI_API_KEY=sk-from-dotenv\n",
    )
    .unwrap();

    // stdin is closed, so the loop ends without calling the model
    let (stdout, stderr, success) = run_divelog(&config_path, &["chat"]);
    assert!(success, "chat failed: stdout={}, stderr={}", stdout, stderr);
    assert!(!stderr.contains("OPENAI_API_KEY"));
    assert!(stdout.contains(divelog::chat::FAREWELL));
}

#[test]
fn test_unwritable_db_path_fails_with_storage_error() {
    let (tmp, config_path) = setup_test_env();
    // a regular file where the database directory should be
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    fs::write(
        &config_path,
        format!("[db]\npath = \"{}/divelog.sqlite\"\n", blocker.display()),
    )
    .unwrap();

    let (_, stderr, success) = run_divelog(&config_path, &["init"]);
    assert!(!success);
    assert!(
        stderr.contains("storage unavailable"),
        "unexpected stderr: {}",
        stderr
    );

    let (_, _, success) = run_divelog(&config_path, &["dives"]);
    assert!(!success);
}
