mod common;

use std::process::{Command, Output};

use common::FakeDesk;
use serde_json::Value;

fn run_cli(args: &[&str], api_url: Option<&str>) -> Output {
    let exe = env!("CARGO_BIN_EXE_docdesk");
    let mut command = Command::new(exe);
    command.args(args).env("RUST_LOG", "off");
    match api_url {
        Some(url) => command.env("DOCDESK_API_URL", url),
        None => command.env_remove("DOCDESK_API_URL"),
    };
    command.output().expect("docdesk should execute")
}

async fn run_cli_async(args: Vec<String>, api_url: String) -> Output {
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_cli(&args, Some(&api_url))
    })
    .await
    .unwrap()
}

#[test]
fn help_lists_subcommands() {
    let output = run_cli(&["--help"], None);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["tree", "ls", "mkdir", "upload", "select", "config"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn config_outputs_json_with_env_url() {
    let output = run_cli(&["config"], Some("http://desk.test/api/"));
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(json["api_url"], "http://desk.test/api/");
    assert_eq!(json["page_size"], 100);
    assert!(json.get("token_configured").is_some());
}

#[test]
fn api_url_flag_overrides_env() {
    let output = run_cli(
        &["--api-url", "http://flag.test/", "config"],
        Some("http://env.test/"),
    );
    let json: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(json["api_url"], "http://flag.test/");
}

#[test]
fn invalid_location_is_rejected() {
    let output = run_cli(&["ls", "not-a-folder"], None);
    assert!(!output.status.success());
}

#[tokio::test]
async fn mkdir_creates_missing_path_segments() {
    let (desk, server) = FakeDesk::start().await;
    let reports = desk.seed_folder("Reports", None);

    let output = run_cli_async(vec!["mkdir".into(), "Reports/2024/Q1".into()], server.uri()).await;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(desk.creates(), 2);
    let year = desk.folder_id("2024", Some(reports)).unwrap();
    let quarter = desk.folder_id("Q1", Some(year)).unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&quarter.to_string()));
}

#[tokio::test]
async fn upload_sends_scanned_directory() {
    let (desk, server) = FakeDesk::start().await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("scans");
    std::fs::create_dir_all(root.join("2024")).unwrap();
    std::fs::write(root.join("2024/a.pdf"), b"%PDF").unwrap();
    std::fs::write(root.join("b.png"), b"png").unwrap();
    std::fs::write(root.join("readme.txt"), b"skip").unwrap();

    let output = run_cli_async(
        vec!["upload".into(), root.to_string_lossy().into_owned()],
        server.uri(),
    )
    .await;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 uploaded, 0 skipped, 0 failed, 1 unsupported"));
    assert_eq!(desk.creates(), 2);
    assert_eq!(desk.uploads().len(), 2);
}

#[tokio::test]
async fn tree_search_prints_matching_branch() {
    let (desk, server) = FakeDesk::start().await;
    let contracts = desk.seed_folder("Contracts", None);
    desk.seed_folder("Signed", Some(contracts));
    desk.seed_folder("Scans", None);

    let output = run_cli_async(
        vec!["tree".into(), "--search".into(), "sign".into()],
        server.uri(),
    )
    .await;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Contracts"));
    assert!(stdout.contains("Signed"));
    assert!(!stdout.contains("Scans"));
}
