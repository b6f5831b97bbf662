//! Smoke tests -- verify the binary runs and the offline subcommands work.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn netgauge(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("netgauge").unwrap();
    cmd.env("NETGAUGE_HOME", home.path())
        .env_remove("NETGAUGE_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("netgauge")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("speed tests"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("netgauge")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("netgauge"));
}

#[test]
fn test_subcommands_exist() {
    for sub in [
        vec!["run", "--help"],
        vec!["history", "--help"],
        vec!["chart", "--help"],
        vec!["export", "--help"],
        vec!["network-info", "--help"],
        vec!["settings", "set", "--help"],
    ] {
        Command::cargo_bin("netgauge")
            .unwrap()
            .args(&sub)
            .assert()
            .success();
    }
}

#[test]
fn test_history_without_file() {
    let home = TempDir::new().unwrap();
    netgauge(&home)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No history available."));
}

#[test]
fn test_history_table_and_export() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("history.json"),
        r#"[
    {"timestamp": "2024-04-01 12:00:00", "download_speed": 100.0, "upload_speed": 10.0, "ping": 20.0},
    {"download_speed": 50.5, "upload_speed": 5.25, "ping": 30.0}
]"#,
    )
    .unwrap();

    netgauge(&home)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-04-01 12:00:00"))
        .stdout(predicate::str::contains("N/A"))
        .stdout(predicate::str::contains("2 tests"));

    netgauge(&home)
        .arg("chart")
        .assert()
        .success()
        .stdout(predicate::str::contains("Test 2"));

    let out = home.path().join("results.csv");
    netgauge(&home)
        .args(["export", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2 result(s)"));
    let csv = std::fs::read_to_string(&out).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.starts_with("#,Timestamp,Download (Mbps),Upload (Mbps),Ping (ms)"));
}

#[test]
fn test_settings_set_and_show() {
    let home = TempDir::new().unwrap();
    netgauge(&home)
        .args(["settings", "set", "dark_mode", "true"])
        .assert()
        .success();

    assert!(home.path().join("settings.toml").exists());
    netgauge(&home)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dark_mode = true"));

    netgauge(&home)
        .args(["settings", "set", "volume", "11"])
        .assert()
        .failure();
}

#[test]
fn test_settings_path_honours_env() {
    let home = TempDir::new().unwrap();
    let custom = home.path().join("custom.toml");
    Command::cargo_bin("netgauge")
        .unwrap()
        .env("NETGAUGE_HOME", home.path())
        .env("NETGAUGE_CONFIG", &custom)
        .args(["settings", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_network_info_json() {
    let home = TempDir::new().unwrap();
    netgauge(&home)
        .args(["network-info", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("computer_name"));
}

#[test]
fn test_unreadable_settings_are_not_overwritten() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("settings.toml");
    let broken = "auto_save_results = false\n\n[history]\non_corruption = \"fail\"\n\n[logging\nlevel = \"debug\"\n";
    std::fs::write(&path, broken).unwrap();

    netgauge(&home)
        .args(["settings", "set", "dark_mode", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not overwriting"));

    assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);
}
