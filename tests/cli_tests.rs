//! Integration tests for the CLI interface

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use stackport::testing::fixtures;

fn stackport() -> Command {
    let mut cmd = Command::cargo_bin("stackport").unwrap();
    cmd.env_remove("STACKPORT_API_TOKEN")
        .env_remove("STACKPORT_API_ENDPOINT")
        .env_remove("STACKPORT_AUTO_FIX_VARIABLE_NAMES")
        .env_remove("STACKPORT_VARIABLE_SETS");
    cmd
}

#[test]
fn test_cli_help_flag() {
    stackport()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("map"));
}

#[test]
fn test_invalid_command() {
    stackport()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_missing_config_file_exits_with_config_code() {
    let temp_dir = TempDir::new().unwrap();
    stackport()
        .arg("export")
        .arg("-c")
        .arg(temp_dir.path().join("missing.toml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_export_without_token_exits_with_config_code() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("stackport.toml");
    std::fs::write(&config, "[source]\napi_endpoint = \"https://tfe.example.com\"\n").unwrap();

    stackport()
        .arg("export")
        .arg("-c")
        .arg(&config)
        .assert()
        .code(2);
}

#[test]
fn test_map_writes_data_file_offline() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source.json");
    std::fs::write(
        &source,
        serde_json::to_string_pretty(&fixtures::sample_graph()).unwrap(),
    )
    .unwrap();
    let config = temp_dir.path().join("stackport.toml");
    std::fs::write(&config, "[mapping]\nauto_fix_variable_names = true\n").unwrap();
    let out = temp_dir.path().join("out");

    stackport()
        .arg("map")
        .arg(&source)
        .arg("-c")
        .arg(&config)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("data.json"));

    let data: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("data.json")).unwrap()).unwrap();
    assert_eq!(data["stacks"][0]["_migration_id"], "networking");
    assert_eq!(data["stack_variables"][1]["replacement_name"], "region_name");
}

#[test]
fn test_map_with_unreadable_source_fails() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source.json");
    std::fs::write(&source, "not json").unwrap();
    let config = temp_dir.path().join("stackport.toml");
    std::fs::write(&config, "").unwrap();

    stackport()
        .arg("map")
        .arg(&source)
        .arg("-c")
        .arg(&config)
        .arg("-o")
        .arg(temp_dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}
