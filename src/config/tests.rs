use super::*;
use crate::error::Error;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
    let path = dir.path().join(filename);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();

    assert_eq!(settings.source.api_endpoint, "https://app.terraform.io");
    assert_eq!(settings.source.request_timeout_secs, 60);
    assert!(settings.enrichment.enabled);
    assert_eq!(settings.enrichment.agent_start_attempts, 10);
    assert_eq!(settings.enrichment.plan_poll_interval(), Duration::from_secs(3));
    assert!(settings.enrichment.log_dir.ends_with("stackport/plan-logs"));
    assert!(!settings.mapping.auto_fix_variable_names);
    assert!(!settings.mapping.experimental_support_variable_sets);
}

#[test]
fn test_parse_toml() {
    let content = r#"
[source]
api_endpoint = "https://tfe.example.com"
api_token = "abc"

[include]
workspaces = "^prod-"
teams = "none"
projects = ["Platform", "Data"]

[mapping]
auto_fix_variable_names = true
"#;
    let settings = ConfigLoader::parse(Path::new("config.toml"), content).unwrap();

    assert_eq!(settings.source.api_endpoint, "https://tfe.example.com");
    assert_eq!(
        settings.include.workspaces,
        Some(NameFilter::Pattern("^prod-".into()))
    );
    assert!(settings.include.teams.as_ref().unwrap().is_skip());
    assert_eq!(
        settings.include.projects,
        Some(NameFilter::Names(vec!["Platform".into(), "Data".into()]))
    );
    assert!(settings.mapping.auto_fix_variable_names);
    assert_eq!(settings.enrichment.agent_start_attempts, 10);
}

#[test]
fn test_parse_yaml() {
    let content = r#"
source:
  api_token: abc
enrichment:
  enabled: false
  plan_poll_interval_secs: 1
"#;
    let settings = ConfigLoader::parse(Path::new("config.yaml"), content).unwrap();

    assert_eq!(settings.source.api_token, "abc");
    assert!(!settings.enrichment.enabled);
    assert_eq!(settings.enrichment.plan_poll_interval_secs, 1);
}

#[test]
fn test_env_overlay_wins_over_file() {
    let mut settings = Settings::default();
    settings.source.api_token = "from-file".to_string();

    let env: HashMap<&str, &str> = [
        ("STACKPORT_API_TOKEN", "from-env"),
        ("STACKPORT_AUTO_FIX_VARIABLE_NAMES", "true"),
        ("STACKPORT_VARIABLE_SETS", "not-a-bool"),
    ]
    .into_iter()
    .collect();
    settings.merge_env_from(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.source.api_token, "from-env");
    assert!(settings.mapping.auto_fix_variable_names);
    assert!(!settings.mapping.experimental_support_variable_sets);
}

#[test]
fn test_debug_output_redacts_token() {
    let mut settings = Settings::default();
    settings.source.api_token = "super-secret-token".to_string();

    let rendered = format!("{settings:?}");
    assert!(!rendered.contains("super-secret-token"));
    assert!(rendered.contains("[REDACTED]"));
}

#[test]
fn test_validation_rejects_missing_token() {
    let settings = Settings::default();
    assert!(matches!(
        ConfigValidator::validate(&settings),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_validation_rejects_skipping_organizations() {
    let mut settings = Settings::default();
    settings.source.api_token = "abc".to_string();
    settings.include.organizations = Some(NameFilter::Pattern("none".into()));

    let err = ConfigValidator::validate(&settings).unwrap_err();
    assert!(err.to_string().contains("include.organizations"));
}

#[test]
fn test_validation_rejects_empty_organization_list() {
    let mut settings = Settings::default();
    settings.source.api_token = "abc".to_string();
    settings.include.organizations = Some(NameFilter::Names(Vec::new()));

    let err = ConfigValidator::validate(&settings).unwrap_err();
    assert!(err.to_string().contains("include.organizations"));
}

#[test]
fn test_validation_rejects_bad_pattern() {
    let mut settings = Settings::default();
    settings.source.api_token = "abc".to_string();
    settings.include.modules = Some(NameFilter::Pattern("[".into()));

    let err = ConfigValidator::validate(&settings).unwrap_err();
    assert!(err.to_string().contains("include.modules"));
}

#[test]
fn test_validation_rejects_zero_agent_attempts() {
    let mut settings = Settings::default();
    settings.source.api_token = "abc".to_string();
    settings.enrichment.agent_start_attempts = 0;

    assert!(ConfigValidator::validate(&settings).is_err());
}

#[tokio::test]
async fn test_loader_reports_missing_explicit_file() {
    let loader = ConfigLoader::new(Some(PathBuf::from("/nonexistent/stackport.toml")));
    let err = loader.load().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_loader_offline_does_not_require_token() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.toml", "[mapping]\nauto_fix_variable_names = true\n");

    let settings = ConfigLoader::new(Some(path)).load_offline().await.unwrap();
    assert!(settings.mapping.auto_fix_variable_names);
}
