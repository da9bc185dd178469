//! Data-quality findings attached to extracted records.
//!
//! Findings never block the migration; they end up on the record's `warnings`
//! so reports and the generator can surface them.

use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

use crate::mapper::terraform::{self, VersionClass};
use crate::source::{Record, SourceGraph};

static ENV_VAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_]+[a-zA-Z0-9_]*$").expect("Invalid regex pattern"));

pub fn is_valid_variable_name(name: &str) -> bool {
    ENV_VAR_NAME.is_match(name)
}

pub fn audit(graph: &mut SourceGraph) {
    info!("Start checking data");

    apply(&mut graph.agent_pools, agent_pool_warnings);
    apply(&mut graph.modules, module_warnings);
    apply(&mut graph.policies, policy_warnings);
    apply(&mut graph.workspaces, workspace_warnings);
    apply(&mut graph.workspace_variables, workspace_variable_warnings);

    info!("Stop checking data");
}

fn apply(records: &mut [Record], check: fn(&Record) -> Vec<String>) {
    for record in records {
        record.warnings = check(record);
    }
}

fn agent_pool_warnings(pool: &Record) -> Vec<String> {
    let mut warnings = Vec::new();
    if pool.attr_i64("agent-count") == Some(0) {
        warnings.push("No agents".to_string());
    }
    warnings
}

fn module_warnings(module: &Record) -> Vec<String> {
    let mut warnings = Vec::new();
    if module.attr_str("status") != Some("setup_complete") {
        warnings.push("Setup incomplete".to_string());
    }
    warnings
}

fn policy_warnings(policy: &Record) -> Vec<String> {
    let mut warnings = Vec::new();
    // Older servers only know Sentinel and do not report a kind at all.
    match policy.attr_str("kind") {
        None | Some("") | Some("sentinel") => warnings.push("Sentinel policy".to_string()),
        Some(_) => {}
    }
    warnings
}

fn workspace_warnings(workspace: &Record) -> Vec<String> {
    let mut warnings = Vec::new();

    if workspace.attr_i64("resource-count") == Some(0) {
        warnings.push("No resources".to_string());
    }

    if workspace.attr("vcs-repo.service-provider").is_none() {
        warnings.push("No VCS configuration".to_string());
    }

    match terraform::classify(workspace.attr_str("terraform-version")) {
        VersionClass::Constraint(_) => {
            warnings.push("BSL Terraform version".to_string());
            warnings.push(
                "Pessimistic version, unable to determine if it's BSL Terraform".to_string(),
            );
        }
        VersionClass::Latest | VersionClass::Unparseable(_) => {
            warnings.push("BSL Terraform version".to_string());
        }
        VersionClass::Exact(version) => {
            if terraform::is_source_licensed(&version) {
                warnings.push("BSL Terraform version".to_string());
            }
        }
    }

    warnings
}

fn workspace_variable_warnings(variable: &Record) -> Vec<String> {
    let mut warnings = Vec::new();
    if !is_valid_variable_name(variable.attr_str("key").unwrap_or_default()) {
        warnings.push("Key is an invalid env var name".to_string());
    }
    warnings
}
