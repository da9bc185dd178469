use directories::ProjectDirs;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub mod filter;
pub mod loader;
pub mod validator;

pub use filter::{NameFilter, Selection};
pub use loader::ConfigLoader;
pub use validator::ConfigValidator;

/// Location of the user-level configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "stackport", "stackport").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn work_root() -> PathBuf {
    std::env::temp_dir().join("stackport")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceConfig,
    pub include: IncludeConfig,
    pub enrichment: EnrichmentConfig,
    pub mapping: MappingConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_endpoint: String,
    pub api_token: String,
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://app.terraform.io".to_string(),
            api_token: String::new(),
            request_timeout_secs: 60,
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("api_token", &"[REDACTED]")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Per-kind name filters. Absent means "everything".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncludeConfig {
    pub organizations: Option<NameFilter>,
    pub agent_pools: Option<NameFilter>,
    pub modules: Option<NameFilter>,
    pub policies: Option<NameFilter>,
    pub policy_sets: Option<NameFilter>,
    pub projects: Option<NameFilter>,
    pub providers: Option<NameFilter>,
    pub tasks: Option<NameFilter>,
    pub teams: Option<NameFilter>,
    pub variable_sets: Option<NameFilter>,
    pub variable_set_variables: Option<NameFilter>,
    pub workspaces: Option<NameFilter>,
    pub workspace_variables: Option<NameFilter>,
    /// Newline-separated workspace names; wins over `workspaces`.
    pub workspace_list: Option<PathBuf>,
}

impl IncludeConfig {
    /// Every configured filter with the name of its key.
    pub fn entries(&self) -> Vec<(&'static str, Option<&NameFilter>)> {
        vec![
            ("organizations", self.organizations.as_ref()),
            ("agent_pools", self.agent_pools.as_ref()),
            ("modules", self.modules.as_ref()),
            ("policies", self.policies.as_ref()),
            ("policy_sets", self.policy_sets.as_ref()),
            ("projects", self.projects.as_ref()),
            ("providers", self.providers.as_ref()),
            ("tasks", self.tasks.as_ref()),
            ("teams", self.teams.as_ref()),
            ("variable_sets", self.variable_sets.as_ref()),
            ("variable_set_variables", self.variable_set_variables.as_ref()),
            ("workspaces", self.workspaces.as_ref()),
            ("workspace_variables", self.workspace_variables.as_ref()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub agent_image: String,
    pub push_image: String,
    /// Host directory the agent ships plan logs into.
    pub log_dir: PathBuf,
    /// Where `log_dir` is mounted inside the agent container.
    pub agent_log_mount: String,
    pub plan_poll_interval_secs: u64,
    pub agent_start_attempts: u32,
    pub agent_start_interval_secs: u64,
    pub download_state_files: bool,
    pub work_dir: PathBuf,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            agent_image: "ghcr.io/spacelift-io/spacelift-migration-kit:latest".to_string(),
            push_image: "ghcr.io/spacelift-io/terraform-push:latest".to_string(),
            log_dir: work_root().join("plan-logs"),
            agent_log_mount: "/mnt/spacelift-migration-kit".to_string(),
            plan_poll_interval_secs: 3,
            agent_start_attempts: 10,
            agent_start_interval_secs: 1,
            download_state_files: true,
            work_dir: work_root(),
        }
    }
}

impl EnrichmentConfig {
    pub fn plan_poll_interval(&self) -> Duration {
        Duration::from_secs(self.plan_poll_interval_secs)
    }

    pub fn agent_start_interval(&self) -> Duration {
        Duration::from_secs(self.agent_start_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub auto_fix_variable_names: bool,
    pub experimental_support_variable_sets: bool,
    /// Map workspaces that would need the alternate toolchain to a custom workflow instead.
    pub custom_workflow_for_bsl_terraform: bool,
}

impl Settings {
    pub fn merge_env_vars(&mut self) {
        self.merge_env_from(|key| std::env::var(key).ok());
    }

    /// Apply `STACKPORT_*` overrides from an arbitrary lookup.
    pub fn merge_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("STACKPORT_API_TOKEN") {
            self.source.api_token = token;
        }

        if let Some(endpoint) = lookup("STACKPORT_API_ENDPOINT") {
            self.source.api_endpoint = endpoint;
        }

        if let Some(value) = lookup("STACKPORT_AUTO_FIX_VARIABLE_NAMES") {
            if let Ok(value) = value.parse::<bool>() {
                self.mapping.auto_fix_variable_names = value;
            }
        }

        if let Some(value) = lookup("STACKPORT_VARIABLE_SETS") {
            if let Ok(value) = value.parse::<bool>() {
                self.mapping.experimental_support_variable_sets = value;
            }
        }
    }
}

#[cfg(test)]
mod tests;
