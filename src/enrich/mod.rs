//! Sensitive-value enrichment.
//!
//! The source API never returns sensitive variable values. They are recovered by
//! running a real plan through an agent we control and reading the plan log. Every
//! remote mutation made on the way has a paired compensating action that runs on
//! every exit path:
//!
//! | acquired                     | released by                         |
//! |------------------------------|-------------------------------------|
//! | agent pool + container       | [`agent::EphemeralAgent::release`]  |
//! | workspace execution settings | [`workspace::WorkspaceBackup::restore`] |
//! | variable set attachments     | [`varset::VariableSetBackup::restore`]  |
//! | disposable workspace         | [`varset::DisposableWorkspace::delete`] |
//!
//! A failure aborts the current organization only. Cleanup errors are logged and
//! never replace the error that triggered them.

pub mod agent;
pub mod plan;
pub mod scan;
pub mod state;
pub mod varset;
pub mod workspace;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::EnrichmentConfig;
use crate::error::Result;
use crate::interaction::UserInteraction;
use crate::source::{ApiClient, Record, SourceGraph};
use crate::subprocess::ContainerRuntime;

pub use agent::EphemeralAgent;
pub use scan::{mask, scan_plan_log, PlanLogStore, ScanResult};

/// Owner id (workspace or variable set) to the `(variable id, key)` pairs still unrecovered.
pub type Pending = BTreeMap<String, Vec<(String, String)>>;

/// Collaborators shared by one organization pass.
pub struct SagaContext<'a> {
    pub client: &'a ApiClient,
    pub runtime: &'a Arc<dyn ContainerRuntime>,
    pub config: &'a EnrichmentConfig,
    pub logs: PlanLogStore,
}

/// Combine the outcome of a saga body with the outcome of its compensating step.
///
/// The body's error wins; a cleanup error is only returned when the body succeeded.
pub(crate) fn settle<T>(body: Result<T>, cleanup: Result<()>) -> Result<T> {
    match (body, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup_error)) => Err(cleanup_error),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_error)) => {
            error!("Cleanup failed after an earlier error: {}", cleanup_error);
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Workspaces,
    VariableSets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationOutcome {
    pub organization_id: String,
    pub scope: Scope,
    pub recovered: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoContainerRuntime,
    NothingToRecover,
    Declined,
}

#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub state_files: Vec<PathBuf>,
    pub outcomes: Vec<OrganizationOutcome>,
    pub skipped: Option<SkipReason>,
}

impl EnrichmentReport {
    pub fn recovered(&self) -> usize {
        self.outcomes.iter().map(|o| o.recovered).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &OrganizationOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

fn is_pending(variable: &Record) -> bool {
    variable.attr_bool("sensitive") != Some(false) && variable.attr("value").is_none()
}

fn key_of(variable: &Record) -> Option<(String, String)> {
    variable
        .attr_str("key")
        .map(|key| (variable.id.clone(), key.to_string()))
}

/// Sensitive workspace variables without a value, by organization then workspace.
pub fn pending_workspace_variables(graph: &SourceGraph) -> BTreeMap<String, Pending> {
    let mut grouped: BTreeMap<String, Pending> = BTreeMap::new();

    for variable in graph.workspace_variables.iter().filter(|v| is_pending(v)) {
        let Some(workspace_id) = variable.workspace_id() else {
            continue;
        };
        let Some(organization_id) = graph.workspace(workspace_id).and_then(Record::organization_id)
        else {
            warn!("Could not find the workspace of variable '{}'", variable.id);
            continue;
        };
        if let Some(entry) = key_of(variable) {
            grouped
                .entry(organization_id.to_string())
                .or_default()
                .entry(workspace_id.to_string())
                .or_default()
                .push(entry);
        }
    }

    grouped
}

/// Sensitive variable set variables without a value, by organization then variable set.
pub fn pending_variable_set_variables(graph: &SourceGraph) -> BTreeMap<String, Pending> {
    let mut grouped: BTreeMap<String, Pending> = BTreeMap::new();

    for variable in graph.variable_set_variables.iter().filter(|v| is_pending(v)) {
        let Some(variable_set_id) = variable.varset_id() else {
            continue;
        };
        let Some(organization_id) = graph
            .variable_set(variable_set_id)
            .and_then(Record::organization_id)
        else {
            warn!("Could not find the variable set of variable '{}'", variable.id);
            continue;
        };
        if let Some(entry) = key_of(variable) {
            grouped
                .entry(organization_id.to_string())
                .or_default()
                .entry(variable_set_id.to_string())
                .or_default()
                .push(entry);
        }
    }

    grouped
}

pub struct Enricher<'a> {
    client: &'a ApiClient,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    interaction: Arc<dyn UserInteraction>,
    config: &'a EnrichmentConfig,
    variable_sets: bool,
}

impl<'a> Enricher<'a> {
    pub fn new(
        client: &'a ApiClient,
        runtime: Option<Arc<dyn ContainerRuntime>>,
        interaction: Arc<dyn UserInteraction>,
        config: &'a EnrichmentConfig,
        variable_sets: bool,
    ) -> Self {
        Self {
            client,
            runtime,
            interaction,
            config,
            variable_sets,
        }
    }

    /// Download state files, then recover sensitive values organization by organization.
    ///
    /// Only transport errors during the state download abort the whole stage; a
    /// failed organization pass is recorded in the report and the next one runs.
    pub async fn enrich(&self, graph: &mut SourceGraph) -> Result<EnrichmentReport> {
        info!("Start enriching data");
        let mut report = EnrichmentReport::default();

        if !self.config.enabled {
            info!("Enrichment is disabled");
            report.skipped = Some(SkipReason::Disabled);
            return Ok(report);
        }

        if self.config.download_state_files {
            report.state_files =
                state::download_state_files(self.client, graph, &self.config.work_dir).await?;
        }

        let Some(runtime) = self.available_runtime().await else {
            warn!("No container runtime available. Sensitive values will not be recovered.");
            self.interaction.display_warning(
                "Neither docker nor podman is available; sensitive values were not recovered",
            );
            report.skipped = Some(SkipReason::NoContainerRuntime);
            return Ok(report);
        };

        let workspaces = pending_workspace_variables(graph);
        let variable_sets = if self.variable_sets {
            pending_variable_set_variables(graph)
        } else {
            BTreeMap::new()
        };

        if workspaces.is_empty() && variable_sets.is_empty() {
            info!("No sensitive variables to recover");
            report.skipped = Some(SkipReason::NothingToRecover);
            return Ok(report);
        }

        let owners = |grouped: &BTreeMap<String, Pending>| -> usize {
            grouped.values().map(BTreeMap::len).sum()
        };
        let message = format!(
            "Sensitive values will be recovered by temporarily switching {} workspace(s) and {} variable set(s) to a local agent and running plans.\nContinue?",
            owners(&workspaces),
            owners(&variable_sets)
        );
        if !self.interaction.prompt_yes_no(&message).await? {
            info!("Sensitive value recovery declined");
            report.skipped = Some(SkipReason::Declined);
            return Ok(report);
        }

        tokio::fs::create_dir_all(&self.config.log_dir).await?;
        let saga = SagaContext {
            client: self.client,
            runtime: &runtime,
            config: self.config,
            logs: PlanLogStore::new(&self.config.log_dir),
        };

        for (organization_id, pending) in &workspaces {
            let result = workspace::enrich_organization(&saga, organization_id, pending, graph).await;
            report
                .outcomes
                .push(outcome(organization_id, Scope::Workspaces, result));
        }

        for (organization_id, pending) in &variable_sets {
            let result = varset::enrich_organization(&saga, organization_id, pending, graph).await;
            report
                .outcomes
                .push(outcome(organization_id, Scope::VariableSets, result));
        }

        info!(
            "Stop enriching data ({} value(s) recovered, {} organization pass(es) failed)",
            report.recovered(),
            report.failures().count()
        );
        Ok(report)
    }

    async fn available_runtime(&self) -> Option<Arc<dyn ContainerRuntime>> {
        let runtime = self.runtime.as_ref()?;
        runtime.is_available().await.then(|| Arc::clone(runtime))
    }
}

fn outcome(organization_id: &str, scope: Scope, result: Result<usize>) -> OrganizationOutcome {
    match result {
        Ok(recovered) => OrganizationOutcome {
            organization_id: organization_id.to_string(),
            scope,
            recovered,
            error: None,
        },
        Err(e) => {
            error!(
                "Enrichment of organization '{}' failed: {}",
                organization_id, e
            );
            OrganizationOutcome {
                organization_id: organization_id.to_string(),
                scope,
                recovered: 0,
                error: Some(e.to_string()),
            }
        }
    }
}
