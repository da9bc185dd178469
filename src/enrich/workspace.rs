//! Workspace saga: repoint each workspace at the ephemeral agent, plan, scrape, restore.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::agent::EphemeralAgent;
use super::plan::{trigger_plan, wait_for_plan};
use super::scan::{scan_plan_log, ScanResult};
use super::{settle, Pending, SagaContext};
use crate::error::Result;
use crate::source::{ApiClient, ApiQuery, Reference, Relationship, SourceGraph};

/// Execution settings of a workspace as they were before the saga touched it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceBackup {
    pub workspace_id: String,
    pub execution_mode: Value,
    pub setting_overwrites: Value,
    pub agent_pool: Option<Reference>,
}

impl WorkspaceBackup {
    /// `None` when the workspace no longer exists.
    pub async fn capture(client: &ApiClient, workspace_id: &str) -> Result<Option<Self>> {
        debug!("Backing up execution settings of workspace '{}'", workspace_id);

        let query = ApiQuery::get(format!("/workspaces/{workspace_id}")).fields(&[
            "attributes.execution-mode",
            "attributes.setting-overwrites",
            "relationships.agent-pool",
        ]);

        Ok(client.fetch_one(&query).await?.map(|record| Self {
            workspace_id: workspace_id.to_string(),
            execution_mode: record.attr("execution-mode").cloned().unwrap_or(Value::Null),
            setting_overwrites: record
                .attr("setting-overwrites")
                .cloned()
                .unwrap_or(Value::Null),
            agent_pool: match record.relationships.get("agent-pool") {
                Some(Relationship::One(reference)) => reference.clone(),
                _ => None,
            },
        }))
    }

    /// Put the captured settings back. Safe to repeat.
    pub async fn restore(&self, client: &ApiClient) -> Result<()> {
        info!("Restore execution settings of workspace '{}'", self.workspace_id);

        let body = json!({
            "data": {
                "attributes": {
                    "execution-mode": self.execution_mode,
                    "setting-overwrites": self.setting_overwrites
                },
                "relationships": {
                    "agent-pool": {"data": self.agent_pool}
                },
                "type": "workspaces"
            }
        });

        client
            .send(&ApiQuery::patch(format!("/workspaces/{}", self.workspace_id), body))
            .await
    }
}

/// Switch a workspace to agent execution on `pool_id`.
pub async fn repoint(client: &ApiClient, workspace_id: &str, pool_id: &str) -> Result<()> {
    info!("Point workspace '{}' at agent pool '{}'", workspace_id, pool_id);

    let body = json!({
        "data": {
            "attributes": {
                "agent-pool-id": pool_id,
                "execution-mode": "agent",
                "setting-overwrites": {"execution-mode": true, "agent-pool": true}
            },
            "type": "workspaces"
        }
    });

    client
        .send(&ApiQuery::patch(format!("/workspaces/{workspace_id}"), body))
        .await
}

/// Recover the pending values of one organization's workspaces.
///
/// The agent is released whatever happens; each workspace that was captured is
/// restored before the next one is touched. Returns the number of values recovered.
pub async fn enrich_organization(
    saga: &SagaContext<'_>,
    organization_id: &str,
    pending: &Pending,
    graph: &mut SourceGraph,
) -> Result<usize> {
    info!("Start enriching workspaces of organization '{}'", organization_id);

    let agent =
        EphemeralAgent::provision(saga.client, saga.runtime, saga.config, organization_id).await?;

    let body = recover_workspaces(saga, &agent, organization_id, pending, graph).await;

    agent.dump_logs(saga.runtime).await;
    let released = agent.release(saga.client, saga.runtime).await;

    let recovered = settle(body, released)?;
    info!("Stop enriching workspaces of organization '{}'", organization_id);
    Ok(recovered)
}

async fn recover_workspaces(
    saga: &SagaContext<'_>,
    agent: &EphemeralAgent,
    organization_id: &str,
    pending: &Pending,
    graph: &mut SourceGraph,
) -> Result<usize> {
    let mut recovered = 0;

    for (workspace_id, variables) in pending {
        let Some(workspace) = graph.workspace(workspace_id) else {
            warn!("Workspace '{}' not found in extracted data. Skipping.", workspace_id);
            continue;
        };
        let name = workspace.name().unwrap_or(workspace_id).to_string();

        if workspace.related_id("current-configuration-version").is_none() {
            warn!(
                "Workspace '{}/{}' has no configuration version. Skipping.",
                organization_id, name
            );
            continue;
        }

        let Some(backup) = WorkspaceBackup::capture(saga.client, workspace_id).await? else {
            warn!(
                "Workspace '{}/{}' disappeared before it could be backed up. Skipping.",
                organization_id, name
            );
            continue;
        };

        let attempt =
            plan_and_scan(saga, &agent.pool_id, organization_id, workspace_id, variables).await;
        let restored = backup.restore(saga.client).await;

        // recovered values are kept even when the restore fails
        match attempt {
            Ok(scan) => {
                recovered += apply_workspace_scan(graph, workspace_id, scan);
                restored?;
            }
            Err(e) => return settle(Err(e), restored),
        }
    }

    Ok(recovered)
}

async fn plan_and_scan(
    saga: &SagaContext<'_>,
    pool_id: &str,
    organization_id: &str,
    workspace_id: &str,
    variables: &[(String, String)],
) -> Result<ScanResult> {
    repoint(saga.client, workspace_id, pool_id).await?;
    scan_plan(saga, organization_id, workspace_id, variables).await
}

/// Run a plan on a workspace that already points at the agent and scan its log.
pub(crate) async fn scan_plan(
    saga: &SagaContext<'_>,
    organization_id: &str,
    workspace_id: &str,
    variables: &[(String, String)],
) -> Result<ScanResult> {
    let run = trigger_plan(saga.client, organization_id, workspace_id).await?;

    let Some(plan) =
        wait_for_plan(saga.client, &run.plan_id, saga.config.plan_poll_interval()).await?
    else {
        return Ok(ScanResult::default());
    };

    if plan.attr_str("log-read-url").is_none() {
        warn!("Plan '{}' produced no log. Nothing to recover.", run.plan_id);
        return Ok(ScanResult::default());
    }

    let log = saga.logs.read(&run.run_id).await?;
    Ok(scan_plan_log(&log, variables))
}

fn apply_workspace_scan(graph: &mut SourceGraph, workspace_id: &str, scan: ScanResult) -> usize {
    let recovered = scan.values.len();
    for (variable_id, value) in scan.values {
        if let Some(variable) = graph.workspace_variable_mut(&variable_id) {
            variable.set_attr("value", Value::String(value));
        }
    }

    if let (Some(branch), Some(workspace)) = (scan.branch, graph.workspace_mut(workspace_id)) {
        let has_repo = workspace.attr("vcs-repo").is_some();
        let unset = workspace
            .attr_str("vcs-repo.branch")
            .map_or(true, str::is_empty);
        if has_repo && unset {
            debug!("Backfilling branch '{}' on workspace '{}'", branch, workspace_id);
            workspace.set_attr("vcs-repo.branch", Value::String(branch));
        }
    }

    recovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::scan::PlanLogStore;
    use crate::source::{HttpResponse, Method};
    use crate::subprocess::ContainerRuntime;
    use crate::testing::{fixtures, TestContext};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn mount_saga(ctx: &TestContext) {
        let t = &ctx.transport;
        t.on_json(
            Method::Post,
            "/organizations/acme/agent-pools",
            201,
            json!({"data": {"id": "apool-1"}}),
        );
        t.on_json(
            Method::Post,
            "/agent-pools/apool-1/authentication-tokens",
            201,
            json!({"data": {"id": "at-1", "attributes": {"token": "agent-secret"}}}),
        );
        t.on(Method::Delete, "/agent-pools/apool-1", HttpResponse::new(204, ""));
        t.on_json(
            Method::Get,
            "/workspaces/ws-1",
            200,
            json!({"data": {
                "id": "ws-1",
                "attributes": {"execution-mode": "remote", "setting-overwrites": {"execution-mode": false}},
                "relationships": {"agent-pool": {"data": null}}
            }}),
        );
        t.on_json(Method::Patch, "/workspaces/ws-1", 200, json!({"data": {"id": "ws-1"}}));
        t.on_json(
            Method::Post,
            "/runs",
            201,
            json!({"data": {"id": "run-1", "relationships": {"plan": {"data": {"id": "plan-1"}}}}}),
        );
        t.on_json(
            Method::Get,
            "/plans/plan-1",
            200,
            json!({"data": {"id": "plan-1", "attributes": {"status": "finished", "log-read-url": "https://logs/1"}}}),
        );
    }

    fn pending() -> Pending {
        BTreeMap::from([(
            "ws-1".to_string(),
            vec![("var-1".to_string(), "DB_PASSWORD".to_string())],
        )])
    }

    #[tokio::test]
    async fn test_workspace_values_recovered_and_settings_restored() {
        let ctx = TestContext::new().unwrap();
        mount_saga(&ctx);
        ctx.write_plan_log("run-1", "DB_PASSWORD=hunter2\nATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=dev\n")
            .unwrap();

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(ctx.runtime.clone());
        let client = ctx.client();
        let saga = SagaContext {
            client: &client,
            runtime: &runtime,
            config: &ctx.settings.enrichment,
            logs: PlanLogStore::new(&ctx.settings.enrichment.log_dir),
        };

        let mut graph = fixtures::sample_graph();
        let recovered = enrich_organization(&saga, "acme", &pending(), &mut graph)
            .await
            .unwrap();

        assert_eq!(recovered, 1);
        let variable = graph.workspace_variables.iter().find(|v| v.id == "var-1").unwrap();
        assert_eq!(variable.attr_str("value"), Some("hunter2"));
        // branch was already set
        assert_eq!(graph.workspace("ws-1").unwrap().attr_str("vcs-repo.branch"), Some("main"));

        let patches = ctx.transport.bodies_sent_to(Method::Patch, "/workspaces/ws-1");
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0]["data"]["attributes"]["execution-mode"], json!("agent"));
        assert_eq!(patches[1]["data"]["attributes"]["execution-mode"], json!("remote"));
        assert_eq!(patches[1]["data"]["relationships"]["agent-pool"]["data"], Value::Null);

        assert!(ctx.runtime.running().is_empty());
    }

    #[tokio::test]
    async fn test_missing_plan_log_still_restores_and_releases() {
        let ctx = TestContext::new().unwrap();
        mount_saga(&ctx);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(ctx.runtime.clone());
        let client = ctx.client();
        let saga = SagaContext {
            client: &client,
            runtime: &runtime,
            config: &ctx.settings.enrichment,
            logs: PlanLogStore::new(&ctx.settings.enrichment.log_dir),
        };

        let mut graph = fixtures::sample_graph();
        let err = enrich_organization(&saga, "acme", &pending(), &mut graph)
            .await
            .unwrap_err();

        assert!(matches!(err, crate::error::Error::PlanLog { .. }));
        assert_eq!(ctx.transport.bodies_sent_to(Method::Patch, "/workspaces/ws-1").len(), 2);
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
        assert!(ctx.runtime.running().is_empty());
    }

    #[test]
    fn test_branch_backfilled_only_when_unset() {
        let mut graph = fixtures::sample_graph();
        graph.workspaces[0].set_attr("vcs-repo.branch", json!(""));

        let scan = ScanResult {
            values: BTreeMap::new(),
            branch: Some("develop".to_string()),
        };
        apply_workspace_scan(&mut graph, "ws-1", scan.clone());
        assert_eq!(graph.workspace("ws-1").unwrap().attr_str("vcs-repo.branch"), Some("develop"));

        // no repository to attach a branch to
        apply_workspace_scan(&mut graph, "ws-2", scan);
        assert!(graph.workspace("ws-2").unwrap().attr("vcs-repo").is_none());
    }
}
