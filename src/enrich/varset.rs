//! Variable-set saga: attach each set to a disposable workspace, plan, scrape, restore.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::agent::EphemeralAgent;
use super::scan::ScanResult;
use super::workspace::{repoint, scan_plan};
use super::{settle, Pending, SagaContext};
use crate::error::{Error, Result};
use crate::source::{ApiClient, ApiQuery, Reference, Relationship, SourceGraph};
use crate::subprocess::ContainerSpec;

const DEFAULT_PROJECT: &str = "Default Project";
const DISPOSABLE_WORKSPACE: &str = "stackport";

/// A workspace created only to run variable-set plans. Deleted at the end of the pass.
#[derive(Debug)]
pub struct DisposableWorkspace {
    pub id: String,
}

impl DisposableWorkspace {
    pub async fn create(client: &ApiClient, organization_id: &str, project_id: &str) -> Result<Self> {
        let path = format!("/organizations/{organization_id}/workspaces");
        let body = json!({
            "data": {
                "attributes": {"name": DISPOSABLE_WORKSPACE, "execution-mode": "remote"},
                "relationships": {
                    "project": {"data": {"id": project_id, "type": "projects"}}
                },
                "type": "workspaces"
            }
        });

        let workspace = client
            .fetch_one(&ApiQuery::post(path.as_str(), body).fields(&["id"]))
            .await?
            .filter(|w| !w.id.is_empty())
            .ok_or_else(|| Error::UnexpectedResponse {
                url: client.url_for(&path),
                message: "no workspace returned".to_string(),
            })?;

        info!("Created disposable workspace '{}'", workspace.id);
        Ok(Self { id: workspace.id })
    }

    pub async fn delete(self, client: &ApiClient) -> Result<()> {
        info!("Deleting disposable workspace '{}'", self.id);
        client
            .send(&ApiQuery::delete(format!("/workspaces/{}", self.id)))
            .await
    }
}

/// Attachment and precedence of a variable set before the saga touched it.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSetBackup {
    pub variable_set_id: String,
    pub global: Value,
    pub priority: Value,
    /// `None` when the API did not report the relationship at all.
    pub workspaces: Option<Vec<Reference>>,
    pub projects: Option<Vec<Reference>>,
}

impl VariableSetBackup {
    pub async fn capture(client: &ApiClient, variable_set_id: &str) -> Result<Option<Self>> {
        let query = ApiQuery::get(format!("/varsets/{variable_set_id}")).fields(&[
            "attributes.name",
            "attributes.global",
            "attributes.priority",
            "relationships.workspaces.data",
            "relationships.projects.data",
        ]);

        let many = |rel: Option<&Relationship>| match rel {
            Some(Relationship::Many(references)) => Some(references.clone()),
            _ => None,
        };

        Ok(client.fetch_one(&query).await?.map(|record| Self {
            variable_set_id: variable_set_id.to_string(),
            global: record.attr("global").cloned().unwrap_or(Value::Bool(false)),
            priority: record.attr("priority").cloned().unwrap_or(Value::Bool(false)),
            workspaces: many(record.relationships.get("workspaces")),
            projects: many(record.relationships.get("projects")),
        }))
    }

    /// Make the set apply to `workspace_id` only, overriding workspace variables.
    pub async fn attach(&self, client: &ApiClient, workspace_id: &str) -> Result<()> {
        info!(
            "Updating '{}' to attach to the workspace '{}'",
            self.variable_set_id, workspace_id
        );

        let body = json!({
            "data": {
                "attributes": {"global": false, "priority": true},
                "relationships": {
                    "workspaces": {"data": [{"id": workspace_id, "type": "workspaces"}]},
                    "projects": {"data": []}
                }
            }
        });

        client
            .send(&ApiQuery::patch(format!("/varsets/{}", self.variable_set_id), body))
            .await
    }

    pub async fn restore(&self, client: &ApiClient) -> Result<()> {
        info!("Restore attachments of variable set '{}'", self.variable_set_id);

        let mut relationships = serde_json::Map::new();
        if let Some(workspaces) = &self.workspaces {
            relationships.insert("workspaces".into(), json!({ "data": workspaces }));
        }
        if let Some(projects) = &self.projects {
            relationships.insert("projects".into(), json!({ "data": projects }));
        }

        let body = json!({
            "data": {
                "attributes": {"global": self.global, "priority": self.priority},
                "relationships": relationships
            }
        });

        client
            .send(&ApiQuery::patch(format!("/varsets/{}", self.variable_set_id), body))
            .await
    }
}

async fn default_project_id(client: &ApiClient, organization_id: &str) -> Result<String> {
    let path = format!("/organizations/{organization_id}/projects");
    let projects = client
        .fetch(&ApiQuery::get(path.as_str()).fields(&["id", "attributes.name"]))
        .await?;

    projects
        .into_iter()
        .find(|p| p.name() == Some(DEFAULT_PROJECT))
        .map(|p| p.id)
        .ok_or_else(|| Error::UnexpectedResponse {
            url: client.url_for(&path),
            message: format!("organization has no '{DEFAULT_PROJECT}'"),
        })
}

/// Upload a placeholder configuration so the disposable workspace can plan.
async fn push_configuration(saga: &SagaContext<'_>, organization_name: &str) -> Result<()> {
    let home = directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| Error::Config("Could not determine the home directory".to_string()))?;
    let credentials = home.join(".terraform.d");

    let spec = ContainerSpec::new(&saga.config.push_image)
        .env("ORG", organization_name)
        .volume(&format!("{}/", credentials.display()), "/root/.terraform.d/")
        .pull("always");

    let output = saga.runtime.run(&spec).await?;
    info!("{}", output.trim_end());
    Ok(())
}

/// Recover the pending values of one organization's variable sets.
///
/// Cleanup order is fixed: the disposable workspace is deleted, then the agent released.
pub async fn enrich_organization(
    saga: &SagaContext<'_>,
    organization_id: &str,
    pending: &Pending,
    graph: &mut SourceGraph,
) -> Result<usize> {
    info!("Start enriching variable sets of organization '{}'", organization_id);

    let organization_name = graph
        .organizations
        .iter()
        .find(|o| o.id == organization_id)
        .and_then(|o| o.name())
        .unwrap_or(organization_id)
        .to_string();

    let project_id = default_project_id(saga.client, organization_id).await?;

    let agent =
        EphemeralAgent::provision(saga.client, saga.runtime, saga.config, organization_id).await?;

    let body = with_disposable_workspace(
        saga,
        &agent,
        organization_id,
        &organization_name,
        &project_id,
        pending,
        graph,
    )
    .await;

    agent.dump_logs(saga.runtime).await;
    let released = agent.release(saga.client, saga.runtime).await;

    let recovered = settle(body, released)?;
    info!("Stop enriching variable sets of organization '{}'", organization_id);
    Ok(recovered)
}

async fn with_disposable_workspace(
    saga: &SagaContext<'_>,
    agent: &EphemeralAgent,
    organization_id: &str,
    organization_name: &str,
    project_id: &str,
    pending: &Pending,
    graph: &mut SourceGraph,
) -> Result<usize> {
    let workspace = DisposableWorkspace::create(saga.client, organization_id, project_id).await?;

    let body = async {
        push_configuration(saga, organization_name).await?;
        repoint(saga.client, &workspace.id, &agent.pool_id).await?;
        recover_variable_sets(saga, organization_id, &workspace.id, pending, graph).await
    }
    .await;

    let deleted = workspace.delete(saga.client).await;
    settle(body, deleted)
}

async fn recover_variable_sets(
    saga: &SagaContext<'_>,
    organization_id: &str,
    workspace_id: &str,
    pending: &Pending,
    graph: &mut SourceGraph,
) -> Result<usize> {
    let mut recovered = 0;

    for (variable_set_id, variables) in pending {
        let Some(backup) = VariableSetBackup::capture(saga.client, variable_set_id).await? else {
            warn!("Variable set '{}' disappeared. Skipping.", variable_set_id);
            continue;
        };

        let attempt = async {
            backup.attach(saga.client, workspace_id).await?;
            scan_plan(saga, organization_id, workspace_id, variables).await
        }
        .await;
        let restored = backup.restore(saga.client).await;

        match attempt {
            Ok(scan) => {
                recovered += apply_variable_set_scan(graph, scan);
                restored?;
            }
            Err(e) => return settle(Err(e), restored),
        }
    }

    Ok(recovered)
}

fn apply_variable_set_scan(graph: &mut SourceGraph, scan: ScanResult) -> usize {
    let recovered = scan.values.len();
    for (variable_id, value) in scan.values {
        if let Some(variable) = graph.variable_set_variable_mut(&variable_id) {
            debug!("Recovered value of variable set variable '{}'", variable_id);
            variable.set_attr("value", Value::String(value));
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
    use crate::testing::{fixtures, MockContainerRuntime, TestContext};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn mount_saga(ctx: &TestContext) {
        let t = &ctx.transport;
        t.on_json(
            Method::Get,
            "/organizations/acme/projects",
            200,
            json!({"data": [
                {"id": "prj-1", "attributes": {"name": "Platform"}},
                {"id": "prj-0", "attributes": {"name": "Default Project"}}
            ]}),
        );
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
            Method::Post,
            "/organizations/acme/workspaces",
            201,
            json!({"data": {"id": "ws-tmp"}}),
        );
        t.on_json(Method::Patch, "/workspaces/ws-tmp", 200, json!({"data": {"id": "ws-tmp"}}));
        t.on(Method::Delete, "/workspaces/ws-tmp", HttpResponse::new(204, ""));
        t.on_json(
            Method::Get,
            "/varsets/varset-1",
            200,
            json!({"data": {
                "id": "varset-1",
                "attributes": {"name": "shared", "global": false, "priority": false},
                "relationships": {
                    "projects": {"data": [{"id": "prj-1", "type": "projects"}]},
                    "workspaces": {"data": []}
                }
            }}),
        );
        t.on_json(Method::Patch, "/varsets/varset-1", 200, json!({"data": {"id": "varset-1"}}));
        t.on_json(
            Method::Post,
            "/runs",
            201,
            json!({"data": {"id": "run-7", "relationships": {"plan": {"data": {"id": "plan-7"}}}}}),
        );
        t.on_json(
            Method::Get,
            "/plans/plan-7",
            200,
            json!({"data": {"id": "plan-7", "attributes": {"status": "finished", "log-read-url": "https://logs/7"}}}),
        );
    }

    fn pending() -> Pending {
        BTreeMap::from([(
            "varset-1".to_string(),
            vec![("vsvar-1".to_string(), "API_KEY".to_string())],
        )])
    }

    #[tokio::test]
    async fn test_variable_set_values_recovered_and_attachments_restored() {
        let ctx = TestContext::new().unwrap();
        mount_saga(&ctx);
        ctx.write_plan_log("run-7", "API_KEY=abc123\n").unwrap();

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
        assert_eq!(
            graph.variable_set_variables[0].attr_str("value"),
            Some("abc123")
        );

        let created = &ctx.transport.bodies_sent_to(Method::Post, "/organizations/acme/workspaces")[0];
        assert_eq!(created["data"]["relationships"]["project"]["data"]["id"], json!("prj-0"));

        let patches = ctx.transport.bodies_sent_to(Method::Patch, "/varsets/varset-1");
        assert_eq!(patches.len(), 2);
        assert_eq!(
            patches[0]["data"]["relationships"]["workspaces"]["data"][0]["id"],
            json!("ws-tmp")
        );
        assert_eq!(
            patches[1]["data"]["relationships"]["projects"]["data"][0]["id"],
            json!("prj-1")
        );
        assert_eq!(patches[1]["data"]["attributes"]["priority"], json!(false));

        let push = &ctx.runtime.runs()[0];
        assert!(push.env.contains(&("ORG".to_string(), "acme".to_string())));
        assert_eq!(push.pull.as_deref(), Some("always"));

        assert_eq!(ctx.transport.requests_to(Method::Delete, "/workspaces/ws-tmp").len(), 1);
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
    }

    #[tokio::test]
    async fn test_push_failure_still_deletes_workspace_and_pool() {
        let ctx = TestContext::new().unwrap();
        mount_saga(&ctx);

        let mock = MockContainerRuntime::new().failing_run();
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
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

        assert!(matches!(err, Error::Process(_)));
        assert!(ctx.transport.bodies_sent_to(Method::Patch, "/varsets/varset-1").is_empty());
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/workspaces/ws-tmp").len(), 1);
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
        assert!(mock.running().is_empty());
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_recovered_value() {
        let ctx = TestContext::new().unwrap();
        // attach succeeds, the restore is rejected
        ctx.transport
            .on_json(Method::Patch, "/varsets/varset-1", 200, json!({"data": {"id": "varset-1"}}));
        ctx.transport
            .on(Method::Patch, "/varsets/varset-1", HttpResponse::new(500, ""));
        mount_saga(&ctx);
        ctx.write_plan_log("run-7", "API_KEY=abc123\n").unwrap();

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

        assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
        assert_eq!(
            graph.variable_set_variables[0].attr_str("value"),
            Some("abc123")
        );
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/workspaces/ws-tmp").len(), 1);
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
    }
}
