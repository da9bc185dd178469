//! Ephemeral, organization-scoped execution agent.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::EnrichmentConfig;
use crate::error::{Error, Result};
use crate::source::{ApiClient, ApiQuery};
use crate::subprocess::{ContainerRuntime, ContainerSpec};

const AGENT_NAME: &str = "stackport-agent";
const POOL_NAME: &str = "stackport";

/// A provisioned agent pool plus the container serving it.
///
/// Must be handed back with [`EphemeralAgent::release`] on every path.
#[derive(Debug)]
pub struct EphemeralAgent {
    pub organization_id: String,
    pub pool_id: String,
    pub container_name: String,
    pub container_id: String,
}

pub fn container_name(organization_id: &str) -> String {
    format!("migration-agent-{organization_id}")
}

impl EphemeralAgent {
    /// Create the pool and its token, start the container and wait for it to run.
    ///
    /// Whatever was created before a failure is torn down again before the error is returned.
    pub async fn provision(
        client: &ApiClient,
        runtime: &Arc<dyn ContainerRuntime>,
        config: &EnrichmentConfig,
        organization_id: &str,
    ) -> Result<Self> {
        info!("Start local agent for organization '{}'", organization_id);

        let pool_id = create_agent_pool(client, organization_id).await?;

        let token = match create_agent_token(client, &pool_id).await {
            Ok(token) => token,
            Err(e) => {
                discard_pool(client, &pool_id).await;
                return Err(e);
            }
        };

        let name = container_name(organization_id);
        match start_container(client, runtime, config, &name, &token).await {
            Ok(container_id) => Ok(Self {
                organization_id: organization_id.to_string(),
                pool_id,
                container_name: name,
                container_id,
            }),
            Err(e) => {
                if let Err(stop_error) = stop_container(runtime, &name).await {
                    error!("Failed to stop agent container '{}': {}", name, stop_error);
                }
                discard_pool(client, &pool_id).await;
                Err(e)
            }
        }
    }

    /// Emit the container logs at debug level, if it is still around.
    pub async fn dump_logs(&self, runtime: &Arc<dyn ContainerRuntime>) {
        match runtime.is_running(&self.container_name).await {
            Ok(true) => {
                debug!("Local agent container '{}' logs:", self.container_id);
                match runtime.logs(&self.container_name).await {
                    Ok(logs) => debug!("{}", logs),
                    Err(e) => debug!("Could not read agent logs: {}", e),
                }
            }
            _ => warn!(
                "Local agent container '{}' was already stopped when we tried to pull the logs. Skipping.",
                self.container_id
            ),
        }
    }

    /// Stop the container and delete the pool. Both steps are attempted; the first failure is returned.
    pub async fn release(self, client: &ApiClient, runtime: &Arc<dyn ContainerRuntime>) -> Result<()> {
        info!("Stop local agent for organization '{}'", self.organization_id);

        debug!("Stopping agent container '{}'", self.container_id);
        let stopped = stop_container(runtime, &self.container_name).await;

        let deleted = delete_agent_pool(client, &self.pool_id).await;
        if let (Err(_), Err(e)) = (&stopped, &deleted) {
            error!("Failed to delete agent pool '{}': {}", self.pool_id, e);
        }

        stopped.and(deleted)
    }
}

async fn create_agent_pool(client: &ApiClient, organization_id: &str) -> Result<String> {
    let body = json!({
        "data": {
            "attributes": {"name": POOL_NAME, "organization-scoped": true},
            "type": "agent-pools"
        }
    });

    let pool = client
        .fetch_one(
            &ApiQuery::post(format!("/organizations/{organization_id}/agent-pools"), body)
                .fields(&["id"]),
        )
        .await?
        .filter(|p| !p.id.is_empty())
        .ok_or_else(|| Error::UnexpectedResponse {
            url: client.url_for(&format!("/organizations/{organization_id}/agent-pools")),
            message: "no agent pool returned".to_string(),
        })?;

    info!("Created '{}' agent pool", pool.id);
    Ok(pool.id)
}

async fn create_agent_token(client: &ApiClient, pool_id: &str) -> Result<String> {
    let body = json!({
        "data": {
            "attributes": {"description": POOL_NAME},
            "type": "authentication-tokens"
        }
    });
    let path = format!("/agent-pools/{pool_id}/authentication-tokens");

    let token = client
        .fetch_one(&ApiQuery::post(path.as_str(), body).fields(&["attributes.token", "id"]))
        .await?;

    let Some(token) = token else {
        return Err(Error::UnexpectedResponse {
            url: client.url_for(&path),
            message: "no agent token returned".to_string(),
        });
    };
    let value = token.attr_str("token").ok_or_else(|| Error::UnexpectedResponse {
        url: client.url_for(&path),
        message: "agent token has no value".to_string(),
    })?;

    info!("Created '{}' agent token", token.id);
    Ok(value.to_string())
}

async fn delete_agent_pool(client: &ApiClient, pool_id: &str) -> Result<()> {
    info!("Deleting '{}' agent pool", pool_id);
    client
        .send(&ApiQuery::delete(format!("/agent-pools/{pool_id}")))
        .await
}

async fn discard_pool(client: &ApiClient, pool_id: &str) {
    if let Err(e) = delete_agent_pool(client, pool_id).await {
        error!("Failed to delete agent pool '{}': {}", pool_id, e);
    }
}

/// Always issues the stop; a container that is already gone counts as stopped.
async fn stop_container(runtime: &Arc<dyn ContainerRuntime>, name: &str) -> Result<()> {
    if !matches!(runtime.is_running(name).await, Ok(true)) {
        warn!(
            "Local agent '{}' is already stopped before trying to stop it. Stopping anyway.",
            name
        );
    }
    runtime.stop(name).await.map_err(Error::from)
}

async fn start_container(
    client: &ApiClient,
    runtime: &Arc<dyn ContainerRuntime>,
    config: &EnrichmentConfig,
    name: &str,
    token: &str,
) -> Result<String> {
    let spec = ContainerSpec::new(&config.agent_image)
        .name(name)
        .env("TFC_AGENT_NAME", AGENT_NAME)
        .env("TFC_AGENT_TOKEN", token)
        .env("TFC_ADDRESS", client.endpoint())
        .volume(&config.log_dir.display().to_string(), &config.agent_log_mount)
        .pull("never");

    let id = runtime.start(&spec).await?;

    for attempt in 1..=config.agent_start_attempts {
        let running = runtime.list_running().await?;
        if running.iter().any(|c| c.name == name && c.is_running()) {
            info!("Container verified started: {} ({})", name, id);
            debug!("Using agent container '{}' from image '{}'", id, config.agent_image);
            return Ok(id);
        }
        debug!(
            "Agent container '{}' not running yet (attempt {}/{})",
            name, attempt, config.agent_start_attempts
        );
        tokio::time::sleep(config.agent_start_interval()).await;
    }

    Err(Error::AgentStart {
        container: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Method;
    use crate::testing::{MockContainerRuntime, MockTransport, TestContext};

    fn mount_pool(transport: &MockTransport) {
        transport.on_json(
            Method::Post,
            "/organizations/acme/agent-pools",
            201,
            json!({"data": {"id": "apool-1"}}),
        );
        transport.on_json(
            Method::Post,
            "/agent-pools/apool-1/authentication-tokens",
            201,
            json!({"data": {"id": "at-1", "attributes": {"token": "agent-secret"}}}),
        );
        transport.on(
            Method::Delete,
            "/agent-pools/apool-1",
            crate::source::HttpResponse::new(204, ""),
        );
    }

    #[tokio::test]
    async fn test_provision_and_release() {
        let ctx = TestContext::new().unwrap();
        mount_pool(&ctx.transport);
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(ctx.runtime.clone());
        let client = ctx.client();

        let agent = EphemeralAgent::provision(&client, &runtime, &ctx.settings.enrichment, "acme")
            .await
            .unwrap();

        assert_eq!(agent.pool_id, "apool-1");
        assert_eq!(agent.container_name, "migration-agent-acme");

        let spec = &ctx.runtime.started()[0];
        assert!(spec
            .env
            .contains(&("TFC_AGENT_TOKEN".to_string(), "agent-secret".to_string())));
        assert!(spec
            .env
            .contains(&("TFC_ADDRESS".to_string(), "https://tfe.example.com".to_string())));
        assert_eq!(spec.pull.as_deref(), Some("never"));

        agent.release(&client, &runtime).await.unwrap();

        assert!(ctx.runtime.running().is_empty());
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
    }

    #[tokio::test]
    async fn test_agent_that_never_runs_is_torn_down() {
        let ctx = TestContext::new().unwrap();
        mount_pool(&ctx.transport);
        let mock = MockContainerRuntime::new().never_running();
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());

        let err = EphemeralAgent::provision(&ctx.client(), &runtime, &ctx.settings.enrichment, "acme")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AgentStart { ref container } if container == "migration-agent-acme"));
        assert_eq!(mock.stopped(), vec!["migration-agent-acme"]);
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
    }

    #[tokio::test]
    async fn test_release_after_container_exited() {
        let ctx = TestContext::new().unwrap();
        mount_pool(&ctx.transport);
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(ctx.runtime.clone());
        let client = ctx.client();

        let agent = EphemeralAgent::provision(&client, &runtime, &ctx.settings.enrichment, "acme")
            .await
            .unwrap();
        ctx.runtime.exit("migration-agent-acme");

        agent.release(&client, &runtime).await.unwrap();

        assert_eq!(ctx.runtime.stopped(), vec!["migration-agent-acme"]);
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
    }

    #[tokio::test]
    async fn test_token_failure_deletes_pool() {
        let ctx = TestContext::new().unwrap();
        ctx.transport.on_json(
            Method::Post,
            "/organizations/acme/agent-pools",
            201,
            json!({"data": {"id": "apool-1"}}),
        );
        ctx.transport.on_json(
            Method::Post,
            "/agent-pools/apool-1/authentication-tokens",
            500,
            json!({}),
        );
        ctx.transport.on(
            Method::Delete,
            "/agent-pools/apool-1",
            crate::source::HttpResponse::new(204, ""),
        );
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(ctx.runtime.clone());

        let result =
            EphemeralAgent::provision(&ctx.client(), &runtime, &ctx.settings.enrichment, "acme").await;

        assert!(matches!(result, Err(Error::HttpStatus { status: 500, .. })));
        assert!(ctx.runtime.started().is_empty());
        assert!(ctx.runtime.stopped().is_empty());
        assert_eq!(ctx.transport.requests_to(Method::Delete, "/agent-pools/apool-1").len(), 1);
    }
}
