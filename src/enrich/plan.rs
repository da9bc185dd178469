//! Plan-only runs and their status polling.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::source::{ApiClient, ApiQuery, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRun {
    pub run_id: String,
    pub plan_id: String,
}

/// Queue a plan-only, no-refresh run on a workspace.
pub async fn trigger_plan(
    client: &ApiClient,
    organization_id: &str,
    workspace_id: &str,
) -> Result<PlanRun> {
    info!(
        "Trigger a plan for the '{}/{}' workspace",
        organization_id, workspace_id
    );

    let body = json!({
        "data": {
            "attributes": {
                "allow-empty-apply": false,
                "plan-only": true,
                "refresh": false
            },
            "relationships": {
                "workspace": {"data": {"id": workspace_id, "type": "workspaces"}}
            },
            "type": "runs"
        }
    });

    let run = client
        .fetch_one(&ApiQuery::post("/runs", body).fields(&["relationships.plan.data.id", "id"]))
        .await?;

    let plan_error = || Error::Plan {
        organization_id: organization_id.to_string(),
        workspace_id: workspace_id.to_string(),
    };
    let run = run.ok_or_else(plan_error)?;
    let plan_id = run.related_id("plan").ok_or_else(plan_error)?.to_string();

    Ok(PlanRun {
        run_id: run.id,
        plan_id,
    })
}

/// Poll until the plan reaches a terminal state.
///
/// `errored` and `finished` return the plan; `canceled` and `unreachable`
/// return `None`. There is no attempt limit.
pub async fn wait_for_plan(
    client: &ApiClient,
    plan_id: &str,
    interval: Duration,
) -> Result<Option<Record>> {
    info!("Waiting for plan to finish");

    let query = ApiQuery::get(format!("/plans/{plan_id}"))
        .fields(&["attributes.log-read-url", "attributes.status"]);

    loop {
        let Some(plan) = client.fetch_one(&query).await? else {
            warn!("Plan '{}' could not be found. Ignoring.", plan_id);
            return Ok(None);
        };

        match plan.attr_str("status") {
            Some("errored") | Some("finished") => return Ok(Some(plan)),
            Some(status @ ("canceled" | "unreachable")) => {
                warn!("Plan '{}' has status '{}'. Ignoring.", plan_id, status);
                return Ok(None);
            }
            status => {
                debug!(
                    "Plan '{}' is not finished yet ({}). Waiting {:?} before retrying.",
                    plan_id,
                    status.unwrap_or("unknown"),
                    interval
                );
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Method;
    use crate::testing::MockTransport;
    use std::sync::Arc;

    fn client(transport: &MockTransport) -> ApiClient {
        ApiClient::new(Arc::new(transport.clone()), "https://tfe.example.com", "token")
    }

    fn plan(status: &str) -> serde_json::Value {
        json!({"data": {"id": "plan-1", "attributes": {"status": status, "log-read-url": "https://logs/1"}}})
    }

    #[tokio::test]
    async fn test_trigger_plan_returns_run_and_plan_ids() {
        let transport = MockTransport::new();
        transport.on_json(
            Method::Post,
            "/runs",
            201,
            json!({"data": {"id": "run-1", "relationships": {"plan": {"data": {"id": "plan-1", "type": "plans"}}}}}),
        );

        let run = trigger_plan(&client(&transport), "acme", "ws-1").await.unwrap();
        assert_eq!(
            run,
            PlanRun {
                run_id: "run-1".into(),
                plan_id: "plan-1".into()
            }
        );

        let body = &transport.bodies_sent_to(Method::Post, "/runs")[0];
        assert_eq!(body["data"]["attributes"]["plan-only"], json!(true));
        assert_eq!(body["data"]["attributes"]["refresh"], json!(false));
        assert_eq!(body["data"]["relationships"]["workspace"]["data"]["id"], json!("ws-1"));
    }

    #[tokio::test]
    async fn test_missing_run_data_is_plan_error() {
        let transport = MockTransport::new();
        transport.on_json(Method::Post, "/runs", 404, json!({}));

        let err = trigger_plan(&client(&transport), "acme", "ws-1").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not trigger a plan for the 'acme/ws-1' workspace"
        );
    }

    #[tokio::test]
    async fn test_wait_polls_until_finished() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/plans/plan-1", 200, plan("pending"));
        transport.on_json(Method::Get, "/plans/plan-1", 200, plan("running"));
        transport.on_json(Method::Get, "/plans/plan-1", 200, plan("finished"));

        let plan = wait_for_plan(&client(&transport), "plan-1", Duration::ZERO)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plan.attr_str("status"), Some("finished"));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_errored_plan_still_ends_wait_with_plan() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/plans/plan-1", 200, plan("errored"));

        let plan = wait_for_plan(&client(&transport), "plan-1", Duration::ZERO)
            .await
            .unwrap();
        assert!(plan.is_some());
    }

    #[tokio::test]
    async fn test_canceled_plan_short_circuits_to_none() {
        let transport = MockTransport::new();
        transport.on_json(Method::Get, "/plans/plan-1", 200, plan("queued"));
        transport.on_json(Method::Get, "/plans/plan-1", 200, plan("canceled"));

        let plan = wait_for_plan(&client(&transport), "plan-1", Duration::ZERO)
            .await
            .unwrap();
        assert!(plan.is_none());
    }
}
