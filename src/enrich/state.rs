//! Current state file download.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::source::{ApiClient, ApiQuery, SourceGraph};

/// `<work_dir>/state-files/<org>/<workspace>.tfstate`
pub fn state_file_path(work_dir: &Path, organization_id: &str, workspace_id: &str) -> PathBuf {
    work_dir
        .join("state-files")
        .join(organization_id)
        .join(format!("{workspace_id}.tfstate"))
}

/// Download the current state of every workspace that has one.
///
/// Returns the paths written, in workspace order.
pub async fn download_state_files(
    client: &ApiClient,
    graph: &SourceGraph,
    work_dir: &Path,
) -> Result<Vec<PathBuf>> {
    info!("Start downloading state files");

    let mut written = Vec::new();
    for workspace in &graph.workspaces {
        let Some(state_version_id) = workspace.related_id("current-state-version") else {
            debug!("Workspace '{}' has no current state version", workspace.id);
            continue;
        };
        let Some(organization_id) = workspace.organization_id() else {
            warn!("Workspace '{}' has no organization. Skipping its state.", workspace.id);
            continue;
        };

        let query = ApiQuery::get(format!("/state-versions/{state_version_id}"))
            .drop_fields(&[
                "data.attributes.modules",
                "data.attributes.providers",
                "data.attributes.resources",
            ])
            .fields(&["attributes.hosted-state-download-url"]);

        let Some(url) = client
            .fetch_one(&query)
            .await?
            .and_then(|v| v.attr_str("hosted-state-download-url").map(str::to_string))
        else {
            warn!(
                "State version '{}' of workspace '{}' has no download URL",
                state_version_id, workspace.id
            );
            continue;
        };

        let raw = client.download_text(&url).await?;
        let state: Value = serde_json::from_str(&raw)?;

        let path = state_file_path(work_dir, organization_id, &workspace.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_string_pretty(&state)?).await?;

        info!("Wrote state file '{}'", path.display());
        written.push(path);
    }

    info!("Stop downloading state files");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Method;
    use crate::testing::{fixtures, TestContext};
    use serde_json::json;

    #[tokio::test]
    async fn test_state_written_for_workspaces_with_state() {
        let ctx = TestContext::new().unwrap();
        ctx.transport.on_json(
            Method::Get,
            "/state-versions/sv-1",
            200,
            json!({"data": {
                "id": "sv-1",
                "attributes": {
                    "hosted-state-download-url": "https://archivist.example.com/sv-1",
                    "resources": [{"name": "big"}]
                }
            }}),
        );
        ctx.transport.on(
            Method::Get,
            "https://archivist.example.com/sv-1",
            crate::source::HttpResponse::new(200, r#"{"version":4,"serial":7}"#),
        );

        let graph = fixtures::sample_graph();
        let written = download_state_files(&ctx.client(), &graph, &ctx.temp_path())
            .await
            .unwrap();

        let expected = ctx.temp_path().join("state-files/acme/ws-1.tfstate");
        assert_eq!(written, vec![expected.clone()]);

        let content = std::fs::read_to_string(expected).unwrap();
        assert!(content.contains("\"serial\": 7"));

        let download = &ctx.transport.requests_to(Method::Get, "https://archivist.example.com/sv-1")[0];
        assert_eq!(download.bearer_token, "test-token");
    }

    #[tokio::test]
    async fn test_missing_state_version_is_skipped() {
        let ctx = TestContext::new().unwrap();
        ctx.transport
            .on_json(Method::Get, "/state-versions/sv-1", 404, json!({}));

        let written = download_state_files(&ctx.client(), &fixtures::sample_graph(), &ctx.temp_path())
            .await
            .unwrap();
        assert!(written.is_empty());
    }
}
