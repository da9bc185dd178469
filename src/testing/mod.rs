//! Testing utilities and fixtures
//!
//! Mocks for every collaborator the pipeline talks to (HTTP, container
//! runtime, operator) plus canned source data.

pub mod fixtures;
pub mod interaction;
pub mod runtime;
pub mod transport;

pub use interaction::MockUserInteraction;
pub use runtime::MockContainerRuntime;
pub use transport::{MockFailure, MockTransport};

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Settings;
use crate::source::ApiClient;

/// Test context wiring mocks into a client and settings rooted in a temp dir
pub struct TestContext {
    pub transport: MockTransport,
    pub runtime: MockContainerRuntime,
    pub interaction: MockUserInteraction,
    pub settings: Settings,
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;

        let mut settings = Settings::default();
        settings.source.api_endpoint = "https://tfe.example.com".to_string();
        settings.source.api_token = "test-token".to_string();
        settings.enrichment.log_dir = temp_dir.path().join("plan-logs");
        settings.enrichment.work_dir = temp_dir.path().to_path_buf();
        settings.enrichment.plan_poll_interval_secs = 0;
        settings.enrichment.agent_start_interval_secs = 0;

        Ok(Self {
            transport: MockTransport::new(),
            runtime: MockContainerRuntime::new(),
            interaction: MockUserInteraction::new(),
            settings,
            temp_dir,
        })
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(
            Arc::new(self.transport.clone()),
            &self.settings.source.api_endpoint,
            &self.settings.source.api_token,
        )
    }

    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Drop a plan log where the agent would have shipped it.
    pub fn write_plan_log(&self, run_id: &str, content: &str) -> std::io::Result<PathBuf> {
        let dir = &self.settings.enrichment.log_dir;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{run_id}.txt"));
        std::fs::write(&path, content)?;
        Ok(path)
    }
}
