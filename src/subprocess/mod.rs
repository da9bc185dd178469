pub mod builder;
pub mod container;
pub mod error;
pub mod mock;
pub mod runner;

pub use builder::ProcessCommandBuilder;
pub use container::{CliContainerRuntime, ContainerRuntime, ContainerSpec, ContainerSummary};
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

use std::sync::Arc;

#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(runner::TokioProcessRunner))
    }

    pub fn mock() -> (Self, MockProcessRunner) {
        let mock = MockProcessRunner::new();
        let runner = Arc::new(mock.clone()) as Arc<dyn ProcessRunner>;
        (Self::new(runner), mock)
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }

    /// Container runtime driven through the given CLI binary (`docker` or `podman`).
    pub fn container(&self, binary: &str) -> CliContainerRuntime {
        CliContainerRuntime::new(Arc::clone(&self.runner), binary)
    }

    /// First container CLI that answers `ps`, trying `docker` then `podman`.
    pub async fn detect_container_runtime(&self) -> Option<CliContainerRuntime> {
        for binary in ["docker", "podman"] {
            let runtime = self.container(binary);
            if runtime.is_available().await {
                return Some(runtime);
            }
        }
        None
    }
}
