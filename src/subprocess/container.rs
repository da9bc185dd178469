//! Container runtime driven through the `docker`/`podman` command line.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::builder::ProcessCommandBuilder;
use super::error::ProcessError;
use super::runner::ProcessRunner;

/// What to run and how.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: Option<String>,
    pub image: String,
    /// Passed as `-e KEY` with the value set on the CLI process, so values never
    /// show up in the argument list.
    pub env: Vec<(String, String)>,
    /// `(host, container)` bind mounts.
    pub volumes: Vec<(String, String)>,
    /// `always`, `missing` or `never`.
    pub pull: Option<String>,
}

impl ContainerSpec {
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn volume(mut self, host: &str, container: &str) -> Self {
        self.volumes.push((host.to_string(), container.to_string()));
        self
    }

    pub fn pull(mut self, policy: &str) -> Self {
        self.pull = Some(policy.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Binary name, for log messages.
    fn binary(&self) -> &str;

    async fn is_available(&self) -> bool;

    /// Start a detached, auto-removing container and return its id.
    async fn start(&self, spec: &ContainerSpec) -> Result<String, ProcessError>;

    /// Run an auto-removing container to completion and return its output.
    async fn run(&self, spec: &ContainerSpec) -> Result<String, ProcessError>;

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, ProcessError>;

    /// `false` when the container does not exist.
    async fn is_running(&self, name: &str) -> Result<bool, ProcessError>;

    async fn logs(&self, name: &str) -> Result<String, ProcessError>;

    async fn stop(&self, name: &str) -> Result<(), ProcessError>;
}

/// An unresponsive daemon counts as unavailable.
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CliContainerRuntime {
    runner: Arc<dyn ProcessRunner>,
    binary: String,
}

impl CliContainerRuntime {
    pub fn new(runner: Arc<dyn ProcessRunner>, binary: &str) -> Self {
        Self {
            runner,
            binary: binary.to_string(),
        }
    }

    fn run_args(&self, spec: &ContainerSpec, detach: bool) -> ProcessCommandBuilder {
        let mut builder = ProcessCommandBuilder::new(&self.binary).arg("run").arg("--rm");

        if detach {
            builder = builder.arg("--detach");
        }
        if let Some(ref name) = spec.name {
            builder = builder.args(["--name", name]);
        }
        if let Some(ref pull) = spec.pull {
            builder = builder.arg(&format!("--pull={pull}"));
        }
        for (key, value) in &spec.env {
            builder = builder.args(["--env", key]).env(key, value);
        }
        for (host, container) in &spec.volumes {
            builder = builder.args(["--volume", &format!("{host}:{container}")]);
        }

        builder.arg(&spec.image)
    }

    async fn stdout_of(&self, builder: ProcessCommandBuilder) -> Result<String, ProcessError> {
        let command = builder.build();
        let output = self.runner.run(command.clone()).await?;
        output.into_stdout(&command)
    }
}

#[async_trait]
impl ContainerRuntime for CliContainerRuntime {
    fn binary(&self) -> &str {
        &self.binary
    }

    async fn is_available(&self) -> bool {
        let command = ProcessCommandBuilder::new(&self.binary)
            .arg("ps")
            .timeout(AVAILABILITY_TIMEOUT)
            .build();
        match self.runner.run(command).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!("{} is not available: {}", self.binary, e);
                false
            }
        }
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<String, ProcessError> {
        let stdout = self.stdout_of(self.run_args(spec, true)).await?;
        Ok(stdout.trim().to_string())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String, ProcessError> {
        self.stdout_of(self.run_args(spec, false)).await
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, ProcessError> {
        let stdout = self
            .stdout_of(
                ProcessCommandBuilder::new(&self.binary)
                    .args(["ps", "--format", "{{.ID}}\t{{.Names}}\t{{.State}}"]),
            )
            .await?;

        Ok(stdout.lines().filter_map(parse_ps_line).collect())
    }

    async fn is_running(&self, name: &str) -> Result<bool, ProcessError> {
        let command = ProcessCommandBuilder::new(&self.binary)
            .args(["inspect", "--format", "{{.State.Running}}", name])
            .build();
        let output = self.runner.run(command).await?;

        if !output.status.success() {
            return Ok(false);
        }
        Ok(output.stdout.trim() == "true")
    }

    async fn logs(&self, name: &str) -> Result<String, ProcessError> {
        self.stdout_of(ProcessCommandBuilder::new(&self.binary).args(["logs", name]))
            .await
    }

    /// A container that no longer exists counts as stopped.
    async fn stop(&self, name: &str) -> Result<(), ProcessError> {
        match self
            .stdout_of(ProcessCommandBuilder::new(&self.binary).args(["stop", name]))
            .await
        {
            Ok(_) => Ok(()),
            Err(ProcessError::ExitCode { ref stderr, .. }) if is_missing_container(stderr) => {
                tracing::debug!("Container '{}' is already gone", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Docker and podman word the missing-container error differently.
fn is_missing_container(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such container") || stderr.contains("no container with name or id")
}

fn parse_ps_line(line: &str) -> Option<ContainerSummary> {
    let mut parts = line.split('\t');
    let id = parts.next()?.trim();
    let name = parts.next()?.trim();
    let state = parts.next().unwrap_or("running").trim();

    if id.is_empty() {
        return None;
    }

    Some(ContainerSummary {
        id: id.to_string(),
        name: name.to_string(),
        state: state.to_string(),
    })
}
