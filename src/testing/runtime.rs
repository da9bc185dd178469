//! In-memory container runtime.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::subprocess::{ContainerRuntime, ContainerSpec, ContainerSummary, ProcessError};

#[derive(Default)]
struct RuntimeState {
    unavailable: bool,
    fail_start: bool,
    never_running: bool,
    fail_run: bool,
    logs: String,
    running: BTreeSet<String>,
    started: Vec<ContainerSpec>,
    runs: Vec<ContainerSpec>,
    stopped: Vec<String>,
}

/// Tracks started and stopped containers; failures can be switched on per instance.
#[derive(Clone, Default)]
pub struct MockContainerRuntime {
    state: Arc<Mutex<RuntimeState>>,
}

impl MockContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable(self) -> Self {
        self.state.lock().unwrap().unavailable = true;
        self
    }

    pub fn failing_start(self) -> Self {
        self.state.lock().unwrap().fail_start = true;
        self
    }

    /// Containers start but never report as running.
    pub fn never_running(self) -> Self {
        self.state.lock().unwrap().never_running = true;
        self
    }

    pub fn failing_run(self) -> Self {
        self.state.lock().unwrap().fail_run = true;
        self
    }

    pub fn with_logs(self, logs: &str) -> Self {
        self.state.lock().unwrap().logs = logs.to_string();
        self
    }

    /// The named container exits on its own, as if it crashed.
    pub fn exit(&self, name: &str) {
        self.state.lock().unwrap().running.remove(name);
    }

    pub fn started(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn runs(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn running(&self) -> Vec<String> {
        self.state.lock().unwrap().running.iter().cloned().collect()
    }
}

fn failure(command: &str) -> ProcessError {
    ProcessError::ExitCode {
        command: command.to_string(),
        code: 125,
        stderr: "mock failure".to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    fn binary(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        !self.state.lock().unwrap().unavailable
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<String, ProcessError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(failure("mock run --detach"));
        }

        state.started.push(spec.clone());
        let name = spec.name.clone().unwrap_or_default();
        if !state.never_running {
            state.running.insert(name);
        }
        Ok(format!("cid-{}", state.started.len()))
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String, ProcessError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_run {
            return Err(failure("mock run"));
        }
        state.runs.push(spec.clone());
        Ok("configuration uploaded".to_string())
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, ProcessError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .running
            .iter()
            .enumerate()
            .map(|(i, name)| ContainerSummary {
                id: format!("cid-{}", i + 1),
                name: name.clone(),
                state: "running".to_string(),
            })
            .collect())
    }

    async fn is_running(&self, name: &str) -> Result<bool, ProcessError> {
        Ok(self.state.lock().unwrap().running.contains(name))
    }

    async fn logs(&self, _name: &str) -> Result<String, ProcessError> {
        Ok(self.state.lock().unwrap().logs.clone())
    }

    async fn stop(&self, name: &str) -> Result<(), ProcessError> {
        let mut state = self.state.lock().unwrap();
        state.running.remove(name);
        state.stopped.push(name.to_string());
        Ok(())
    }
}
