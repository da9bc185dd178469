use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

/// Scripted `ProcessRunner` for tests.
///
/// Expectations are matched in registration order. An expectation limited with
/// `times(n)` stops matching after `n` calls, so the next matching expectation
/// answers instead; this is how a sequence of answers is scripted.
#[derive(Clone)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    program: String,
    #[allow(clippy::type_complexity)]
    args_matcher: Option<Box<dyn Fn(&[String]) -> bool + Send + Sync>>,
    response: MockResponse,
    times_called: usize,
    expected_times: Option<usize>,
}

enum MockResponse {
    Output(ProcessOutput),
    NotFound,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(Vec::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn expect_command(&self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                response: MockResponse::Output(ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::from_millis(10),
                }),
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        let history = self.call_history.lock().unwrap();
        let count = history.iter().filter(|cmd| cmd.program == program).count();
        count == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.call_history.lock().unwrap().clone()
    }

    /// Calls whose first argument is `subcommand` (e.g. `"stop"`).
    pub fn calls_with_subcommand(&self, subcommand: &str) -> Vec<ProcessCommand> {
        self.get_call_history()
            .into_iter()
            .filter(|cmd| cmd.args.first().map(String::as_str) == Some(subcommand))
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.call_history.lock().unwrap().push(command.clone());

        let mut expectations = self.expectations.lock().unwrap();

        for expectation in expectations.iter_mut() {
            if expectation.program != command.program {
                continue;
            }

            if let Some(ref args_matcher) = expectation.args_matcher {
                if !(args_matcher)(&command.args) {
                    continue;
                }
            }

            if let Some(expected) = expectation.expected_times {
                if expectation.times_called >= expected {
                    continue;
                }
            }

            expectation.times_called += 1;

            return match &expectation.response {
                MockResponse::Output(output) => Ok(output.clone()),
                MockResponse::NotFound => Err(ProcessError::CommandNotFound(command.program)),
            };
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "No expectation found for command: {} {:?}",
            command.program, command.args
        )))
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    /// Match calls whose first argument is `subcommand`.
    pub fn with_subcommand(self, subcommand: &str) -> Self {
        let subcommand = subcommand.to_string();
        self.with_args(move |args| args.first() == Some(&subcommand))
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        if let MockResponse::Output(ref mut output) = self.expectation.response {
            output.stdout = stdout.to_string();
        }
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        if let MockResponse::Output(ref mut output) = self.expectation.response {
            output.stderr = stderr.to_string();
        }
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        if let MockResponse::Output(ref mut output) = self.expectation.response {
            output.status = if code == 0 {
                ExitStatus::Success
            } else {
                ExitStatus::Error(code)
            };
        }
        self
    }

    pub fn returns_not_found(mut self) -> Self {
        self.expectation.response = MockResponse::NotFound;
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        self.runner
            .expectations
            .lock()
            .unwrap()
            .push(self.expectation);
    }
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::ProcessCommandBuilder;

    #[tokio::test]
    async fn test_mock_runner_basic() {
        let mock = MockProcessRunner::new();

        mock.expect_command("docker")
            .with_args(|args| args == ["ps"])
            .returns_stdout("CONTAINER ID\n")
            .finish();

        let output = mock
            .run(ProcessCommandBuilder::new("docker").arg("ps").build())
            .await
            .unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout, "CONTAINER ID\n");
        assert!(mock.verify_called("docker", 1));
    }

    #[tokio::test]
    async fn test_mock_runner_sequence_falls_through_exhausted_expectations() {
        let mock = MockProcessRunner::new();

        mock.expect_command("docker")
            .with_subcommand("inspect")
            .returns_stdout("false\n")
            .times(2)
            .finish();
        mock.expect_command("docker")
            .with_subcommand("inspect")
            .returns_stdout("true\n")
            .finish();

        let mut answers = Vec::new();
        for _ in 0..3 {
            let output = mock
                .run(ProcessCommandBuilder::new("docker").arg("inspect").build())
                .await
                .unwrap();
            answers.push(output.stdout);
        }

        assert_eq!(answers, vec!["false\n", "false\n", "true\n"]);
    }

    #[tokio::test]
    async fn test_mock_runner_without_expectation_fails() {
        let mock = MockProcessRunner::new();

        let result = mock
            .run(ProcessCommandBuilder::new("podman").arg("ps").build())
            .await;

        assert!(matches!(result, Err(ProcessError::MockExpectationNotMet(_))));
    }
}
