use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::interaction::UserInteraction;

/// Answers prompts from a queue and records every message shown.
#[derive(Clone, Default)]
pub struct MockUserInteraction {
    yes_no_responses: Arc<Mutex<Vec<bool>>>,
    messages: Arc<Mutex<Vec<String>>>,
}

impl MockUserInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer; answers are consumed first-in first-out.
    pub fn add_yes_no_response(&self, response: bool) {
        self.yes_no_responses.lock().unwrap().insert(0, response);
    }

    pub fn answering(responses: &[bool]) -> Self {
        let mock = Self::new();
        for response in responses {
            mock.add_yes_no_response(*response);
        }
        mock
    }

    pub fn get_messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.get_messages()
            .into_iter()
            .filter(|m| m.starts_with("PROMPT: "))
            .collect()
    }
}

#[async_trait]
impl UserInteraction for MockUserInteraction {
    async fn prompt_yes_no(&self, message: &str) -> Result<bool> {
        self.messages
            .lock()
            .unwrap()
            .push(format!("PROMPT: {message}"));
        self.yes_no_responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| Error::Config("No mock response configured".to_string()))
    }

    fn display_info(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(format!("INFO: {message}"));
    }

    fn display_warning(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(format!("WARN: {message}"));
    }
}
