//! Operator interaction: the confirmation gate before live workspaces are touched.

use async_trait::async_trait;
use std::io::{self, Write};

use crate::error::Result;

#[async_trait]
pub trait UserInteraction: Send + Sync {
    /// Ask a yes/no question. Anything but an explicit yes is a no.
    async fn prompt_yes_no(&self, message: &str) -> Result<bool>;

    fn display_info(&self, message: &str);

    fn display_warning(&self, message: &str);
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalInteraction;

impl TerminalInteraction {
    pub fn new() -> Self {
        Self
    }

    fn read_line() -> Result<String> {
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    pub fn parse_answer(input: &str) -> bool {
        matches!(input.to_lowercase().as_str(), "y" | "yes")
    }
}

#[async_trait]
impl UserInteraction for TerminalInteraction {
    async fn prompt_yes_no(&self, message: &str) -> Result<bool> {
        print!("{message} [y/N]: ");
        io::stdout().flush()?;

        let input = Self::read_line()?;
        Ok(Self::parse_answer(&input))
    }

    fn display_info(&self, message: &str) {
        println!("{message}");
    }

    fn display_warning(&self, message: &str) {
        eprintln!("Warning: {message}");
    }
}

/// Answers yes to everything (`--yes`).
#[derive(Debug, Default)]
pub struct AutoConfirm;

#[async_trait]
impl UserInteraction for AutoConfirm {
    async fn prompt_yes_no(&self, message: &str) -> Result<bool> {
        tracing::info!("Auto-confirming: {}", message.lines().last().unwrap_or(message));
        Ok(true)
    }

    fn display_info(&self, message: &str) {
        println!("{message}");
    }

    fn display_warning(&self, message: &str) {
        eprintln!("Warning: {message}");
    }
}
