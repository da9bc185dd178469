//! Name filters from the `[include]` section.

use regex::Regex;
use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

const SKIP: &str = "none";

/// A regular expression matched from the start of the name, or an explicit list of names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NameFilter {
    Pattern(String),
    Names(Vec<String>),
}

/// What an extractor should do for one entity kind.
#[derive(Debug, Clone)]
pub enum Selection {
    Skip,
    Include(Option<Regex>),
}

impl Selection {
    pub fn resolve(filter: Option<&NameFilter>) -> Result<Self> {
        match filter {
            None => Ok(Selection::Include(None)),
            Some(filter) => filter.compile(),
        }
    }

    /// Exact-name selection read from a newline-separated file. Blank lines are ignored.
    pub fn from_list_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read workspace list file {}: {}",
                path.display(),
                e
            ))
        })?;

        let names: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        tracing::info!("Loaded {} workspaces from {}", names.len(), path.display());
        NameFilter::Names(names).compile()
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Selection::Skip)
    }

    pub fn pattern(&self) -> Option<Regex> {
        match self {
            Selection::Include(pattern) => pattern.clone(),
            Selection::Skip => None,
        }
    }
}

impl NameFilter {
    /// `"none"` and an empty name list both select nothing.
    pub fn is_skip(&self) -> bool {
        match self {
            NameFilter::Pattern(pattern) => pattern == SKIP,
            NameFilter::Names(names) => names.is_empty(),
        }
    }

    pub fn compile(&self) -> Result<Selection> {
        if self.is_skip() {
            return Ok(Selection::Skip);
        }
        match self {
            NameFilter::Pattern(pattern) => {
                Ok(Selection::Include(Some(crate::source::include_pattern(pattern)?)))
            }
            NameFilter::Names(names) => {
                let alternatives: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
                let regex = Regex::new(&format!("^(?:{})$", alternatives.join("|")))?;
                Ok(Selection::Include(Some(regex)))
            }
        }
    }
}
