use thiserror::Error;

use crate::subprocess::ProcessError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid include pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("HTTP error {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timeout for {0}")]
    Timeout(String),

    #[error("Connection error for {0}")]
    Connection(String),

    #[error("Error for {url}: {message}")]
    Request { url: String, message: String },

    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    #[error("Could not trigger a plan for the '{organization_id}/{workspace_id}' workspace")]
    Plan {
        organization_id: String,
        workspace_id: String,
    },

    #[error("Could not read plan log {}: {source}", path.display())]
    PlanLog {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to verify container '{container}' has started")]
    AgentStart { container: String },

    #[error("Unknown VCS provider name ({0})")]
    UnknownVcsProvider(String),

    #[error("Container runtime error: {0}")]
    Container(String),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),
}

impl Error {
    /// Whether the error comes from the transport layer (status, timeout, connection).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::HttpStatus { .. }
                | Error::Timeout(_)
                | Error::Connection(_)
                | Error::Request { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
