//! VCS provider translation and repository identifier layouts.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsProvider {
    GithubCustom,
    BitbucketDatacenter,
    Gitlab,
    AzureDevops,
}

impl VcsProvider {
    /// Translate a source `service-provider` value.
    pub fn from_service_provider(name: &str) -> Result<Self> {
        match name {
            "github" | "github_app" | "github_enterprise" => Ok(Self::GithubCustom),
            "bitbucket_server" => Ok(Self::BitbucketDatacenter),
            "gitlab_hosted" => Ok(Self::Gitlab),
            "ado_services" => Ok(Self::AzureDevops),
            other => Err(Error::UnknownVcsProvider(other.to_string())),
        }
    }
}

/// How repository identifiers are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VcsDialect {
    /// `namespace/repository`
    #[default]
    Generic,
    /// `group/subgroup/.../repository`
    GitLab,
    /// `organization/project/_git/repository`
    AzureDevOps,
}

impl VcsDialect {
    pub fn of(provider: VcsProvider) -> Self {
        match provider {
            VcsProvider::Gitlab => Self::GitLab,
            VcsProvider::AzureDevops => Self::AzureDevOps,
            VcsProvider::GithubCustom | VcsProvider::BitbucketDatacenter => Self::Generic,
        }
    }

    /// Provider modules are registered with under this dialect.
    pub fn module_provider(self) -> VcsProvider {
        match self {
            Self::Generic => VcsProvider::GithubCustom,
            Self::GitLab => VcsProvider::Gitlab,
            Self::AzureDevOps => VcsProvider::AzureDevops,
        }
    }

    /// Split an identifier into `(namespace, repository)`.
    ///
    /// Identifiers with too few segments for the layout yield `None`.
    pub fn split(self, identifier: &str) -> Option<(String, String)> {
        let segments: Vec<&str> = identifier.split('/').collect();

        let split = match self {
            Self::Generic if segments.len() >= 2 => {
                Some((segments[0].to_string(), segments[1].to_string()))
            }
            Self::GitLab if segments.len() >= 2 => segments
                .split_last()
                .map(|(repository, namespace)| (namespace.join("/"), repository.to_string())),
            Self::AzureDevOps if segments.len() >= 4 => {
                Some((segments[1].to_string(), segments[3].to_string()))
            }
            _ => None,
        };

        if split.is_none() {
            warn!(
                "VCS identifier '{}' does not match the {:?} layout; namespace and repository left empty",
                identifier, self
            );
        }
        split
    }
}
