//! Terraform version handling and workflow-tool selection.

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Last Terraform release published under the permissive license.
pub const LAST_OPEN_RELEASE: Version = Version::new(1, 5, 7);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowTool {
    TerraformFoss,
    OpenTofu,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionClass {
    /// `latest`, or no version at all.
    Latest,
    /// `~`/`^`-prefixed constraint.
    Constraint(String),
    Exact(Version),
    Unparseable(String),
}

pub fn classify(raw: Option<&str>) -> VersionClass {
    let raw = match raw.map(str::trim) {
        None | Some("") | Some("latest") => return VersionClass::Latest,
        Some(raw) => raw,
    };

    if raw.starts_with('~') || raw.starts_with('^') {
        return VersionClass::Constraint(raw.to_string());
    }

    match parse_lenient(raw) {
        Some(version) => VersionClass::Exact(version),
        None => VersionClass::Unparseable(raw.to_string()),
    }
}

/// Parse `1.5.7`, `1.5` or `v1.5.7`.
fn parse_lenient(raw: &str) -> Option<Version> {
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let padded = match raw.matches('.').count() {
        0 => format!("{raw}.0.0"),
        1 => format!("{raw}.0"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

pub fn is_source_licensed(version: &Version) -> bool {
    *version > LAST_OPEN_RELEASE
}

/// Version and tool a stack runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerraformSettings {
    pub version: String,
    pub workflow_tool: WorkflowTool,
}

/// Pick the toolchain for a workspace's declared version.
///
/// With `custom_for_source_licensed` every selection that would need the
/// alternate toolchain becomes [`WorkflowTool::Custom`] instead.
pub fn select(raw: Option<&str>, custom_for_source_licensed: bool) -> TerraformSettings {
    let alternate = if custom_for_source_licensed {
        WorkflowTool::Custom
    } else {
        WorkflowTool::OpenTofu
    };

    match classify(raw) {
        VersionClass::Latest => TerraformSettings {
            version: LAST_OPEN_RELEASE.to_string(),
            workflow_tool: WorkflowTool::TerraformFoss,
        },
        VersionClass::Constraint(constraint) => TerraformSettings {
            version: constraint,
            workflow_tool: alternate,
        },
        VersionClass::Exact(version) => TerraformSettings {
            workflow_tool: if is_source_licensed(&version) {
                alternate
            } else {
                WorkflowTool::TerraformFoss
            },
            version: raw.unwrap_or_default().trim().to_string(),
        },
        VersionClass::Unparseable(raw) => {
            warn!("Unrecognized Terraform version '{}', assuming a source-licensed release", raw);
            TerraformSettings {
                version: raw,
                workflow_tool: alternate,
            }
        }
    }
}
