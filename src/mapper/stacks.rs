//! Workspaces become stacks and registry modules become modules.
//!
//! The VCS dialect is detected once from the repositories that split cleanly.

use tracing::{info, warn};

use super::model::{Module, ModuleVcs, Stack, StackVcs};
use super::terraform;
use super::vcs::{VcsDialect, VcsProvider};
use crate::audit::is_valid_variable_name;
use crate::config::MappingConfig;
use crate::error::Result;
use crate::expand::slugify;
use crate::source::{Record, SourceGraph};

/// Stacks plus the repository dialect they reveal. Modules are mapped from this.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedStacks {
    pub stacks: Vec<Stack>,
    pub dialect: VcsDialect,
}

/// Project if the record has one, else its organization.
pub(crate) fn space_of(record: &Record) -> Option<String> {
    record
        .project_id()
        .or_else(|| record.organization_id())
        .map(str::to_string)
}

#[derive(Clone, Copy)]
enum Sensitivity {
    Plain,
    Secret,
}

fn has_invalid_variable_name(graph: &SourceGraph, workspace_id: &str, kind: Sensitivity) -> bool {
    graph
        .workspace_variables
        .iter()
        .filter(|v| v.workspace_id() == Some(workspace_id))
        .filter(|v| match kind {
            Sensitivity::Plain => v.attr_bool("sensitive") != Some(true),
            Sensitivity::Secret => v.attr_bool("sensitive") != Some(false),
        })
        .any(|v| !is_valid_variable_name(v.attr_str("key").unwrap_or_default()))
}

fn map_stack(graph: &SourceGraph, config: &MappingConfig, workspace: &Record) -> Result<Stack> {
    let name = workspace.name().unwrap_or_default().to_string();

    let provider = match workspace.attr_str("vcs-repo.service-provider") {
        Some(service_provider) => Some(VcsProvider::from_service_provider(service_provider)?),
        None => {
            warn!(
                "Workspace '{}/{}' has no VCS configuration",
                workspace.organization_id().unwrap_or_default(),
                name
            );
            None
        }
    };

    let (namespace, repository) = match (provider, workspace.attr_str("vcs-repo.identifier")) {
        (Some(provider), Some(identifier)) if !identifier.is_empty() => {
            VcsDialect::of(provider).split(identifier).unzip()
        }
        _ => (None, None),
    };

    let auto_fix = config.auto_fix_variable_names;

    Ok(Stack {
        source_id: workspace.id.clone(),
        autodeploy: workspace.attr_bool("auto-apply").unwrap_or(false),
        description: workspace.attr_str("description").map(str::to_string),
        has_variables_with_invalid_name: !auto_fix
            && has_invalid_variable_name(graph, &workspace.id, Sensitivity::Plain),
        has_secret_variables_with_invalid_name: !auto_fix
            && has_invalid_variable_name(graph, &workspace.id, Sensitivity::Secret),
        slug: slugify(&name),
        name,
        labels: workspace.attr_str_list("tag-names"),
        terraform: terraform::select(
            workspace.attr_str("terraform-version"),
            config.custom_workflow_for_bsl_terraform,
        ),
        vcs: StackVcs {
            branch: workspace.attr_str("vcs-repo.branch").map(str::to_string),
            namespace,
            project_root: workspace.attr_str("working-directory").map(str::to_string),
            provider,
            repository,
        },
        space: space_of(workspace),
    })
}

/// Map every workspace to a stack. An unknown VCS provider aborts the mapping.
pub fn map_stacks(graph: &SourceGraph, config: &MappingConfig) -> Result<MappedStacks> {
    info!("Start mapping stacks data");

    let stacks = graph
        .workspaces
        .iter()
        .map(|workspace| map_stack(graph, config, workspace))
        .collect::<Result<Vec<_>>>()?;

    let uses = |dialect: VcsDialect| {
        stacks.iter().any(|s| {
            s.vcs.provider.map(VcsDialect::of) == Some(dialect) && s.vcs.repository.is_some()
        })
    };
    let dialect = if uses(VcsDialect::AzureDevOps) {
        VcsDialect::AzureDevOps
    } else if uses(VcsDialect::GitLab) {
        VcsDialect::GitLab
    } else {
        VcsDialect::Generic
    };

    info!("Stop mapping stacks data");
    Ok(MappedStacks { stacks, dialect })
}

/// Map registry modules using the dialect detected on the stacks.
pub fn map_modules(graph: &SourceGraph, stacks: &MappedStacks) -> Vec<Module> {
    info!("Start mapping modules data");

    let provider = stacks.dialect.module_provider();
    match stacks.dialect {
        VcsDialect::GitLab => warn!(
            "GitLab VCS provider detected while exporting workspaces. Modules will be mapped as GitLab."
        ),
        VcsDialect::AzureDevOps => warn!(
            "Azure DevOps VCS provider detected while exporting workspaces. Modules will be mapped as Azure DevOps."
        ),
        VcsDialect::Generic => {}
    }

    let modules = graph
        .modules
        .iter()
        .map(|module| {
            let (namespace, repository) = module
                .attr_str("vcs-repo.identifier")
                .filter(|identifier| !identifier.is_empty())
                .and_then(|identifier| stacks.dialect.split(identifier))
                .unzip();

            Module {
                source_id: module.id.clone(),
                name: module.name().unwrap_or_default().to_string(),
                status: module.attr_str("status").map(str::to_string),
                terraform_provider: module.attr_str("provider").map(str::to_string),
                visibility: module.attr_str("registry-name").map(str::to_string),
                vcs: ModuleVcs {
                    branch: module.attr_str("vcs-repo.branch").map(str::to_string),
                    namespace,
                    provider,
                    repository,
                },
                space: space_of(module),
            }
        })
        .collect();

    info!("Stop mapping modules data");
    modules
}
