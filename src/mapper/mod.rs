//! Source graph to target schema.
//!
//! Stages run in a fixed order and each takes the typed output it depends on:
//! spaces, then stacks (which fix the VCS dialect), then modules and stack
//! variables from the mapped stacks, then contexts. Spaces are marked last.

pub mod contexts;
pub mod model;
pub mod stacks;
pub mod terraform;
pub mod variables;
pub mod vcs;

use tracing::{info, warn};

use crate::config::MappingConfig;
use crate::error::Result;
use crate::source::SourceGraph;

pub use model::{
    Context, ContextVariable, Link, MappedRecord, Module, Space, Stack, StackVariable,
    VariableType,
};
pub use stacks::MappedStacks;
pub use terraform::{TerraformSettings, WorkflowTool};
pub use vcs::{VcsDialect, VcsProvider};

/// Spaces, before any stack has been seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Spaces(pub Vec<Space>);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedGraph {
    pub spaces: Vec<Space>,
    pub contexts: Vec<Context>,
    pub context_variables: Vec<ContextVariable>,
    pub stacks: Vec<Stack>,
    pub modules: Vec<Module>,
    pub stack_variables: Vec<StackVariable>,
}

/// One space per organization, then one per project.
pub fn map_spaces(graph: &SourceGraph) -> Spaces {
    info!("Start mapping spaces data");

    let spaces = graph
        .organizations
        .iter()
        .chain(&graph.projects)
        .map(|record| Space {
            source_id: record.id.clone(),
            name: record.name().unwrap_or_default().to_string(),
            requires_terraform_workflow_tool: false,
        })
        .collect();

    info!("Stop mapping spaces data");
    Spaces(spaces)
}

/// Flag the spaces of stacks that need the custom workflow tool.
pub fn mark_custom_workflow_spaces(spaces: Spaces, stacks: &MappedStacks) -> Vec<Space> {
    info!("Start marking spaces for Terraform custom workflow");

    let Spaces(mut spaces) = spaces;
    for stack in stacks
        .stacks
        .iter()
        .filter(|s| s.terraform.workflow_tool == WorkflowTool::Custom)
    {
        let Some(space_id) = stack.space.as_deref() else {
            continue;
        };
        match spaces.iter_mut().find(|s| s.source_id == space_id) {
            Some(space) => space.requires_terraform_workflow_tool = true,
            None => warn!("Could not find space '{}'", space_id),
        }
    }

    info!("Stop marking spaces for Terraform custom workflow");
    spaces
}

pub struct Mapper<'a> {
    config: &'a MappingConfig,
}

impl<'a> Mapper<'a> {
    pub fn new(config: &'a MappingConfig) -> Self {
        Self { config }
    }

    pub fn map(&self, graph: &SourceGraph) -> Result<MappedGraph> {
        info!("Start mapping data");

        let spaces = map_spaces(graph);
        let stacks = stacks::map_stacks(graph, self.config)?;
        let modules = stacks::map_modules(graph, &stacks);
        let stack_variables =
            variables::map_stack_variables(graph, &stacks, self.config.auto_fix_variable_names);

        let (contexts, context_variables) = if self.config.experimental_support_variable_sets {
            (
                contexts::map_contexts(graph),
                contexts::map_context_variables(graph, self.config.auto_fix_variable_names),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let spaces = mark_custom_workflow_spaces(spaces, &stacks);

        info!("Stop mapping data");
        Ok(MappedGraph {
            spaces,
            contexts,
            context_variables,
            stacks: stacks.stacks,
            modules,
            stack_variables,
        })
    }
}
