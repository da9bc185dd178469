//! Workspace variables become stack variables.

use tracing::{info, warn};

use super::model::{StackVariable, VariableFields, VariableType};
use super::stacks::MappedStacks;
use crate::audit::is_valid_variable_name;
use crate::source::{Record, SourceGraph};

/// Target fields of a workspace or variable set variable.
pub(crate) fn variable_fields(variable: &Record, auto_fix: bool) -> VariableFields {
    let key = variable.attr_str("key").unwrap_or_default().to_string();
    let valid_name = is_valid_variable_name(&key);

    let replacement_name = if auto_fix && !valid_name {
        key.replace('-', "_")
    } else {
        key.clone()
    };

    VariableFields {
        description: variable.attr_str("description").map(str::to_string),
        hcl: variable.attr_bool("hcl").unwrap_or(false),
        replacement_name,
        kind: if variable.attr_str("category") == Some("terraform") {
            VariableType::Terraform
        } else {
            VariableType::EnvVar
        },
        valid_name,
        value: variable.attr("value").cloned(),
        write_only: variable.attr_bool("sensitive") != Some(false),
        name: key,
    }
}

/// Map workspace variables onto the stacks mapped from their workspaces.
pub fn map_stack_variables(
    graph: &SourceGraph,
    stacks: &MappedStacks,
    auto_fix: bool,
) -> Vec<StackVariable> {
    info!("Start mapping stack variables data");

    let variables = graph
        .workspace_variables
        .iter()
        .map(|variable| {
            let workspace_id = variable.workspace_id().map(str::to_string);
            let stack = workspace_id
                .as_deref()
                .and_then(|id| stacks.stacks.iter().find(|s| s.source_id == id));
            if stack.is_none() {
                warn!(
                    "Could not find workspace '{}'",
                    workspace_id.as_deref().unwrap_or_default()
                );
            }

            StackVariable {
                source_id: variable.id.clone(),
                fields: variable_fields(variable, auto_fix),
                space: stack.and_then(|s| s.space.clone()),
                stack: workspace_id,
            }
        })
        .collect();

    info!("Stop mapping stack variables data");
    variables
}
