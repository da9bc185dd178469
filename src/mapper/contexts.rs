//! Variable sets become contexts.
//!
//! A context lives in one space while a variable set can be attached to several
//! projects, so a project-attached set is copied once per project. Copies get a
//! `{project}_{id}` source id.

use std::collections::BTreeSet;
use tracing::{info, warn};

use super::model::{Context, ContextVariable};
use super::variables::variable_fields;
use crate::source::{Record, SourceGraph};

const AUTOATTACH: &str = "autoattach:*";

/// Where one copy of a variable set lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Project id for per-project copies.
    pub prefix: Option<String>,
    pub space: Option<String>,
    pub labels: Vec<String>,
    pub stacks: Vec<String>,
}

impl Placement {
    pub fn source_id(&self, id: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{id}"),
            None => id.to_string(),
        }
    }
}

/// Every context a variable set maps to.
///
/// A set attached to projects and also to workspaces outside those projects gets
/// one extra workspace-scoped placement for the remaining workspaces.
pub fn placements(graph: &SourceGraph, variable_set: &Record) -> Vec<Placement> {
    let organization = variable_set.organization_id().map(str::to_string);

    if variable_set.attr_bool("global") == Some(true) {
        return vec![Placement {
            prefix: None,
            space: organization,
            labels: vec![AUTOATTACH.to_string()],
            stacks: Vec::new(),
        }];
    }

    let projects: Vec<&str> = variable_set
        .related_many("projects")
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    let workspaces: Vec<&str> = variable_set
        .related_many("workspaces")
        .iter()
        .map(|w| w.id.as_str())
        .collect();

    let mut placements: Vec<Placement> = projects
        .iter()
        .map(|project| {
            info!("Append context copy '{}' / '{}'", project, variable_set.id);
            Placement {
                prefix: Some(project.to_string()),
                space: Some(project.to_string()),
                labels: vec![AUTOATTACH.to_string()],
                stacks: Vec::new(),
            }
        })
        .collect();

    let covered: BTreeSet<&str> = projects.iter().copied().collect();
    let remaining: Vec<String> = workspaces
        .iter()
        .filter(|id| {
            let project = graph.workspace(id).and_then(Record::project_id);
            !project.is_some_and(|p| covered.contains(p))
        })
        .map(|id| id.to_string())
        .collect();

    if !remaining.is_empty() {
        placements.push(Placement {
            prefix: None,
            space: organization,
            labels: Vec::new(),
            stacks: remaining,
        });
    }

    if placements.is_empty() {
        warn!(
            "Variable set '{}' is not attached to any project or workspace. Skipping.",
            variable_set.id
        );
    }
    placements
}

pub fn map_contexts(graph: &SourceGraph) -> Vec<Context> {
    info!("Start mapping contexts data");

    let contexts = graph
        .variable_sets
        .iter()
        .flat_map(|variable_set| {
            placements(graph, variable_set)
                .into_iter()
                .map(move |placement| Context {
                    source_id: placement.source_id(&variable_set.id),
                    description: variable_set.attr_str("description").map(str::to_string),
                    labels: placement.labels,
                    name: variable_set.name().unwrap_or_default().to_string(),
                    space: placement.space,
                    stacks: placement.stacks,
                })
        })
        .collect();

    info!("Stop mapping contexts data");
    contexts
}

pub fn map_context_variables(graph: &SourceGraph, auto_fix: bool) -> Vec<ContextVariable> {
    info!("Start mapping context variables data");

    let mut mapped = Vec::new();
    for variable in &graph.variable_set_variables {
        let Some(variable_set) = variable.varset_id().and_then(|id| graph.variable_set(id)) else {
            warn!(
                "Could not find variable set '{}'",
                variable.varset_id().unwrap_or_default()
            );
            continue;
        };

        for placement in placements(graph, variable_set) {
            mapped.push(ContextVariable {
                source_id: placement.source_id(&variable.id),
                fields: variable_fields(variable, auto_fix),
                space: placement.space.clone(),
                context: Some(placement.source_id(&variable_set.id)),
            });
        }
    }

    info!("Stop mapping context variables data");
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use serde_json::json;

    fn attach(graph: &mut SourceGraph, projects: &[&str], workspaces: &[&str]) {
        let refs = |kind: &str, ids: &[&str]| {
            json!({"data": ids.iter().map(|id| json!({"id": id, "type": kind})).collect::<Vec<_>>()})
        };
        let raw = json!({
            "id": "varset-1",
            "attributes": {"name": "shared", "description": "Shared credentials", "global": false},
            "relationships": {
                "organization": {"data": {"id": "acme", "type": "organizations"}},
                "projects": refs("projects", projects),
                "workspaces": refs("workspaces", workspaces)
            }
        });
        graph.variable_sets = vec![Record::from_resource(&raw)];
    }

    #[test]
    fn test_set_on_two_projects_becomes_two_contexts() {
        let mut graph = fixtures::sample_graph();
        attach(&mut graph, &["prj-1", "prj-2"], &[]);

        let contexts = map_contexts(&graph);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].source_id, "prj-1_varset-1");
        assert_eq!(contexts[1].source_id, "prj-2_varset-1");
        assert_eq!(contexts[0].name, contexts[1].name);
        assert_eq!(contexts[0].description, contexts[1].description);
        assert_eq!(contexts[1].space.as_deref(), Some("prj-2"));
        assert_eq!(contexts[0].labels, vec!["autoattach:*"]);

        let variables = map_context_variables(&graph, false);
        assert_eq!(variables.len(), 2);
        assert_eq!(variables[0].source_id, "prj-1_vsvar-1");
        assert_eq!(variables[1].context.as_deref(), Some("prj-2_varset-1"));
    }

    #[test]
    fn test_workspace_attached_set_keeps_its_attachments() {
        let mut graph = fixtures::sample_graph();
        attach(&mut graph, &[], &["ws-1", "ws-2"]);

        let contexts = map_contexts(&graph);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].source_id, "varset-1");
        assert_eq!(contexts[0].space.as_deref(), Some("acme"));
        assert_eq!(contexts[0].stacks, vec!["ws-1", "ws-2"]);
        assert!(contexts[0].labels.is_empty());
    }

    #[test]
    fn test_mixed_attachment_adds_context_for_uncovered_workspaces() {
        let mut graph = fixtures::sample_graph();
        // ws-1 is in prj-1 already
        attach(&mut graph, &["prj-1"], &["ws-1", "ws-2"]);

        let contexts = map_contexts(&graph);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].source_id, "prj-1_varset-1");
        assert_eq!(contexts[1].source_id, "varset-1");
        assert_eq!(contexts[1].stacks, vec!["ws-2"]);

        let variables = map_context_variables(&graph, false);
        let ids: Vec<_> = variables.iter().map(|v| v.source_id.as_str()).collect();
        assert_eq!(ids, vec!["prj-1_vsvar-1", "vsvar-1"]);
    }

    #[test]
    fn test_global_set_autoattaches_in_organization() {
        let mut graph = fixtures::sample_graph();
        graph.variable_sets[0].set_attr("global", json!(true));

        let contexts = map_contexts(&graph);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].source_id, "varset-1");
        assert_eq!(contexts[0].space.as_deref(), Some("acme"));
        assert_eq!(contexts[0].labels, vec!["autoattach:*"]);
    }
}
