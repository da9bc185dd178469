//! Mapping and expansion over source graphs shaped like real exports.

use serde_json::{json, Value};

use stackport::config::MappingConfig;
use stackport::error::Error;
use stackport::pipeline::map_and_expand;
use stackport::source::{Record, Reference, Relationship, SourceGraph};
use stackport::testing::fixtures;

fn with_variable_sets() -> MappingConfig {
    MappingConfig {
        experimental_support_variable_sets: true,
        ..MappingConfig::default()
    }
}

fn gitlab_graph() -> SourceGraph {
    let mut graph = fixtures::sample_graph();
    graph.workspaces[0].set_attr("vcs-repo.service-provider", json!("gitlab_hosted"));
    graph.workspaces[0].set_attr("vcs-repo.identifier", json!("acme/platform/networking"));
    graph.modules[0].set_attr(
        "vcs-repo.identifier",
        json!("acme/modules/terraform-aws-vpc"),
    );
    graph
}

#[test]
fn test_gitlab_repositories_switch_module_dialect() {
    let expanded = map_and_expand(&gitlab_graph(), &MappingConfig::default()).unwrap();

    let stack = &expanded.collection("stacks")[0];
    assert_eq!(stack["vcs"]["provider"], json!("gitlab"));
    assert_eq!(stack["vcs"]["namespace"], json!("acme/platform"));
    assert_eq!(stack["vcs"]["repository"], json!("networking"));

    let module = &expanded.collection("modules")[0];
    assert_eq!(module["vcs"]["provider"], json!("gitlab"));
    assert_eq!(module["vcs"]["namespace"], json!("acme/modules"));
    assert_eq!(module["vcs"]["repository"], json!("terraform-aws-vpc"));
}

#[test]
fn test_unknown_vcs_provider_aborts_mapping() {
    let mut graph = fixtures::sample_graph();
    graph.workspaces[0].set_attr("vcs-repo.service-provider", json!("perforce"));

    let err = map_and_expand(&graph, &MappingConfig::default()).unwrap_err();
    assert!(matches!(err, Error::UnknownVcsProvider(name) if name == "perforce"));
}

#[test]
fn test_mapping_is_deterministic() {
    let graph = fixtures::sample_graph();
    let first = map_and_expand(&graph, &with_variable_sets()).unwrap();
    let second = map_and_expand(&graph, &with_variable_sets()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_context_variables_follow_their_context_copies() {
    let mut graph = fixtures::sample_graph();
    let second_project = json!({
        "id": "prj-2",
        "attributes": {"name": "Data"},
        "relationships": {"organization": {"data": {"id": "acme", "type": "organizations"}}}
    });
    graph.projects.push(Record::from_resource(&second_project));
    graph.variable_sets[0].set_related(
        "projects",
        Relationship::Many(vec![
            Reference::new("projects", "prj-1"),
            Reference::new("projects", "prj-2"),
        ]),
    );

    let expanded = map_and_expand(&graph, &with_variable_sets()).unwrap();

    let contexts: Vec<&Value> = expanded.collection("contexts").iter().collect();
    assert_eq!(contexts.len(), 2);
    for variable in expanded.collection("context_variables") {
        let context = &variable["_relationships"]["context"];
        let space = &variable["_relationships"]["space"];
        assert!(!context.is_null());
        assert_eq!(context["_relationships"], Value::Null);
        // each copy lives in the project its context was copied into
        let project = context["_source_id"].as_str().unwrap().split('_').next().unwrap();
        assert_eq!(space["_source_id"], json!(project));
    }
}

#[test]
fn test_every_record_has_migration_id_and_relationships() {
    let expanded = map_and_expand(&gitlab_graph(), &with_variable_sets()).unwrap();

    for (collection, records) in &expanded.collections {
        for record in records {
            assert!(
                record["_migration_id"].is_string(),
                "{collection} record without migration id"
            );
            assert!(record["_relationships"].is_object());
        }
    }
}
