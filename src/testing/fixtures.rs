//! Canned source-platform data shared by unit and integration tests.

use serde_json::{json, Value};

use crate::source::{Method, Record, SourceGraph};
use crate::testing::MockTransport;

pub fn organization_json() -> Value {
    json!({
        "id": "acme",
        "type": "organizations",
        "attributes": {"name": "acme", "email": "ops@acme.test"}
    })
}

pub fn project_json() -> Value {
    json!({
        "id": "prj-1",
        "type": "projects",
        "attributes": {"name": "Platform"},
        "relationships": {"organization": {"data": {"id": "acme", "type": "organizations"}}}
    })
}

/// `ws-1`: VCS-backed, in project `prj-1`, with state. `ws-2`: no VCS, no project.
pub fn workspaces_json() -> Value {
    json!([
        {
            "id": "ws-1",
            "type": "workspaces",
            "attributes": {
                "name": "networking",
                "description": "Core network",
                "auto-apply": true,
                "resource-count": 10,
                "terraform-version": "1.5.5",
                "working-directory": "stacks/network",
                "vcs-repo": {
                    "identifier": "acme/networking",
                    "branch": "main",
                    "service-provider": "github"
                }
            },
            "relationships": {
                "organization": {"data": {"id": "acme", "type": "organizations"}},
                "project": {"data": {"id": "prj-1", "type": "projects"}},
                "current-configuration-version": {"data": {"id": "cv-1", "type": "configuration-versions"}},
                "current-state-version": {"data": {"id": "sv-1", "type": "state-versions"}}
            }
        },
        {
            "id": "ws-2",
            "type": "workspaces",
            "attributes": {
                "name": "compute",
                "description": null,
                "auto-apply": false,
                "resource-count": 0,
                "terraform-version": "latest",
                "working-directory": "",
                "vcs-repo": null
            },
            "relationships": {
                "organization": {"data": {"id": "acme", "type": "organizations"}},
                "project": {"data": null},
                "current-configuration-version": {"data": {"id": "cv-2", "type": "configuration-versions"}},
                "current-state-version": {"data": null}
            }
        }
    ])
}

pub fn workspace_variables_json(workspace_id: &str) -> Value {
    match workspace_id {
        "ws-1" => json!([{
            "id": "var-1",
            "type": "vars",
            "attributes": {
                "key": "DB_PASSWORD",
                "value": null,
                "sensitive": true,
                "category": "env",
                "hcl": false,
                "description": "database password"
            },
            "relationships": {"workspace": {"data": {"id": "ws-1", "type": "workspaces"}}}
        }]),
        "ws-2" => json!([{
            "id": "var-2",
            "type": "vars",
            "attributes": {
                "key": "region-name",
                "value": "eu-west-1",
                "sensitive": false,
                "category": "terraform",
                "hcl": false,
                "description": null
            },
            "relationships": {"workspace": {"data": {"id": "ws-2", "type": "workspaces"}}}
        }]),
        _ => json!([]),
    }
}

pub fn variable_set_json() -> Value {
    json!({
        "id": "varset-1",
        "type": "varsets",
        "attributes": {
            "name": "shared",
            "description": "Shared credentials",
            "global": false,
            "project-count": 1,
            "var-count": 1,
            "workspace-count": 0
        },
        "relationships": {
            "organization": {"data": {"id": "acme", "type": "organizations"}},
            "projects": {"data": [{"id": "prj-1", "type": "projects"}]},
            "workspaces": {"data": []}
        }
    })
}

pub fn variable_set_variables_json() -> Value {
    json!([{
        "id": "vsvar-1",
        "type": "vars",
        "attributes": {
            "key": "API_KEY",
            "value": null,
            "sensitive": true,
            "category": "env",
            "hcl": false,
            "description": null
        },
        "relationships": {"varset": {"data": {"id": "varset-1", "type": "varsets"}}}
    }])
}

pub fn module_detail_json() -> Value {
    json!({
        "id": "mod-1",
        "type": "registry-modules",
        "attributes": {
            "name": "vpc",
            "provider": "aws",
            "registry-name": "private",
            "status": "setup_complete",
            "vcs-repo": {"identifier": "acme/terraform-aws-vpc", "branch": "main"}
        },
        "relationships": {"organization": {"data": {"id": "acme", "type": "organizations"}}}
    })
}

/// Serve every list and detail endpoint the extractors read for organization `acme`.
pub fn mount_source_api(transport: &MockTransport) {
    let ok = |suffix: &str, data: Value| {
        transport.on_json(Method::Get, suffix, 200, json!({"data": data, "links": {"next": null}}));
    };

    ok("/api/v2/organizations", json!([organization_json()]));
    ok("/organizations/acme/agent-pools", json!([]));
    ok(
        "/organizations/acme/registry-modules",
        json!([{
            "id": "mod-1",
            "attributes": {"name": "vpc", "namespace": "acme", "provider": "aws", "registry-name": "private"}
        }]),
    );
    ok(
        "/organizations/acme/registry-modules/private/acme/vpc/aws",
        module_detail_json(),
    );
    ok("/organizations/acme/policies", json!([]));
    ok("/organizations/acme/policy-sets", json!([]));
    ok("/organizations/acme/projects", json!([project_json()]));
    ok("/organizations/acme/registry-providers", json!([]));
    ok("/organizations/acme/tasks", json!([]));
    ok("/organizations/acme/teams", json!([]));
    ok("/organizations/acme/workspaces", workspaces_json());
    ok(
        "/workspaces/ws-1",
        json!({"id": "ws-1", "attributes": {"tag-names": ["network", "prod"]}}),
    );
    ok("/workspaces/ws-2", json!({"id": "ws-2", "attributes": {"tag-names": []}}));
    ok("/organizations/acme/varsets", json!([variable_set_json()]));
    ok("/varsets/varset-1/relationships/vars", variable_set_variables_json());
    ok("/workspaces/ws-1/vars", workspace_variables_json("ws-1"));
    ok("/workspaces/ws-2/vars", workspace_variables_json("ws-2"));
}

fn records(value: Value) -> Vec<Record> {
    value
        .as_array()
        .map(|items| items.iter().map(Record::from_resource).collect())
        .unwrap_or_default()
}

/// The graph `mount_source_api` yields, built without the network.
pub fn sample_graph() -> SourceGraph {
    let mut workspaces = records(workspaces_json());
    workspaces[0].set_attr("tag-names", json!(["network", "prod"]));
    workspaces[1].set_attr("tag-names", json!([]));

    let mut workspace_variables = records(workspace_variables_json("ws-1"));
    workspace_variables.extend(records(workspace_variables_json("ws-2")));

    SourceGraph {
        organizations: records(json!([organization_json()])),
        projects: records(json!([project_json()])),
        modules: records(json!([module_detail_json()])),
        workspaces,
        workspace_variables,
        variable_sets: records(json!([variable_set_json()])),
        variable_set_variables: records(variable_set_variables_json()),
        ..SourceGraph::default()
    }
}
