//! Per-kind extractors and the graph they fill.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::client::{ApiClient, ApiQuery};
use super::record::Record;
use crate::config::{IncludeConfig, NameFilter, Selection};
use crate::error::Result;

const AGENT_POOL_FIELDS: &[&str] = &[
    "attributes.agent-count",
    "attributes.name",
    "attributes.organization-scoped",
    "id",
    "relationships.organization.data.id",
];

const MODULE_LIST_FIELDS: &[&str] = &[
    "attributes.name",
    "attributes.namespace",
    "attributes.provider",
    "attributes.registry-name",
    "id",
];

const MODULE_DETAIL_FIELDS: &[&str] = &[
    "attributes.name",
    "attributes.provider",
    "attributes.registry-name",
    "attributes.status",
    "attributes.vcs-repo.branch",
    "attributes.vcs-repo.identifier",
    "id",
    "relationships.organization.data.id",
];

const ORGANIZATION_FIELDS: &[&str] = &["attributes.email", "attributes.name", "id"];

const POLICY_FIELDS: &[&str] = &[
    "attributes.description",
    "attributes.enforcement-level",
    "attributes.kind",
    "attributes.name",
    "id",
    "relationships.organization.data.id",
];

const POLICY_SET_FIELDS: &[&str] = &[
    "attributes.description",
    "attributes.enforcement-level",
    "attributes.global",
    "attributes.kind",
    "attributes.name",
    "id",
    "relationships.organization.data.id",
];

const PROJECT_FIELDS: &[&str] = &["attributes.name", "id", "relationships.organization.data.id"];

const PROVIDER_FIELDS: &[&str] = &[
    "attributes.name",
    "attributes.namespace",
    "attributes.registry-name",
    "id",
    "relationships.organization.data.id",
];

const TASK_FIELDS: &[&str] = &[
    "attributes.category",
    "attributes.description",
    "attributes.enabled",
    "attributes.name",
    "attributes.url",
    "id",
    "relationships.organization.data.id",
];

const TEAM_FIELDS: &[&str] = &[
    "attributes.name",
    "attributes.users-count",
    "id",
    "relationships.organization.data.id",
];

const VARIABLE_SET_FIELDS: &[&str] = &[
    "attributes.description",
    "attributes.global",
    "attributes.name",
    "attributes.project-count",
    "attributes.var-count",
    "attributes.workspace-count",
    "id",
    "relationships.organization.data.id",
    "relationships.projects.data",
    "relationships.workspaces.data",
];

const VARIABLE_SET_VARIABLE_FIELDS: &[&str] = &[
    "attributes.category",
    "attributes.description",
    "attributes.hcl",
    "attributes.key",
    "attributes.sensitive",
    "attributes.value",
    "id",
    "relationships.varset.data.id",
];

const WORKSPACE_VARIABLE_FIELDS: &[&str] = &[
    "attributes.category",
    "attributes.description",
    "attributes.hcl",
    "attributes.key",
    "attributes.sensitive",
    "attributes.value",
    "id",
    "relationships.workspace.data.id",
];

const WORKSPACE_FIELDS: &[&str] = &[
    "attributes.auto-apply",
    "attributes.description",
    "attributes.name",
    "attributes.resource-count",
    "attributes.terraform-version",
    "attributes.vcs-repo.branch",
    "attributes.vcs-repo.identifier",
    "attributes.vcs-repo.service-provider",
    "attributes.working-directory",
    "id",
    "relationships.current-configuration-version.data.id",
    "relationships.current-state-version.data.id",
    "relationships.organization.data.id",
    "relationships.project.data.id",
];

/// The extracted source object graph, one list per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceGraph {
    pub organizations: Vec<Record>,
    pub agent_pools: Vec<Record>,
    pub modules: Vec<Record>,
    pub policies: Vec<Record>,
    pub policy_sets: Vec<Record>,
    pub projects: Vec<Record>,
    pub providers: Vec<Record>,
    pub tasks: Vec<Record>,
    pub teams: Vec<Record>,
    pub variable_sets: Vec<Record>,
    pub variable_set_variables: Vec<Record>,
    pub workspace_variables: Vec<Record>,
    pub workspaces: Vec<Record>,
}

impl SourceGraph {
    pub fn workspace(&self, id: &str) -> Option<&Record> {
        find(&self.workspaces, id)
    }

    pub fn workspace_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.workspaces.iter_mut().find(|w| w.id == id)
    }

    pub fn variable_set(&self, id: &str) -> Option<&Record> {
        find(&self.variable_sets, id)
    }

    pub fn workspace_variable_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.workspace_variables.iter_mut().find(|v| v.id == id)
    }

    pub fn variable_set_variable_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.variable_set_variables.iter_mut().find(|v| v.id == id)
    }
}

fn find<'a>(records: &'a [Record], id: &str) -> Option<&'a Record> {
    records.iter().find(|r| r.id == id)
}

pub struct Extractor<'a> {
    client: &'a ApiClient,
    include: &'a IncludeConfig,
    variable_sets: bool,
}

impl<'a> Extractor<'a> {
    pub fn new(client: &'a ApiClient, include: &'a IncludeConfig, variable_sets: bool) -> Self {
        if variable_sets {
            warn!("Experimental support for variable sets is enabled");
        }
        Self {
            client,
            include,
            variable_sets,
        }
    }

    pub async fn extract(&self) -> Result<SourceGraph> {
        info!("Start extracting data");

        let mut graph = SourceGraph {
            organizations: self.organizations().await?,
            ..SourceGraph::default()
        };

        for organization in &graph.organizations {
            let org = organization.id.as_str();
            graph.agent_pools.extend(self.agent_pools(org).await?);
            graph.modules.extend(self.modules(org).await?);
            graph.policies.extend(self.policies(org).await?);
            graph.policy_sets.extend(self.policy_sets(org).await?);
            graph.projects.extend(self.projects(org).await?);
            graph.providers.extend(self.providers(org).await?);
            graph.tasks.extend(self.tasks(org).await?);
            graph.teams.extend(self.teams(org).await?);
            graph.workspaces.extend(self.workspaces(org).await?);

            if self.variable_sets {
                graph.variable_sets.extend(self.variable_sets(org).await?);
            }
        }

        if self.variable_sets {
            for variable_set in &graph.variable_sets {
                graph
                    .variable_set_variables
                    .extend(self.variable_set_variables(&variable_set.id).await?);
            }
        }

        for workspace in &graph.workspaces {
            graph
                .workspace_variables
                .extend(self.workspace_variables(workspace).await?);
        }

        info!("Stop extracting data");
        Ok(graph)
    }

    async fn extract_kind(
        &self,
        label: &str,
        filter: Option<&NameFilter>,
        path: String,
        fields: &[&str],
    ) -> Result<Vec<Record>> {
        let selection = Selection::resolve(filter)?;
        if selection.is_skip() {
            info!("Skipping {} data extraction", label);
            return Ok(Vec::new());
        }

        info!("Start extracting {} data", label);
        let records = self
            .client
            .fetch(&ApiQuery::get(path).fields(fields).include(selection.pattern()))
            .await?;
        info!("Stop extracting {} data", label);

        Ok(records)
    }

    pub async fn organizations(&self) -> Result<Vec<Record>> {
        self.extract_kind(
            "organizations",
            self.include.organizations.as_ref(),
            "/organizations".to_string(),
            ORGANIZATION_FIELDS,
        )
        .await
    }

    pub async fn agent_pools(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "agent pools",
            self.include.agent_pools.as_ref(),
            format!("/organizations/{org}/agent-pools"),
            AGENT_POOL_FIELDS,
        )
        .await
    }

    /// The module list lacks VCS data, so every selected module is re-read from its detail path.
    pub async fn modules(&self, org: &str) -> Result<Vec<Record>> {
        let listed = self
            .extract_kind(
                "modules",
                self.include.modules.as_ref(),
                format!("/organizations/{org}/registry-modules"),
                MODULE_LIST_FIELDS,
            )
            .await?;

        let mut modules = Vec::with_capacity(listed.len());
        for module in listed {
            let path = format!(
                "/organizations/{}/registry-modules/{}/{}/{}/{}",
                org,
                module.attr_str("registry-name").unwrap_or_default(),
                module.attr_str("namespace").unwrap_or_default(),
                module.attr_str("name").unwrap_or_default(),
                module.attr_str("provider").unwrap_or_default(),
            );
            match self
                .client
                .fetch_one(&ApiQuery::get(path).fields(MODULE_DETAIL_FIELDS))
                .await?
            {
                Some(detail) => modules.push(detail),
                None => warn!("Could not read details for module '{}'", module.id),
            }
        }

        Ok(modules)
    }

    pub async fn policies(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "policies",
            self.include.policies.as_ref(),
            format!("/organizations/{org}/policies"),
            POLICY_FIELDS,
        )
        .await
    }

    pub async fn policy_sets(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "policy sets",
            self.include.policy_sets.as_ref(),
            format!("/organizations/{org}/policy-sets"),
            POLICY_SET_FIELDS,
        )
        .await
    }

    pub async fn projects(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "projects",
            self.include.projects.as_ref(),
            format!("/organizations/{org}/projects"),
            PROJECT_FIELDS,
        )
        .await
    }

    pub async fn providers(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "providers",
            self.include.providers.as_ref(),
            format!("/organizations/{org}/registry-providers"),
            PROVIDER_FIELDS,
        )
        .await
    }

    pub async fn tasks(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "tasks",
            self.include.tasks.as_ref(),
            format!("/organizations/{org}/tasks"),
            TASK_FIELDS,
        )
        .await
    }

    pub async fn teams(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "teams",
            self.include.teams.as_ref(),
            format!("/organizations/{org}/teams"),
            TEAM_FIELDS,
        )
        .await
    }

    pub async fn variable_sets(&self, org: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "variable sets",
            self.include.variable_sets.as_ref(),
            format!("/organizations/{org}/varsets"),
            VARIABLE_SET_FIELDS,
        )
        .await
    }

    pub async fn variable_set_variables(&self, variable_set_id: &str) -> Result<Vec<Record>> {
        self.extract_kind(
            "variable set variables",
            self.include.variable_set_variables.as_ref(),
            format!("/varsets/{variable_set_id}/relationships/vars"),
            VARIABLE_SET_VARIABLE_FIELDS,
        )
        .await
    }

    pub async fn workspace_variables(&self, workspace: &Record) -> Result<Vec<Record>> {
        let label = format!(
            "workspace {} variables",
            workspace.name().unwrap_or(workspace.id.as_str())
        );
        self.extract_kind(
            &label,
            self.include.workspace_variables.as_ref(),
            format!("/workspaces/{}/vars", workspace.id),
            WORKSPACE_VARIABLE_FIELDS,
        )
        .await
    }

    /// Workspaces, plus their labels which only the detail endpoint returns.
    pub async fn workspaces(&self, org: &str) -> Result<Vec<Record>> {
        let selection = match self.include.workspace_list {
            Some(ref path) => Selection::from_list_file(path)?,
            None => Selection::resolve(self.include.workspaces.as_ref())?,
        };
        if selection.is_skip() {
            info!("Skipping workspaces data extraction");
            return Ok(Vec::new());
        }

        info!("Start extracting workspaces data");

        let mut workspaces = self
            .client
            .fetch(
                &ApiQuery::get(format!("/organizations/{org}/workspaces"))
                    .fields(WORKSPACE_FIELDS)
                    .include(selection.pattern()),
            )
            .await?;

        for workspace in &mut workspaces {
            let detail = self
                .client
                .fetch_one(
                    &ApiQuery::get(format!("/workspaces/{}", workspace.id))
                        .fields(&["attributes.tag-names"]),
                )
                .await?;

            if let Some(tags) = detail.as_ref().and_then(|d| d.attr("tag-names")) {
                workspace.set_attr("tag-names", tags.clone());
            }
        }

        info!("Stop extracting workspaces data");
        Ok(workspaces)
    }
}
