//! Target-platform entities produced by the mapper.
//!
//! Relationship fields hold source ids and are not serialized; the expander
//! turns them into inlined records under `_relationships`.

use serde::Serialize;
use serde_json::Value;

use super::terraform::TerraformSettings;
use super::vcs::VcsProvider;

/// A relationship as held by a mapped record, by source id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    One(Option<String>),
    Many(Vec<String>),
}

/// What the expander needs from every mapped record.
pub trait MappedRecord: Serialize {
    fn source_id(&self) -> &str;

    /// Input of the record's migration id.
    fn migration_key(&self) -> &str;

    /// Named relationships. The name, pluralized, is the collection to look in.
    fn links(&self) -> Vec<(&'static str, Link)>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Space {
    #[serde(rename = "_source_id")]
    pub source_id: String,
    pub name: String,
    pub requires_terraform_workflow_tool: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackVcs {
    pub branch: Option<String>,
    pub namespace: Option<String>,
    pub project_root: Option<String>,
    pub provider: Option<VcsProvider>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stack {
    #[serde(rename = "_source_id")]
    pub source_id: String,
    pub autodeploy: bool,
    pub description: Option<String>,
    pub has_variables_with_invalid_name: bool,
    pub has_secret_variables_with_invalid_name: bool,
    pub name: String,
    pub labels: Vec<String>,
    pub slug: String,
    pub terraform: TerraformSettings,
    pub vcs: StackVcs,
    #[serde(skip)]
    pub space: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleVcs {
    pub branch: Option<String>,
    pub namespace: Option<String>,
    pub provider: VcsProvider,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    #[serde(rename = "_source_id")]
    pub source_id: String,
    pub name: String,
    pub status: Option<String>,
    pub terraform_provider: Option<String>,
    pub visibility: Option<String>,
    pub vcs: ModuleVcs,
    #[serde(skip)]
    pub space: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Terraform,
    EnvVar,
}

/// Fields shared by stack and context variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableFields {
    pub description: Option<String>,
    pub hcl: bool,
    pub name: String,
    pub replacement_name: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub valid_name: bool,
    /// `None` means "not recovered", never "empty".
    pub value: Option<Value>,
    pub write_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackVariable {
    #[serde(rename = "_source_id")]
    pub source_id: String,
    #[serde(flatten)]
    pub fields: VariableFields,
    #[serde(skip)]
    pub space: Option<String>,
    #[serde(skip)]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    #[serde(rename = "_source_id")]
    pub source_id: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub name: String,
    #[serde(skip)]
    pub space: Option<String>,
    #[serde(skip)]
    pub stacks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextVariable {
    #[serde(rename = "_source_id")]
    pub source_id: String,
    #[serde(flatten)]
    pub fields: VariableFields,
    #[serde(skip)]
    pub space: Option<String>,
    #[serde(skip)]
    pub context: Option<String>,
}

impl MappedRecord for Space {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn migration_key(&self) -> &str {
        &self.name
    }

    fn links(&self) -> Vec<(&'static str, Link)> {
        Vec::new()
    }
}

impl MappedRecord for Stack {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn migration_key(&self) -> &str {
        &self.name
    }

    fn links(&self) -> Vec<(&'static str, Link)> {
        vec![("space", Link::One(self.space.clone()))]
    }
}

impl MappedRecord for Module {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn migration_key(&self) -> &str {
        &self.name
    }

    fn links(&self) -> Vec<(&'static str, Link)> {
        vec![("space", Link::One(self.space.clone()))]
    }
}

impl MappedRecord for StackVariable {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn migration_key(&self) -> &str {
        &self.fields.name
    }

    fn links(&self) -> Vec<(&'static str, Link)> {
        vec![
            ("space", Link::One(self.space.clone())),
            ("stack", Link::One(self.stack.clone())),
        ]
    }
}

// Copies of one variable set share a name, so contexts are keyed by source id.
impl MappedRecord for Context {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn migration_key(&self) -> &str {
        &self.source_id
    }

    fn links(&self) -> Vec<(&'static str, Link)> {
        vec![
            ("space", Link::One(self.space.clone())),
            ("stacks", Link::Many(self.stacks.clone())),
        ]
    }
}

impl MappedRecord for ContextVariable {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn migration_key(&self) -> &str {
        &self.source_id
    }

    fn links(&self) -> Vec<(&'static str, Link)> {
        vec![
            ("space", Link::One(self.space.clone())),
            ("context", Link::One(self.context.clone())),
        ]
    }
}
