//! Relationship expansion and migration ids.
//!
//! Every mapped record gets a `_migration_id` and its relationships replaced by
//! the records they point to, inlined without their own `_relationships`.
//! Contexts and context variables are expanded in a second pass, after stacks.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::Result;
use crate::mapper::{Link, MappedGraph, MappedRecord};

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid regex pattern"));

/// Collections whose relationships point at stacks and are expanded last.
const DEFERRED: [&str; 2] = ["contexts", "context_variables"];

/// Lowercase ASCII words joined by `-`.
pub fn slugify(text: &str) -> String {
    let ascii: String = text
        .nfkd()
        .filter(char::is_ascii)
        .filter(|c| *c != '\'')
        .collect::<String>()
        .to_lowercase();

    NON_ALPHANUMERIC
        .replace_all(&ascii, "-")
        .trim_matches('-')
        .to_string()
}

/// `slugify` with `_` as the only separator.
pub fn migration_id(name: &str) -> String {
    slugify(name).replace('-', "_")
}

/// Relationship name to collection name: `space` -> `spaces`, `stacks` -> `stacks`.
pub fn pluralize(kind: &str) -> String {
    if kind.ends_with('s') {
        kind.to_string()
    } else {
        format!("{kind}s")
    }
}

/// The hand-off document: collection name to expanded records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandedGraph {
    pub collections: BTreeMap<String, Vec<Value>>,
}

impl ExpandedGraph {
    pub fn collection(&self, name: &str) -> &[Value] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

struct Entry {
    base: Map<String, Value>,
    links: Vec<(&'static str, Link)>,
}

type Index = HashMap<&'static str, HashMap<String, Value>>;

fn entries<T: MappedRecord>(collection: &str, records: &[T]) -> Result<Vec<Entry>> {
    let mut seen = HashSet::new();

    records
        .iter()
        .map(|record| {
            let id = migration_id(record.migration_key());
            if !seen.insert(id.clone()) {
                warn!("Duplicate migration id '{}' in {}", id, collection);
            }

            let mut base = serde_json::to_value(record)?
                .as_object()
                .cloned()
                .unwrap_or_default();
            base.insert("_migration_id".to_string(), Value::String(id));

            Ok(Entry {
                base,
                links: record.links(),
            })
        })
        .collect()
}

fn build_index(staged: &[(&'static str, Vec<Entry>)]) -> Index {
    let mut index = Index::new();
    for (collection, entries) in staged {
        let records = index.entry(*collection).or_default();
        for entry in entries {
            if let Some(Value::String(source_id)) = entry.base.get("_source_id") {
                records
                    .entry(source_id.clone())
                    .or_insert_with(|| Value::Object(entry.base.clone()));
            }
        }
    }
    index
}

fn resolve(index: &Index, relationship: &str, id: &str) -> Value {
    let collection = pluralize(relationship);
    match index.get(collection.as_str()).and_then(|records| records.get(id)) {
        Some(record) => record.clone(),
        None => {
            warn!("Could not resolve {} '{}'", relationship, id);
            Value::Null
        }
    }
}

fn expand_entries(index: &Index, entries: &[Entry]) -> Vec<Value> {
    entries
        .iter()
        .map(|entry| {
            let relationships: Map<String, Value> = entry
                .links
                .iter()
                .map(|(name, link)| {
                    let resolved = match link {
                        Link::One(None) => Value::Null,
                        Link::One(Some(id)) => resolve(index, name, id),
                        Link::Many(ids) => {
                            Value::Array(ids.iter().map(|id| resolve(index, name, id)).collect())
                        }
                    };
                    (name.to_string(), resolved)
                })
                .collect();

            let mut record = entry.base.clone();
            record.insert("_relationships".to_string(), Value::Object(relationships));
            Value::Object(record)
        })
        .collect()
}

/// Expand a mapped graph. Unresolvable references become `null`.
pub fn expand(graph: &MappedGraph) -> Result<ExpandedGraph> {
    info!("Start expanding relationships");

    let staged: Vec<(&'static str, Vec<Entry>)> = vec![
        ("spaces", entries("spaces", &graph.spaces)?),
        ("contexts", entries("contexts", &graph.contexts)?),
        (
            "context_variables",
            entries("context_variables", &graph.context_variables)?,
        ),
        ("stacks", entries("stacks", &graph.stacks)?),
        ("modules", entries("modules", &graph.modules)?),
        (
            "stack_variables",
            entries("stack_variables", &graph.stack_variables)?,
        ),
    ];
    let index = build_index(&staged);

    let mut expanded = ExpandedGraph::default();
    let (deferred, first): (Vec<_>, Vec<_>) = staged
        .iter()
        .partition(|(collection, _)| DEFERRED.contains(collection));

    for (collection, entries) in first.into_iter().chain(deferred) {
        debug!("Expanding {} {}", entries.len(), collection);
        expanded
            .collections
            .insert(collection.to_string(), expand_entries(&index, entries));
    }

    info!("Stop expanding relationships");
    Ok(expanded)
}
