//! Generic JSON:API resource as extracted from the source platform.
//!
//! A [`Record`] keeps the attribute tree of a resource exactly as the API
//! returned it (after projection) and reduces every relationship to plain
//! [`Reference`]s. Dotted paths such as `vcs-repo.identifier` address nested
//! attributes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub id: String,
}

impl Reference {
    pub fn new(kind: &str, id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relationship {
    Many(Vec<Reference>),
    One(Option<Reference>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
    /// Data-quality findings attached by the audit stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Record {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Build a record from one raw JSON:API resource object.
    pub fn from_resource(raw: &Value) -> Self {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let attributes = raw
            .get("attributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let relationships = raw
            .get("relationships")
            .and_then(Value::as_object)
            .map(|rels| {
                rels.iter()
                    .map(|(name, rel)| (name.clone(), parse_relationship(rel)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            attributes,
            relationships,
            warnings: Vec::new(),
        }
    }

    /// Attribute at a dotted path. JSON `null` reads as absent.
    pub fn attr(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.attributes.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        (!current.is_null()).then_some(current)
    }

    pub fn attr_str(&self, path: &str) -> Option<&str> {
        self.attr(path).and_then(Value::as_str)
    }

    pub fn attr_bool(&self, path: &str) -> Option<bool> {
        self.attr(path).and_then(Value::as_bool)
    }

    pub fn attr_i64(&self, path: &str) -> Option<i64> {
        self.attr(path).and_then(Value::as_i64)
    }

    pub fn attr_str_list(&self, path: &str) -> Vec<String> {
        self.attr(path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set an attribute at a dotted path, creating intermediate objects.
    pub fn set_attr(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.attributes;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }

    pub fn name(&self) -> Option<&str> {
        self.attr_str("name")
    }

    /// Id of a to-one relationship.
    pub fn related_id(&self, relationship: &str) -> Option<&str> {
        match self.relationships.get(relationship)? {
            Relationship::One(Some(reference)) => Some(reference.id.as_str()),
            _ => None,
        }
    }

    /// References of a to-many relationship; empty when absent or to-one.
    pub fn related_many(&self, relationship: &str) -> &[Reference] {
        match self.relationships.get(relationship) {
            Some(Relationship::Many(references)) => references,
            _ => &[],
        }
    }

    pub fn set_related(&mut self, relationship: &str, value: Relationship) {
        self.relationships.insert(relationship.to_string(), value);
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.related_id("organization")
    }

    pub fn project_id(&self) -> Option<&str> {
        self.related_id("project")
    }

    pub fn workspace_id(&self) -> Option<&str> {
        self.related_id("workspace")
    }

    pub fn varset_id(&self) -> Option<&str> {
        self.related_id("varset")
    }
}

fn parse_relationship(raw: &Value) -> Relationship {
    match raw.get("data") {
        Some(Value::Array(items)) => {
            Relationship::Many(items.iter().filter_map(parse_reference).collect())
        }
        Some(item @ Value::Object(_)) => Relationship::One(parse_reference(item)),
        _ => Relationship::One(None),
    }
}

fn parse_reference(raw: &Value) -> Option<Reference> {
    let id = raw.get("id")?.as_str()?;
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    Some(Reference::new(kind, id))
}

/// Reduce a raw resource to exactly the given dotted paths.
///
/// Paths missing from the resource are left out of the result.
pub fn project(raw: &Value, fields: &[String]) -> Value {
    let mut projected = Value::Object(Map::new());

    for field in fields {
        let mut source = raw;
        let mut found = true;
        for segment in field.split('.') {
            match source.get(segment) {
                Some(next) => source = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            insert_path(&mut projected, field, source.clone());
        }
    }

    projected
}

/// Remove the value at each dotted path, if present.
pub fn omit(raw: &mut Value, fields: &[String]) {
    for field in fields {
        let segments: Vec<&str> = field.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };

        let mut current = &mut *raw;
        let mut reachable = true;
        for segment in parents {
            if current.get(*segment).is_none() {
                reachable = false;
                break;
            }
            current = current.get_mut(*segment).unwrap();
        }
        if reachable {
            if let Some(map) = current.as_object_mut() {
                map.remove(*last);
            }
        }
    }
}

fn insert_path(target: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}
