//! Hyperschema loading and `$ref` dereferencing.
//!
//! The CMA publishes a JSON hyperschema describing every entity and link,
//! including prose documentation and inline examples. Fetching and
//! dereferencing it is expensive, so callers hold the result behind a
//! process-wide memo; after [`Hyperschema::from_value`] returns, no `$ref`
//! remains anywhere in the tree.

use dato_mcp_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

/// Upstream hyperschema document URL.
pub const HYPERSCHEMA_URL: &str =
    "https://site-api.datocms.com/docs/site-api-hyperschema.json";

/// The fully dereferenced hyperschema tree.
#[derive(Debug)]
pub struct Hyperschema {
    root: Value,
}

/// One entity (JSON:API type) in the hyperschema.
#[derive(Debug, Clone, Deserialize)]
pub struct Entity {
    /// Human-readable title.
    pub title: Option<String>,
    /// Prose description; may contain `<details>` blocks and
    /// `::example[id]` tokens.
    pub description: Option<String>,
    /// Links (actions) of this entity.
    #[serde(default)]
    pub links: Vec<Link>,
}

/// One link (action) of an entity.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    /// Action name, e.g. `instances`, `create`.
    pub rel: Option<String>,
    /// Human-readable title.
    pub title: Option<String>,
    /// Prose description.
    pub description: Option<String>,
    /// HTTP method of the underlying endpoint.
    pub method: Option<String>,
    /// Template URL of the endpoint.
    pub href: Option<String>,
    /// Nested documentation payloads.
    pub documentation: Option<Documentation>,
}

/// Per-language documentation attached to a link.
#[derive(Debug, Clone, Deserialize)]
pub struct Documentation {
    /// JavaScript documentation (the only language the client ships).
    pub javascript: Option<LanguageDoc>,
}

/// Documentation for one language.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageDoc {
    /// Worked examples.
    #[serde(default)]
    pub examples: Vec<DocExample>,
}

/// One worked example of a link.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DocExample {
    /// Stable identifier, referenced by `::example[id]` tokens.
    pub id: String,
    /// Human-readable title.
    pub title: Option<String>,
    /// Prose description.
    pub description: Option<String>,
    /// Request snippet.
    pub request: Option<CodeSnippet>,
    /// Response snippet.
    pub response: Option<CodeSnippet>,
}

/// A code block inside an example.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CodeSnippet {
    /// The code itself.
    pub code: Option<String>,
}

impl Link {
    /// The link's examples, empty when undocumented.
    #[must_use]
    pub fn examples(&self) -> &[DocExample] {
        self.documentation
            .as_ref()
            .and_then(|d| d.javascript.as_ref())
            .map_or(&[], |js| js.examples.as_slice())
    }
}

impl Hyperschema {
    /// Fetches and dereferences the hyperschema from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport or status failures.
    pub async fn fetch(url: &str) -> Result<Self> {
        tracing::debug!(%url, "fetching hyperschema");
        let response = reqwest::get(url)
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::Http {
                message: format!("GET {url}"),
                source: Some(Box::new(e)),
            })?;
        let root: Value = response.json().await.map_err(|e| Error::Http {
            message: format!("decoding hyperschema from {url}"),
            source: Some(Box::new(e)),
        })?;
        Ok(Self::from_value(root))
    }

    /// Dereferences an already-loaded hyperschema document.
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        let dereferenced = dereference(&root, &root, &mut HashSet::new());
        Self { root: dereferenced }
    }

    /// The dereferenced tree.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.root
    }

    /// JSON:API type keys of every entity, in document order.
    #[must_use]
    pub fn entity_keys(&self) -> Vec<String> {
        self.root
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Looks up an entity by its JSON:API type.
    #[must_use]
    pub fn find_entity(&self, json_api_type: &str) -> Option<Entity> {
        let value = self.root.get("properties")?.get(json_api_type)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Looks up a link by `(json_api_type, rel)`.
    #[must_use]
    pub fn find_link(&self, json_api_type: &str, rel: &str) -> Option<Link> {
        self.find_entity(json_api_type)?
            .links
            .into_iter()
            .find(|link| link.rel.as_deref() == Some(rel))
    }
}

/// Recursively resolves every `$ref` against `root`. Cycles are cut with an
/// empty object so the output provably contains no `$ref`.
fn dereference(value: &Value, root: &Value, active: &mut HashSet<String>) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(pointer) = map.get("$ref").and_then(Value::as_str) {
                if !active.insert(pointer.to_string()) {
                    tracing::warn!(%pointer, "cycle in hyperschema $ref, cutting");
                    return Value::Object(serde_json::Map::new());
                }
                let resolved = resolve_pointer(root, pointer).map_or_else(
                    || {
                        tracing::warn!(%pointer, "dangling hyperschema $ref");
                        Value::Object(serde_json::Map::new())
                    },
                    |target| dereference(target, root, active),
                );
                active.remove(pointer);
                return resolved;
            }
            let resolved: serde_json::Map<String, Value> = map
                .iter()
                .map(|(key, child)| (key.clone(), dereference(child, root, active)))
                .collect();
            Value::Object(resolved)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| dereference(item, root, active))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolves a `#/a/b`-style JSON pointer with `~0`/`~1` unescaping.
fn resolve_pointer<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let path = pointer.strip_prefix('#')?;
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for raw in path.trim_start_matches('/').split('/') {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> Value {
        json!({
            "definitions": {
                "item_identity": {
                    "type": "string",
                    "description": "RFC 4122 UUID"
                }
            },
            "properties": {
                "item": {
                    "title": "Record",
                    "description": "A single record. ::example[list-basic]",
                    "attributes": {
                        "id": { "$ref": "#/definitions/item_identity" }
                    },
                    "links": [
                        {
                            "rel": "instances",
                            "title": "List all records",
                            "method": "GET",
                            "description": "Lists records. <details><summary>Pagination</summary>Use page[offset].</details>",
                            "documentation": {
                                "javascript": {
                                    "examples": [
                                        {
                                            "id": "list-basic",
                                            "title": "Basic listing",
                                            "request": { "code": "await client.items.list();" },
                                            "response": { "code": "[]" }
                                        }
                                    ]
                                }
                            }
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_no_ref_remains_after_dereferencing() {
        let schema = Hyperschema::from_value(fixture());
        let serialized = serde_json::to_string(schema.as_value()).unwrap();
        assert!(!serialized.contains("$ref"));
        // The target shape replaced the pointer.
        assert_eq!(
            schema
                .as_value()
                .pointer("/properties/item/attributes/id/type")
                .and_then(Value::as_str),
            Some("string")
        );
    }

    #[test]
    fn test_find_entity() {
        let schema = Hyperschema::from_value(fixture());
        let entity = schema.find_entity("item").unwrap();
        assert_eq!(entity.title.as_deref(), Some("Record"));
        assert_eq!(entity.links.len(), 1);
        assert!(schema.find_entity("upload").is_none());
    }

    #[test]
    fn test_find_link_and_examples() {
        let schema = Hyperschema::from_value(fixture());
        let link = schema.find_link("item", "instances").unwrap();
        assert_eq!(link.method.as_deref(), Some("GET"));
        assert_eq!(link.examples().len(), 1);
        assert_eq!(link.examples()[0].id, "list-basic");
        assert!(schema.find_link("item", "destroy").is_none());
    }

    #[test]
    fn test_cyclic_ref_is_cut() {
        let cyclic = json!({
            "definitions": {
                "a": { "child": { "$ref": "#/definitions/a" } }
            },
            "properties": {}
        });
        let schema = Hyperschema::from_value(cyclic);
        let serialized = serde_json::to_string(schema.as_value()).unwrap();
        assert!(!serialized.contains("$ref"));
    }

    #[test]
    fn test_pointer_unescaping() {
        let root = json!({ "a/b": { "~x": 7 } });
        assert_eq!(
            resolve_pointer(&root, "#/a~1b/~0x").and_then(Value::as_i64),
            Some(7)
        );
    }

    #[test]
    fn test_entity_keys() {
        let schema = Hyperschema::from_value(fixture());
        assert_eq!(schema.entity_keys(), vec!["item".to_string()]);
    }
}
