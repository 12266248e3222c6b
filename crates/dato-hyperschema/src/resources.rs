//! Resource manifest (`resources.json`) loading.
//!
//! The client package ships a manifest describing every entity and
//! endpoint it generates methods for. The manifest is the source of truth
//! for namespaces and endpoint metadata; the hyperschema supplies the
//! prose. Each endpoint is flattened to carry its parent entity's identity.

use dato_mcp_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Identity of an entity, carried by every flattened endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIdentity {
    /// JSON:API type, e.g. `item_type`.
    #[serde(rename = "jsonApiType")]
    pub json_api_type: String,
    /// Dotted lower-case namespace on the client object, e.g. `itemTypes`.
    pub namespace: String,
    /// Resource class name in the client, e.g. `ItemTypes`.
    #[serde(rename = "resourceClassName")]
    pub resource_class_name: String,
}

/// One entity with its endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceEntity {
    /// JSON:API type.
    #[serde(rename = "jsonApiType")]
    pub json_api_type: String,
    /// Namespace on the client object.
    pub namespace: String,
    /// Resource class name.
    #[serde(rename = "resourceClassName")]
    pub resource_class_name: String,
    /// Endpoints in manifest order.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// One endpoint of an entity.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    /// Hyperschema link rel this endpoint implements.
    pub rel: String,
    /// Simple method name (`list`), absent when only the raw form exists.
    pub name: Option<String>,
    /// Raw method name (`rawList`); always present.
    #[serde(rename = "rawName")]
    pub raw_name: String,
    /// HTTP verb.
    pub method: String,
    /// URL template with `:placeholder` segments.
    #[serde(rename = "urlTemplate")]
    pub url_template: String,
    /// Placeholders appearing in the template.
    #[serde(rename = "urlPlaceholders", default)]
    pub url_placeholders: Vec<UrlPlaceholder>,
    /// Request body type name in the generated schema namespaces.
    #[serde(rename = "requestType")]
    pub request_type: Option<String>,
    /// Query parameter type name.
    #[serde(rename = "queryType")]
    pub query_type: Option<String>,
    /// Response type name.
    #[serde(rename = "responseType")]
    pub response_type: Option<String>,
    /// Whether the response pages.
    #[serde(rename = "paginatedResponse", default)]
    pub paginated_response: bool,
    /// Deprecation notice, when deprecated.
    pub deprecated: Option<String>,
    /// Documentation URL; matches the `Read more:` URL in the generated
    /// method's JSDoc.
    #[serde(rename = "docUrl")]
    pub doc_url: Option<String>,
}

/// One URL template placeholder.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlPlaceholder {
    /// Variable name in the template.
    #[serde(rename = "variableName")]
    pub variable_name: String,
    /// Whether the placeholder is the entity's own id.
    #[serde(rename = "isEntityId", default)]
    pub is_entity_id: bool,
}

/// A flattened endpoint carrying its entity identity.
#[derive(Debug, Clone)]
pub struct EndpointWithEntity {
    /// Parent entity identity.
    pub entity: EntityIdentity,
    /// The endpoint itself.
    pub endpoint: Endpoint,
}

/// The loaded manifest with lookup tables.
#[derive(Debug)]
pub struct ResourceSchema {
    entities: Vec<ResourceEntity>,
}

impl ResourceSchema {
    /// Parses a manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] when the document does not match
    /// the manifest shape.
    pub fn from_value(value: Value) -> Result<Self> {
        let entities: Vec<ResourceEntity> = serde_json::from_value(value)?;
        Ok(Self { entities })
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read and
    /// [`Error::Serialization`] when it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        let value: Value = serde_json::from_str(&raw)?;
        Self::from_value(value)
    }

    /// Entities in manifest order.
    #[must_use]
    pub fn entities(&self) -> &[ResourceEntity] {
        &self.entities
    }

    /// Looks up an entity by JSON:API type.
    #[must_use]
    pub fn find_by_json_api_type(&self, json_api_type: &str) -> Option<&ResourceEntity> {
        self.entities
            .iter()
            .find(|e| e.json_api_type == json_api_type)
    }

    /// Looks up an entity by client namespace.
    #[must_use]
    pub fn find_by_namespace(&self, namespace: &str) -> Option<&ResourceEntity> {
        self.entities.iter().find(|e| e.namespace == namespace)
    }

    /// Looks up an endpoint by `(namespace, rel)`, flattened with its
    /// entity identity.
    #[must_use]
    pub fn find_endpoint_by_rel(&self, namespace: &str, rel: &str) -> Option<EndpointWithEntity> {
        let entity = self.find_by_namespace(namespace)?;
        let endpoint = entity.endpoints.iter().find(|e| e.rel == rel)?;
        Some(EndpointWithEntity {
            entity: entity.identity(),
            endpoint: endpoint.clone(),
        })
    }

    /// All endpoints flattened with entity identity, manifest order.
    #[must_use]
    pub fn flattened(&self) -> Vec<EndpointWithEntity> {
        self.entities
            .iter()
            .flat_map(|entity| {
                let identity = entity.identity();
                entity.endpoints.iter().map(move |endpoint| EndpointWithEntity {
                    entity: identity.clone(),
                    endpoint: endpoint.clone(),
                })
            })
            .collect()
    }
}

impl ResourceEntity {
    /// This entity's identity triple.
    #[must_use]
    pub fn identity(&self) -> EntityIdentity {
        EntityIdentity {
            json_api_type: self.json_api_type.clone(),
            namespace: self.namespace.clone(),
            resource_class_name: self.resource_class_name.clone(),
        }
    }
}

/// Locates the client's shipped `resources.json` under `node_modules`,
/// preferring the Node flavor of the package.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when no candidate package ships a manifest.
pub fn locate_resources_json(node_modules: &Path) -> Result<PathBuf> {
    const CANDIDATES: &[&str] = &["@datocms/cma-client-node", "@datocms/cma-client"];
    for package in CANDIDATES {
        let path = node_modules.join(package).join("resources.json");
        if path.exists() {
            return Ok(path);
        }
    }
    Err(Error::NotFound {
        resource: format!(
            "resources.json under {} (looked in {})",
            node_modules.display(),
            CANDIDATES.join(", ")
        ),
        hint: Some("run the workspace initialization first".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn fixture() -> Value {
        json!([
            {
                "jsonApiType": "item",
                "namespace": "items",
                "resourceClassName": "Items",
                "endpoints": [
                    {
                        "rel": "instances",
                        "name": "list",
                        "rawName": "rawList",
                        "method": "GET",
                        "urlTemplate": "/items",
                        "urlPlaceholders": [],
                        "queryType": "ItemInstancesHrefSchema",
                        "responseType": "ItemInstancesTargetSchema",
                        "paginatedResponse": true,
                        "docUrl": "https://www.datocms.com/docs/content-management-api/resources/item/instances"
                    },
                    {
                        "rel": "destroy",
                        "name": "destroy",
                        "rawName": "rawDestroy",
                        "method": "DELETE",
                        "urlTemplate": "/items/:item_id",
                        "urlPlaceholders": [
                            { "variableName": "item_id", "isEntityId": true }
                        ],
                        "responseType": "ItemDestroyTargetSchema",
                        "docUrl": "https://www.datocms.com/docs/content-management-api/resources/item/destroy"
                    }
                ]
            },
            {
                "jsonApiType": "item_type",
                "namespace": "itemTypes",
                "resourceClassName": "ItemTypes",
                "endpoints": [
                    {
                        "rel": "instances",
                        "name": "list",
                        "rawName": "rawList",
                        "method": "GET",
                        "urlTemplate": "/item-types",
                        "responseType": "ItemTypeInstancesTargetSchema",
                        "docUrl": "https://www.datocms.com/docs/content-management-api/resources/item-type/instances"
                    }
                ]
            }
        ])
    }

    #[test]
    fn test_parse_manifest() {
        let schema = ResourceSchema::from_value(fixture()).unwrap();
        assert_eq!(schema.entities().len(), 2);
        assert_eq!(schema.entities()[0].namespace, "items");
    }

    #[test]
    fn test_find_by_json_api_type() {
        let schema = ResourceSchema::from_value(fixture()).unwrap();
        let entity = schema.find_by_json_api_type("item_type").unwrap();
        assert_eq!(entity.namespace, "itemTypes");
        assert!(schema.find_by_json_api_type("upload").is_none());
    }

    #[test]
    fn test_find_by_namespace() {
        let schema = ResourceSchema::from_value(fixture()).unwrap();
        assert!(schema.find_by_namespace("items").is_some());
        assert!(schema.find_by_namespace("uploads").is_none());
    }

    #[test]
    fn test_endpoint_inherits_entity_identity() {
        let schema = ResourceSchema::from_value(fixture()).unwrap();
        let flat = schema.find_endpoint_by_rel("items", "destroy").unwrap();
        assert_eq!(flat.entity.json_api_type, "item");
        assert_eq!(flat.entity.resource_class_name, "Items");
        assert_eq!(flat.endpoint.method, "DELETE");
        assert!(flat.endpoint.url_placeholders[0].is_entity_id);
    }

    #[test]
    fn test_flattened_preserves_order() {
        let schema = ResourceSchema::from_value(fixture()).unwrap();
        let flat = schema.flattened();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].endpoint.rel, "instances");
        assert_eq!(flat[0].entity.namespace, "items");
        assert_eq!(flat[2].entity.namespace, "itemTypes");
    }

    #[test]
    fn test_defaults() {
        let schema = ResourceSchema::from_value(fixture()).unwrap();
        let flat = schema.find_endpoint_by_rel("items", "destroy").unwrap();
        assert!(!flat.endpoint.paginated_response);
        assert!(flat.endpoint.deprecated.is_none());
    }

    #[test]
    fn test_locate_missing_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = locate_resources_json(dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }
}
