//! Per-project `schema.ts` generation.
//!
//! Regenerated before every script validation or execution from the live
//! project's models and fields, this file is the `./schema` import the
//! script whitelist allows: one exported `ItemTypeDefinition` per model,
//! with field type literals, block unions for rich/structured/single-block
//! fields, `localized: true` markers, and virtual `position`/`parent_id`
//! fields on sortable and tree models.

use dato_mcp_core::{Error, Result};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The site's schema as fetched through the client: locales plus models
/// with their fields included.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSchema {
    /// Site locales, e.g. `["en", "it"]`.
    pub locales: Vec<String>,
    /// All models (including modular blocks) with fields.
    pub item_types: Vec<ItemTypeSchema>,
}

/// One model.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemTypeSchema {
    /// Model id.
    pub id: String,
    /// Model api key (snake_case).
    pub api_key: String,
    /// Whether this is a modular block.
    #[serde(default)]
    pub modular_block: bool,
    /// Whether records are manually sortable.
    #[serde(default)]
    pub sortable: bool,
    /// Whether records form a tree.
    #[serde(default)]
    pub tree: bool,
    /// Fields in position order.
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// One field of a model.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    /// Field api key (snake_case).
    pub api_key: String,
    /// Field type, e.g. `string`, `rich_text`.
    pub field_type: String,
    /// Whether the field holds one value per locale.
    #[serde(default)]
    pub localized: bool,
    /// Raw validators payload; block unions come from here.
    #[serde(default)]
    pub validators: Value,
}

#[derive(Debug, Serialize)]
struct ModelContext {
    pascal_name: String,
    id: String,
    fields_block: String,
}

#[derive(Debug, Serialize)]
struct SchemaContext {
    locales_union: String,
    models: Vec<ModelContext>,
}

/// Converts a snake_case api key to PascalCase for the exported type name.
#[must_use]
pub fn to_pascal_case(api_key: &str) -> String {
    let mut result = String::new();
    let mut capitalize_next = true;
    for ch in api_key.chars() {
        if ch == '_' || ch == '-' {
            capitalize_next = true;
        } else if capitalize_next {
            result.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}

/// Renders the full `schema.ts` source for a site.
///
/// # Errors
///
/// Returns [`Error::Template`] when rendering fails.
pub fn generate_schema_ts(site: &SiteSchema) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars
        .register_template_string("schema", include_str!("../templates/schema.ts.hbs"))
        .map_err(|e| Error::Template {
            message: format!("registering schema template: {e}"),
        })?;

    let names: HashMap<&str, String> = site
        .item_types
        .iter()
        .map(|it| (it.id.as_str(), to_pascal_case(&it.api_key)))
        .collect();

    let locales_union = if site.locales.is_empty() {
        "string".to_string()
    } else {
        site.locales
            .iter()
            .map(|locale| format!("'{locale}'"))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let models = site
        .item_types
        .iter()
        .map(|item_type| ModelContext {
            pascal_name: to_pascal_case(&item_type.api_key),
            id: item_type.id.clone(),
            fields_block: render_fields(item_type, &names),
        })
        .collect();

    handlebars
        .render(
            "schema",
            &SchemaContext {
                locales_union,
                models,
            },
        )
        .map_err(|e| Error::Template {
            message: format!("rendering schema.ts: {e}"),
        })
}

fn render_fields(item_type: &ItemTypeSchema, names: &HashMap<&str, String>) -> String {
    let mut lines = Vec::new();

    for field in &item_type.fields {
        let mut parts = vec![format!("type: '{}'", field.field_type)];

        match field.field_type.as_str() {
            "rich_text" => {
                parts.push(format!(
                    "blocks: {}",
                    block_union(&field.validators, "rich_text_blocks", names)
                ));
            }
            "structured_text" => {
                parts.push(format!(
                    "blocks: {}",
                    block_union(&field.validators, "structured_text_blocks", names)
                ));
                parts.push(format!(
                    "inline_blocks: {}",
                    block_union(&field.validators, "structured_text_inline_blocks", names)
                ));
            }
            "single_block" => {
                parts.push(format!(
                    "blocks: {}",
                    block_union(&field.validators, "single_block_blocks", names)
                ));
            }
            _ => {}
        }

        if field.localized {
            parts.push("localized: true".to_string());
        }

        lines.push(format!("    {}: {{ {} }};", field.api_key, parts.join("; ")));
    }

    // Manual ordering and trees expose virtual fields the API accepts on
    // create/update even though no field object exists for them.
    if item_type.sortable || item_type.tree {
        lines.push("    position: { type: 'integer' };".to_string());
    }
    if item_type.tree {
        lines.push("    parent_id: { type: 'string' };".to_string());
    }

    lines.join("\n")
}

/// Builds the block union for a validator key holding
/// `{ item_types: ["id", …] }`; unknown ids are skipped, an empty union
/// collapses to `never`.
fn block_union(validators: &Value, key: &str, names: &HashMap<&str, String>) -> String {
    let ids = validators
        .get(key)
        .and_then(|v| v.get("item_types"))
        .and_then(Value::as_array);

    let mut parts: Vec<String> = ids
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .filter_map(|id| names.get(id).cloned())
                .collect()
        })
        .unwrap_or_default();

    if parts.is_empty() {
        "never".to_string()
    } else {
        parts.sort();
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site() -> SiteSchema {
        SiteSchema {
            locales: vec!["en".to_string(), "it".to_string()],
            item_types: vec![
                ItemTypeSchema {
                    id: "100".to_string(),
                    api_key: "blog_post".to_string(),
                    modular_block: false,
                    sortable: true,
                    tree: false,
                    fields: vec![
                        FieldSchema {
                            api_key: "title".to_string(),
                            field_type: "string".to_string(),
                            localized: true,
                            validators: json!({}),
                        },
                        FieldSchema {
                            api_key: "body".to_string(),
                            field_type: "structured_text".to_string(),
                            localized: false,
                            validators: json!({
                                "structured_text_blocks": { "item_types": ["200"] },
                                "structured_text_inline_blocks": { "item_types": [] }
                            }),
                        },
                        FieldSchema {
                            api_key: "gallery_section".to_string(),
                            field_type: "rich_text".to_string(),
                            localized: false,
                            validators: json!({
                                "rich_text_blocks": { "item_types": ["200"] }
                            }),
                        },
                    ],
                },
                ItemTypeSchema {
                    id: "200".to_string(),
                    api_key: "image_block".to_string(),
                    modular_block: true,
                    sortable: false,
                    tree: false,
                    fields: vec![FieldSchema {
                        api_key: "image".to_string(),
                        field_type: "file".to_string(),
                        localized: false,
                        validators: json!({}),
                    }],
                },
                ItemTypeSchema {
                    id: "300".to_string(),
                    api_key: "category".to_string(),
                    modular_block: false,
                    sortable: false,
                    tree: true,
                    fields: vec![FieldSchema {
                        api_key: "name".to_string(),
                        field_type: "string".to_string(),
                        localized: false,
                        validators: json!({}),
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_generates_item_type_definitions() {
        let source = generate_schema_ts(&site()).unwrap();
        assert!(source.contains("import type { ItemTypeDefinition } from '@datocms/cma-client';"));
        assert!(source.contains("export type BlogPost = ItemTypeDefinition<"));
        assert!(source.contains("'100'"));
        assert!(source.contains("export type ImageBlock = ItemTypeDefinition<"));
    }

    #[test]
    fn test_locales_union() {
        let source = generate_schema_ts(&site()).unwrap();
        assert!(source.contains("locales: 'en' | 'it';"));
    }

    #[test]
    fn test_localized_field_marker() {
        let source = generate_schema_ts(&site()).unwrap();
        assert!(source.contains("title: { type: 'string'; localized: true };"));
    }

    #[test]
    fn test_structured_text_blocks_and_inline_blocks() {
        let source = generate_schema_ts(&site()).unwrap();
        assert!(source.contains("blocks: ImageBlock"));
        assert!(source.contains("inline_blocks: never"));
    }

    #[test]
    fn test_rich_text_blocks_union() {
        let source = generate_schema_ts(&site()).unwrap();
        assert!(source.contains("gallery_section: { type: 'rich_text'; blocks: ImageBlock };"));
    }

    #[test]
    fn test_virtual_position_and_parent_id() {
        let source = generate_schema_ts(&site()).unwrap();
        // Sortable model gains position.
        let blog = source.split("export type BlogPost").nth(1).unwrap();
        let blog = blog.split("export type").next().unwrap();
        assert!(blog.contains("position: { type: 'integer' };"));
        assert!(!blog.contains("parent_id"));
        // Tree model gains both.
        let category = source.split("export type Category").nth(1).unwrap();
        assert!(category.contains("position: { type: 'integer' };"));
        assert!(category.contains("parent_id: { type: 'string' };"));
    }

    #[test]
    fn test_empty_locales_fall_back_to_string() {
        let mut s = site();
        s.locales.clear();
        let source = generate_schema_ts(&s).unwrap();
        assert!(source.contains("locales: string;"));
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("blog_post"), "BlogPost");
        assert_eq!(to_pascal_case("seo-settings"), "SeoSettings");
        assert_eq!(to_pascal_case("page"), "Page");
    }
}
