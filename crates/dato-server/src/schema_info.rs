//! Project schema lookup: prefetch, fuzzy search, and rendering.
//!
//! `schema_info` answers "what does this project's content model look
//! like" from live data: all models and fields are prefetched through the
//! client, the requested model is found by fuzzy match on `api_key`,
//! `name`, and `id`, and the output is trimmed according to the requested
//! field verbosity.

use crate::types::{FieldsDetails, SchemaInfoParams};
use dato_mcp_client::{CmaError, SharedClient};
use dato_mcp_core::{fuzzy_score, Error, Result};
use dato_mcp_workspace::SiteSchema;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Field properties kept in `basic` mode; everything else (appearance,
/// positioning hints, deep filtering flags) is noise at discovery time.
const BASIC_FIELD_PROPS: &[&str] = &[
    "id",
    "api_key",
    "label",
    "field_type",
    "localized",
    "position",
    "validators",
];

/// One prefetched model with its fields.
#[derive(Debug, Clone)]
pub struct ProjectModel {
    /// The model object as the API sent it.
    pub raw: Value,
    /// The model's fields.
    pub fields: Vec<Value>,
}

impl ProjectModel {
    /// Model id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.raw.get("id").and_then(Value::as_str).unwrap_or("")
    }

    /// Model api key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.raw
            .get("api_key")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Model display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.raw.get("name").and_then(Value::as_str).unwrap_or("")
    }

    /// Whether this model is a modular block.
    #[must_use]
    pub fn is_block(&self) -> bool {
        self.raw
            .get("modular_block")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// All prefetched models.
#[derive(Debug, Clone)]
pub struct ProjectSchemaData {
    /// Models in API order.
    pub models: Vec<ProjectModel>,
}

/// Maps a client failure onto the workspace error taxonomy.
pub fn client_error(error: CmaError) -> Error {
    match error {
        CmaError::Api(api) => Error::Http {
            message: serde_json::to_string_pretty(&api)
                .unwrap_or_else(|_| api.to_string()),
            source: None,
        },
        CmaError::Timeout(timeout) => Error::Timeout {
            operation: format!("CMA request to {}", timeout.request.url),
            duration_secs: timeout.timeout_secs,
        },
        other => Error::Http {
            message: other.to_string(),
            source: None,
        },
    }
}

/// Accepts both flattened arrays and raw `{ data: [...] }` envelopes.
#[must_use]
pub fn collection(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => map
            .remove("data")
            .and_then(|data| match data {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Prefetches every model and its fields.
///
/// # Errors
///
/// Propagates client failures as [`Error::Http`] / [`Error::Timeout`].
pub async fn fetch_project_schema(client: &SharedClient) -> Result<ProjectSchemaData> {
    let models_raw = client
        .call("itemTypes", "list", &[])
        .await
        .map_err(client_error)?;

    let mut models = Vec::new();
    for raw in collection(models_raw) {
        let id = raw.get("id").and_then(Value::as_str).unwrap_or_default();
        let fields_raw = client
            .call("fields", "list", &[json!(id)])
            .await
            .map_err(client_error)?;
        models.push(ProjectModel {
            raw,
            fields: collection(fields_raw),
        });
    }
    Ok(ProjectSchemaData { models })
}

/// Assembles the input of the `schema.ts` generator: site locales plus
/// every model with its fields.
///
/// # Errors
///
/// Propagates client failures.
pub async fn fetch_site_schema(client: &SharedClient) -> Result<SiteSchema> {
    let site = client
        .call("site", "find", &[])
        .await
        .map_err(client_error)?;
    let locales = site
        .get("locales")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    let data = fetch_project_schema(client).await?;
    let item_types = data
        .models
        .iter()
        .map(|model| {
            let mut raw = model.raw.clone();
            if let Value::Object(map) = &mut raw {
                map.insert("fields".to_string(), Value::Array(model.fields.clone()));
            }
            serde_json::from_value(raw).map_err(Error::from)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SiteSchema {
        locales,
        item_types,
    })
}

/// Scores `query` against a model: the best of `api_key`, `name`, and
/// `id`.
#[must_use]
pub fn model_score(model: &ProjectModel, query: &str) -> u32 {
    fuzzy_score(query, model.api_key())
        .max(fuzzy_score(query, model.name()))
        .max(fuzzy_score(query, model.id()))
}

/// Ranks models against a query; zero scores are discarded and ties keep
/// insertion order (stable sort).
#[must_use]
pub fn rank_models<'a>(data: &'a ProjectSchemaData, query: &str) -> Vec<(&'a ProjectModel, u32)> {
    let mut ranked: Vec<(&ProjectModel, u32)> = data
        .models
        .iter()
        .map(|model| (model, model_score(model, query)))
        .filter(|(_, score)| *score > 0)
        .collect();
    ranked.sort_by_key(|(_, score)| std::cmp::Reverse(*score));
    ranked
}

/// Trims one field object according to the verbosity setting.
#[must_use]
pub fn strip_field(field: &Value, details: FieldsDetails, props: &[String]) -> Value {
    match details {
        FieldsDetails::Complete => field.clone(),
        FieldsDetails::Basic => keep_props(field, BASIC_FIELD_PROPS.iter().copied()),
        FieldsDetails::Allowlist => keep_props(field, props.iter().map(String::as_str)),
    }
}

fn keep_props<'a>(field: &Value, props: impl Iterator<Item = &'a str>) -> Value {
    let Value::Object(map) = field else {
        return field.clone();
    };
    let wanted: Vec<&str> = props.collect();
    let kept: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| wanted.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(kept)
}

fn validator_block_ids(field: &Value, keys: &[&str]) -> Vec<String> {
    let mut ids = Vec::new();
    for key in keys {
        if let Some(list) = field
            .pointer(&format!("/validators/{key}/item_types"))
            .and_then(Value::as_array)
        {
            ids.extend(list.iter().filter_map(Value::as_str).map(ToString::to_string));
        }
    }
    ids
}

const BLOCK_VALIDATOR_KEYS: &[&str] = &[
    "rich_text_blocks",
    "structured_text_blocks",
    "structured_text_inline_blocks",
    "single_block_blocks",
];

const LINK_VALIDATOR_KEYS: &[&str] = &["item_item_type", "items_item_type"];

/// Transitively collects the block models reachable from a model's
/// block-holding fields.
#[must_use]
pub fn nested_block_ids(data: &ProjectSchemaData, root_id: &str) -> Vec<String> {
    let by_id: HashMap<&str, &ProjectModel> =
        data.models.iter().map(|m| (m.id(), m)).collect();

    let mut seen = BTreeSet::new();
    let mut stack = vec![root_id.to_string()];
    while let Some(id) = stack.pop() {
        let Some(model) = by_id.get(id.as_str()) else {
            continue;
        };
        for field in &model.fields {
            for block_id in validator_block_ids(field, BLOCK_VALIDATOR_KEYS) {
                if block_id != root_id && seen.insert(block_id.clone()) {
                    stack.push(block_id);
                }
            }
        }
    }
    seen.into_iter().collect()
}

/// Models holding link fields that point at `target_id`.
#[must_use]
pub fn reverse_reference_ids(data: &ProjectSchemaData, target_id: &str) -> Vec<String> {
    referencing_ids(data, target_id, LINK_VALIDATOR_KEYS)
}

/// Models embedding block `target_id` in rich/structured/single-block
/// fields.
#[must_use]
pub fn block_embedder_ids(data: &ProjectSchemaData, target_id: &str) -> Vec<String> {
    referencing_ids(data, target_id, BLOCK_VALIDATOR_KEYS)
}

fn referencing_ids(data: &ProjectSchemaData, target_id: &str, keys: &[&str]) -> Vec<String> {
    data.models
        .iter()
        .filter(|model| model.id() != target_id)
        .filter(|model| {
            model
                .fields
                .iter()
                .any(|field| validator_block_ids(field, keys).iter().any(|id| id == target_id))
        })
        .map(|model| model.id().to_string())
        .collect()
}

/// Renders the full `schema_info` response for a matched model.
#[must_use]
pub fn render_model_info(
    data: &ProjectSchemaData,
    model: &ProjectModel,
    params: &SchemaInfoParams,
    fieldsets: &[Value],
) -> String {
    let mut out = format!(
        "# {} (`{}`, id `{}`){}\n\n",
        model.name(),
        model.api_key(),
        model.id(),
        if model.is_block() { " (modular block)" } else { "" }
    );

    out.push_str("## Fields\n\n```json\n");
    let fields: Vec<Value> = model
        .fields
        .iter()
        .map(|field| strip_field(field, params.fields_details, &params.field_props))
        .collect();
    out.push_str(&serde_json::to_string_pretty(&fields).unwrap_or_default());
    out.push_str("\n```\n");

    if params.include_fieldsets && !fieldsets.is_empty() {
        out.push_str("\n## Fieldsets\n\n```json\n");
        out.push_str(&serde_json::to_string_pretty(&fieldsets).unwrap_or_default());
        out.push_str("\n```\n");
    }

    let by_id: HashMap<&str, &ProjectModel> =
        data.models.iter().map(|m| (m.id(), m)).collect();
    let describe = |ids: &[String]| {
        ids.iter()
            .map(|id| {
                by_id
                    .get(id.as_str())
                    .map_or_else(|| format!("`{id}`"), |m| format!("`{}`", m.api_key()))
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    if params.include_nested_blocks {
        let nested = nested_block_ids(data, model.id());
        if !nested.is_empty() {
            out.push_str(&format!("\n## Nested blocks\n\n{}\n", describe(&nested)));
            for id in &nested {
                if let Some(block) = by_id.get(id.as_str()) {
                    out.push_str(&format!(
                        "\n### {} (`{}`)\n\n```json\n{}\n```\n",
                        block.name(),
                        block.api_key(),
                        serde_json::to_string_pretty(
                            &block
                                .fields
                                .iter()
                                .map(|f| strip_field(f, params.fields_details, &params.field_props))
                                .collect::<Vec<_>>()
                        )
                        .unwrap_or_default()
                    ));
                }
            }
        }
    }

    if params.include_reverse_references {
        let references = reverse_reference_ids(data, model.id());
        if !references.is_empty() {
            out.push_str(&format!(
                "\n## Referenced by\n\n{}\n",
                describe(&references)
            ));
        }
    }

    if params.include_block_embedders {
        let embedders = block_embedder_ids(data, model.id());
        if !embedders.is_empty() {
            out.push_str(&format!("\n## Embedded by\n\n{}\n", describe(&embedders)));
        }
    }

    out
}

/// Renders the model list shown when no query is given.
#[must_use]
pub fn render_model_list(data: &ProjectSchemaData) -> String {
    let mut out = String::from("# Project models\n\n");
    for model in &data.models {
        out.push_str(&format!(
            "- `{}` ({}){}: {} fields\n",
            model.api_key(),
            model.id(),
            if model.is_block() { " [block]" } else { "" },
            model.fields.len()
        ));
    }
    out.push_str("\nCall `schema_info` with `model` set to one of the api keys above.\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, api_key: &str, name: &str, block: bool, fields: Vec<Value>) -> ProjectModel {
        ProjectModel {
            raw: json!({
                "id": id,
                "api_key": api_key,
                "name": name,
                "modular_block": block
            }),
            fields,
        }
    }

    fn data() -> ProjectSchemaData {
        ProjectSchemaData {
            models: vec![
                model(
                    "100",
                    "blog_post",
                    "Blog post",
                    false,
                    vec![
                        json!({
                            "id": "f1",
                            "api_key": "title",
                            "field_type": "string",
                            "localized": true,
                            "appearance": { "editor": "single_line", "parameters": {} },
                            "validators": {}
                        }),
                        json!({
                            "id": "f2",
                            "api_key": "body",
                            "field_type": "structured_text",
                            "localized": false,
                            "validators": {
                                "structured_text_blocks": { "item_types": ["200"] }
                            }
                        }),
                        json!({
                            "id": "f3",
                            "api_key": "author",
                            "field_type": "link",
                            "localized": false,
                            "validators": {
                                "item_item_type": { "item_types": ["300"] }
                            }
                        }),
                    ],
                ),
                model(
                    "200",
                    "image_block",
                    "Image block",
                    true,
                    vec![json!({
                        "id": "f4",
                        "api_key": "nested",
                        "field_type": "rich_text",
                        "validators": { "rich_text_blocks": { "item_types": ["400"] } }
                    })],
                ),
                model("300", "author", "Author", false, vec![]),
                model("400", "quote_block", "Quote block", true, vec![]),
            ],
        }
    }

    #[test]
    fn test_rank_models_exact_and_fuzzy() {
        let data = data();
        let ranked = rank_models(&data, "blog_post");
        assert_eq!(ranked[0].0.api_key(), "blog_post");
        assert_eq!(ranked[0].1, 1000);

        let ranked = rank_models(&data, "blg");
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].0.api_key(), "blog_post");

        assert!(rank_models(&data, "zzz_qqq").is_empty());
    }

    #[test]
    fn test_strip_field_basic_drops_appearance() {
        let data = data();
        let field = &data.models[0].fields[0];
        let stripped = strip_field(field, FieldsDetails::Basic, &[]);
        assert!(stripped.get("appearance").is_none());
        assert_eq!(stripped["api_key"], "title");
        assert_eq!(stripped["field_type"], "string");
    }

    #[test]
    fn test_strip_field_complete_keeps_everything() {
        let data = data();
        let field = &data.models[0].fields[0];
        let kept = strip_field(field, FieldsDetails::Complete, &[]);
        assert_eq!(&kept, field);
    }

    #[test]
    fn test_strip_field_allowlist() {
        let data = data();
        let field = &data.models[0].fields[0];
        let stripped = strip_field(
            field,
            FieldsDetails::Allowlist,
            &["api_key".to_string(), "field_type".to_string()],
        );
        let map = stripped.as_object().unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_nested_blocks_recurse() {
        let data = data();
        // blog_post embeds image_block which embeds quote_block.
        assert_eq!(
            nested_block_ids(&data, "100"),
            vec!["200".to_string(), "400".to_string()]
        );
    }

    #[test]
    fn test_reverse_references() {
        let data = data();
        assert_eq!(reverse_reference_ids(&data, "300"), vec!["100".to_string()]);
        assert!(reverse_reference_ids(&data, "100").is_empty());
    }

    #[test]
    fn test_block_embedders() {
        let data = data();
        assert_eq!(block_embedder_ids(&data, "200"), vec!["100".to_string()]);
        assert_eq!(block_embedder_ids(&data, "400"), vec!["200".to_string()]);
    }

    #[test]
    fn test_render_model_list() {
        let rendered = render_model_list(&data());
        assert!(rendered.contains("`blog_post` (100)"));
        assert!(rendered.contains("[block]"));
    }

    #[test]
    fn test_render_model_info_sections() {
        let data = data();
        let params: SchemaInfoParams = serde_json::from_value(json!({
            "model": "blog_post",
            "include_nested_blocks": true,
            "include_reverse_references": true
        }))
        .unwrap();
        let rendered = render_model_info(&data, &data.models[0], &params, &[]);
        assert!(rendered.contains("# Blog post"));
        assert!(rendered.contains("## Nested blocks"));
        assert!(rendered.contains("`image_block`"));
        assert!(rendered.contains("`quote_block`"));
        assert!(!rendered.contains("## Embedded by"));
    }
}
