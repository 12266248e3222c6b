//! Parameter types for the MCP tools.
//!
//! Every tool takes a single JSON object described by a `JsonSchema`
//! derive; outputs are always one markdown text content block, so no
//! result structs exist here.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

/// Parameters for the `resource` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResourceParams {
    /// Resource namespace as listed by `resources` (e.g. `items`).
    pub resource: String,

    /// Summaries of `<details>` sections to expand in full. Empty or
    /// absent returns the collapsed overview.
    #[serde(default)]
    pub expand_details: Vec<String>,
}

/// Parameters for the `resource_action` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResourceActionParams {
    /// Resource namespace (e.g. `items`).
    pub resource: String,

    /// Action rel as listed by `resource` (e.g. `instances`, `create`).
    pub action: String,

    /// Summaries or example titles to expand in full.
    #[serde(default)]
    pub expand_details: Vec<String>,
}

/// Parameters for the `resource_action_method` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResourceActionMethodParams {
    /// Resource namespace (e.g. `items`).
    pub resource: String,

    /// Concrete client method (e.g. `list`, `rawList`).
    pub method: String,

    /// Maximum type-expansion depth (default 2).
    pub max_depth: Option<usize>,

    /// Type names to expand instead of the signature's own references;
    /// pass `"*"` to lift the depth limit.
    pub expand_types: Option<Vec<String>>,
}

/// Parameters for the execute tools (readonly and destructive variants).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteMethodParams {
    /// Resource namespace (e.g. `items`).
    pub resource: String,

    /// Action rel binding the method to an endpoint (e.g. `instances`).
    pub action: String,

    /// Concrete client method to invoke (e.g. `list`).
    pub method: String,

    /// Positional arguments, exactly as the method signature documents
    /// them.
    #[serde(default)]
    pub args: Vec<Value>,

    /// Optional JSONPath-like selector applied to the result before the
    /// byte cap (e.g. `data.*.id`).
    pub output_selector: Option<String>,
}

/// Field verbosity for `schema_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldsDetails {
    /// Strip verbose sub-structures, keep identity and typing.
    #[default]
    Basic,
    /// Return fields exactly as the API sent them.
    Complete,
    /// Keep only the properties listed in `field_props`.
    Allowlist,
}

/// Parameters for the `schema_info` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SchemaInfoParams {
    /// Model to look up, fuzzy-matched against `api_key`, `name`, and
    /// `id`. Absent lists every model.
    pub model: Option<String>,

    /// Include the model's fieldsets.
    #[serde(default)]
    pub include_fieldsets: bool,

    /// Recursively include the block models reachable from the model's
    /// fields.
    #[serde(default)]
    pub include_nested_blocks: bool,

    /// Include models holding link fields that reference this model.
    #[serde(default)]
    pub include_reverse_references: bool,

    /// Include models embedding this block in rich/structured/single-block
    /// fields.
    #[serde(default)]
    pub include_block_embedders: bool,

    /// How much of each field object to return.
    #[serde(default)]
    pub fields_details: FieldsDetails,

    /// Field properties to keep when `fields_details` is `allowlist`.
    #[serde(default)]
    pub field_props: Vec<String>,
}

/// One replacement for `update_script`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReplacementParam {
    /// Text that must occur exactly once at the time this replacement is
    /// processed.
    pub old_str: String,

    /// Replacement text.
    pub new_str: String,
}

/// Parameters for `create_script`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateScriptParams {
    /// Script name; must start with `script://` and end with `.ts`.
    pub name: String,

    /// TypeScript source.
    pub content: String,

    /// Also type-check with the workspace compiler (needs an API token
    /// for project-typed `schema.ts`). Default true.
    #[serde(default = "default_true")]
    pub typecheck: bool,

    /// Also execute immediately after saving. Default false.
    #[serde(default)]
    pub execute: bool,
}

/// Parameters for `update_script`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateScriptParams {
    /// Script name.
    pub name: String,

    /// Ordered replacements, applied sequentially.
    pub replacements: Vec<ReplacementParam>,

    /// Also type-check after updating. Default true.
    #[serde(default = "default_true")]
    pub typecheck: bool,

    /// Also execute after updating. Default false.
    #[serde(default)]
    pub execute: bool,
}

/// Parameters for `view_script`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ViewScriptParams {
    /// Script name.
    pub name: String,
}

/// Parameters for `execute_script`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteScriptParams {
    /// Script name.
    pub name: String,
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_script_defaults() {
        let params: CreateScriptParams = serde_json::from_value(serde_json::json!({
            "name": "script://demo.ts",
            "content": "export {};"
        }))
        .unwrap();
        assert!(params.typecheck);
        assert!(!params.execute);
    }

    #[test]
    fn test_fields_details_default_and_parsing() {
        let params: SchemaInfoParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(params.fields_details, FieldsDetails::Basic);

        let params: SchemaInfoParams = serde_json::from_value(serde_json::json!({
            "model": "blog_post",
            "fields_details": "allowlist",
            "field_props": ["api_key", "field_type"]
        }))
        .unwrap();
        assert_eq!(params.fields_details, FieldsDetails::Allowlist);
    }

    #[test]
    fn test_execute_method_params_defaults() {
        let params: ExecuteMethodParams = serde_json::from_value(serde_json::json!({
            "resource": "items",
            "action": "instances",
            "method": "list"
        }))
        .unwrap();
        assert!(params.args.is_empty());
        assert!(params.output_selector.is_none());
    }
}
