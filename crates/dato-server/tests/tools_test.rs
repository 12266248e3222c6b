//! End-to-end tool tests against an on-disk fixture client package, a
//! stub CMA client, and a pre-materialized workspace with fake compiler
//! binaries.

use async_trait::async_trait;
use dato_mcp_client::{ClientConfig, CmaClient, CmaError, SharedClient};
use dato_mcp_core::Config;
use dato_mcp_server::{AppState, DatoCmsService};
use dato_mcp_workspace::Workspace;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ===========================================================================
// Fixtures
// ===========================================================================

const CLIENT_DTS: &str = r"
import * as SimpleSchemaTypes from './SimpleSchemaTypes.js';
import * as SchemaTypes from './SchemaTypes.js';

export declare class Items {
    /** Lists all records.
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item/instances
     */
    list(queryParams?: SimpleSchemaTypes.ItemInstancesHrefSchema): Promise<SimpleSchemaTypes.ItemInstancesTargetSchema>;
    /** Lists all records (raw envelope).
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item/instances
     */
    rawList(queryParams?: SchemaTypes.ItemInstancesHrefSchema): Promise<SchemaTypes.ItemInstancesTargetSchema>;
    /** Deletes a record.
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item/destroy
     */
    destroy(itemId: string): Promise<SimpleSchemaTypes.Item>;
}

export declare class ItemTypes {
    /** Lists all models.
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item-type/instances
     */
    list(): Promise<SimpleSchemaTypes.ItemTypeInstancesTargetSchema>;
    /** Lists all models (raw envelope).
     *
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item-type/instances
     */
    rawList(): Promise<SchemaTypes.ItemTypeInstancesTargetSchema>;
}

export declare class Client {
    items: Items;
    itemTypes: ItemTypes;
}
";

const SIMPLE_TYPES_DTS: &str = r"
export type ItemTypeInstancesTargetSchema = ItemType[];
export type ItemInstancesTargetSchema = Item[];
export type ItemInstancesHrefSchema = {
    page?: { offset?: number; limit?: number };
};
export type Item = { id: string };
export type ItemType = { id: string; api_key: string };
";

const RAW_TYPES_DTS: &str = r"
export type ItemTypeInstancesTargetSchema = { data: ItemType[] };
export type ItemInstancesTargetSchema = { data: Item[] };
export type ItemInstancesHrefSchema = { 'page[limit]'?: number };
export type Item = { id: string; type: 'item' };
export type ItemType = { id: string; type: 'item_type' };
";

fn resources_manifest() -> Value {
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
                    "paginatedResponse": true,
                    "docUrl": "https://www.datocms.com/docs/content-management-api/resources/item/instances"
                },
                {
                    "rel": "destroy",
                    "name": "destroy",
                    "rawName": "rawDestroy",
                    "method": "DELETE",
                    "urlTemplate": "/items/:item_id",
                    "urlPlaceholders": [{ "variableName": "item_id", "isEntityId": true }],
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
                    "docUrl": "https://www.datocms.com/docs/content-management-api/resources/item-type/instances"
                }
            ]
        }
    ])
}

fn hyperschema_document() -> Value {
    json!({
        "properties": {
            "item": {
                "title": "Record",
                "description": "A single record of content. <details><summary>Localization</summary>Records hold one value per locale.</details>",
                "links": [
                    {
                        "rel": "instances",
                        "title": "List all records",
                        "method": "GET",
                        "description": "Lists records. ::example[list-basic]",
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
                    },
                    { "rel": "destroy", "title": "Delete a record", "method": "DELETE" }
                ]
            },
            "item_type": {
                "title": "Model",
                "links": [
                    { "rel": "instances", "title": "List all models", "method": "GET" }
                ]
            }
        }
    })
}

/// Stub client answering from a canned response table.
#[derive(Debug)]
struct StubClient {
    config: ClientConfig,
    responses: HashMap<(String, String), Value>,
}

impl StubClient {
    fn with_project_fixtures() -> Self {
        let mut responses = HashMap::new();
        responses.insert(
            ("site".to_string(), "find".to_string()),
            json!({ "id": "site", "locales": ["en"] }),
        );
        responses.insert(
            ("itemTypes".to_string(), "list".to_string()),
            json!([
                {
                    "id": "100",
                    "api_key": "blog_post",
                    "name": "Blog post",
                    "modular_block": false,
                    "sortable": false,
                    "tree": false
                },
                {
                    "id": "200",
                    "api_key": "image_block",
                    "name": "Image block",
                    "modular_block": true,
                    "sortable": false,
                    "tree": false
                }
            ]),
        );
        responses.insert(
            ("fields".to_string(), "list".to_string()),
            json!([
                {
                    "id": "f1",
                    "api_key": "title",
                    "field_type": "string",
                    "localized": false,
                    "appearance": { "editor": "single_line" },
                    "validators": {}
                }
            ]),
        );
        responses.insert(
            ("fieldsets".to_string(), "list".to_string()),
            json!([]),
        );
        responses.insert(
            ("items".to_string(), "list".to_string()),
            json!([
                { "id": "38", "title": "first" },
                { "id": "81", "title": "second" }
            ]),
        );
        responses.insert(
            ("items".to_string(), "destroy".to_string()),
            json!({ "id": "38" }),
        );
        Self {
            config: ClientConfig {
                api_token: "test-token".to_string(),
                environment: None,
                base_url: None,
            },
            responses,
        }
    }
}

#[async_trait]
impl CmaClient for StubClient {
    fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn call(
        &self,
        resource: &str,
        method: &str,
        _args: &[Value],
    ) -> Result<Value, CmaError> {
        self.responses
            .get(&(resource.to_string(), method.to_string()))
            .cloned()
            .ok_or_else(|| CmaError::UnknownMethod {
                resource: resource.to_string(),
                method: method.to_string(),
            })
    }
}

/// Builds the fixture workspace: installed client package, manifest, and
/// fake `tsc`/`tsx` binaries, with the four workspace files pre-written so
/// `ensure()` takes its fast path.
fn build_workspace(root: &Path) {
    let package_dir = root.join("node_modules/@datocms/cma-client-node");
    std::fs::create_dir_all(&package_dir).unwrap();
    std::fs::write(
        package_dir.join("package.json"),
        json!({ "name": "@datocms/cma-client-node", "version": "4.1.0", "types": "index.d.ts" })
            .to_string(),
    )
    .unwrap();
    std::fs::write(package_dir.join("index.d.ts"), CLIENT_DTS).unwrap();
    std::fs::write(package_dir.join("SimpleSchemaTypes.d.ts"), SIMPLE_TYPES_DTS).unwrap();
    std::fs::write(package_dir.join("SchemaTypes.d.ts"), RAW_TYPES_DTS).unwrap();
    std::fs::write(
        package_dir.join("resources.json"),
        resources_manifest().to_string(),
    )
    .unwrap();

    std::fs::write(root.join("package.json"), "{}").unwrap();
    std::fs::write(root.join("tsconfig.json"), "{}").unwrap();
    std::fs::write(root.join("runner.ts"), "// fixture").unwrap();
    std::fs::create_dir_all(root.join("scripts")).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let bin = root.join("node_modules/.bin");
        std::fs::create_dir_all(&bin).unwrap();
        for (name, body) in [("tsc", "exit 0"), ("tsx", "echo hi")] {
            let path = bin.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }
}

fn service_with_token(dir: &TempDir) -> DatoCmsService {
    let root = dir.path().join("workspace");
    std::fs::create_dir_all(&root).unwrap();
    build_workspace(&root);

    let config = Config {
        api_token: Some("test-token".to_string()),
        execution_timeout: Duration::from_secs(5),
        max_output_bytes: 8192,
        ..Config::default()
    };
    let workspace = Workspace::new(root.clone(), config.execution_timeout, config.max_output_bytes);
    let client: SharedClient = Arc::new(StubClient::with_project_fixtures());
    let state = AppState::with_workspace(config, workspace)
        .with_hyperschema_document(hyperschema_document())
        .with_node_modules(root.join("node_modules"))
        .with_client(client);
    DatoCmsService::new(Arc::new(state))
}

fn service_without_token(dir: &TempDir) -> DatoCmsService {
    let root = dir.path().join("workspace");
    std::fs::create_dir_all(&root).unwrap();
    build_workspace(&root);

    let config = Config::default();
    let workspace = Workspace::new(root.clone(), config.execution_timeout, config.max_output_bytes);
    let state = AppState::with_workspace(config, workspace)
        .with_hyperschema_document(hyperschema_document())
        .with_node_modules(root.join("node_modules"));
    DatoCmsService::new(Arc::new(state))
}

fn text_of(result: &CallToolResult) -> String {
    result.content[0].as_text().unwrap().text.clone()
}

fn assert_not_error(result: &CallToolResult, context: &str) {
    assert_ne!(
        result.is_error,
        Some(true),
        "{context} failed: {}",
        text_of(result)
    );
}

// ===========================================================================
// Discovery tools
// ===========================================================================

#[tokio::test]
async fn test_resources_lists_namespaces() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let result = service.resources().await.unwrap();
    assert_not_error(&result, "resources");
    let text = text_of(&result);
    assert!(text.contains("`items`"));
    assert!(text.contains("`itemTypes`"));
    assert!(text.contains("Record"));
}

#[tokio::test]
async fn test_resource_shows_collapsed_details_and_actions() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let result = service
        .resource(Parameters(serde_json::from_value(json!({ "resource": "items" })).unwrap()))
        .await
        .unwrap();
    assert_not_error(&result, "resource");
    let text = text_of(&result);
    assert!(text.contains("# Record"));
    assert!(text.contains("<details><summary>Localization</summary></details>"));
    assert!(!text.contains("one value per locale"));
    assert!(text.contains("`instances`"));
    assert!(text.contains("`destroy`"));
}

#[tokio::test]
async fn test_resource_unknown_namespace_has_remediation() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let result = service
        .resource(Parameters(serde_json::from_value(json!({ "resource": "itemz" })).unwrap()))
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(true));
    let text = text_of(&result);
    assert!(text.contains("call `resources`"));
}

#[tokio::test]
async fn test_resource_action_binds_methods_by_doc_url() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let result = service
        .resource_action(Parameters(
            serde_json::from_value(json!({ "resource": "items", "action": "instances" })).unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&result, "resource_action");
    let text = text_of(&result);
    // Both list and rawList share the instances doc URL; destroy does not.
    assert!(text.contains("list(queryParams?:"));
    assert!(text.contains("rawList(queryParams?:"));
    assert!(!text.contains("destroy(itemId"));
    // Example appears collapsed by default.
    assert!(text.contains("<details><summary>Basic listing</summary></details>"));
}

#[tokio::test]
async fn test_resource_action_expand_details_opens_example() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let result = service
        .resource_action(Parameters(
            serde_json::from_value(json!({
                "resource": "items",
                "action": "instances",
                "expand_details": ["Basic listing"]
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&result, "resource_action expand");
    let text = text_of(&result);
    assert!(text.contains("await client.items.list();"));
}

#[tokio::test]
async fn test_resource_action_method_distinguishes_raw_and_simple() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let simple = service
        .resource_action_method(Parameters(
            serde_json::from_value(json!({ "resource": "itemTypes", "method": "list" })).unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&simple, "resource_action_method list");
    let simple_text = text_of(&simple);
    assert!(simple_text.contains("export type ItemTypeInstancesTargetSchema = ItemType[];"));

    let raw = service
        .resource_action_method(Parameters(
            serde_json::from_value(json!({ "resource": "itemTypes", "method": "rawList" }))
                .unwrap(),
        ))
        .await
        .unwrap();
    let raw_text = text_of(&raw);
    assert!(raw_text.contains("export type ItemTypeInstancesTargetSchema = { data: ItemType[] };"));
}

#[tokio::test]
async fn test_resource_action_method_reports_deferred_types() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let result = service
        .resource_action_method(Parameters(
            serde_json::from_value(json!({
                "resource": "items",
                "method": "list",
                "max_depth": 1
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    let text = text_of(&result);
    assert!(text.contains("not expanded"), "text: {text}");
    assert!(text.contains("expand_types"));
}

// ===========================================================================
// Execute tools
// ===========================================================================

#[tokio::test]
async fn test_readonly_execute_with_selector() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let result = service
        .resource_action_readonly_method_execute(Parameters(
            serde_json::from_value(json!({
                "resource": "items",
                "action": "instances",
                "method": "list",
                "output_selector": "*.id"
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&result, "readonly execute");
    let text = text_of(&result);
    assert!(text.contains("\"38\""));
    assert!(text.contains("\"81\""));
    assert!(!text.contains("first"));
}

#[tokio::test]
async fn test_execute_verb_variant_enforcement() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    // GET endpoint through the destructive tool: rejected.
    let wrong = service
        .resource_action_destructive_method_execute(Parameters(
            serde_json::from_value(json!({
                "resource": "items",
                "action": "instances",
                "method": "list"
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(wrong.is_error, Some(true));
    assert!(text_of(&wrong).contains("readonly"));

    // DELETE endpoint through the readonly tool: rejected.
    let wrong = service
        .resource_action_readonly_method_execute(Parameters(
            serde_json::from_value(json!({
                "resource": "items",
                "action": "destroy",
                "method": "destroy",
                "args": ["38"]
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(wrong.is_error, Some(true));

    // DELETE through the destructive tool: accepted.
    let right = service
        .resource_action_destructive_method_execute(Parameters(
            serde_json::from_value(json!({
                "resource": "items",
                "action": "destroy",
                "method": "destroy",
                "args": ["38"]
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&right, "destructive execute");
}

// ===========================================================================
// Schema info
// ===========================================================================

#[tokio::test]
async fn test_schema_info_lists_and_fuzzy_matches() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let listing = service
        .schema_info(Parameters(serde_json::from_value(json!({})).unwrap()))
        .await
        .unwrap();
    assert!(text_of(&listing).contains("`blog_post`"));

    let matched = service
        .schema_info(Parameters(
            serde_json::from_value(json!({ "model": "blg_pst" })).unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&matched, "schema_info fuzzy");
    let text = text_of(&matched);
    assert!(text.contains("# Blog post"));
    // Basic mode strips appearance.
    assert!(!text.contains("single_line"));
}

// ===========================================================================
// Script tools
// ===========================================================================

const SCRIPT: &str = "import { Client } from \"@datocms/cma-client-node\";\n\nexport default async (client: Client) => {\n    const items = await client.items.list();\n    console.log(items.length);\n};\n";

#[tokio::test]
async fn test_script_create_update_view_roundtrip() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let created = service
        .create_script(Parameters(
            serde_json::from_value(json!({
                "name": "script://demo.ts",
                "content": SCRIPT,
                "typecheck": false
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&created, "create_script");
    assert!(text_of(&created).contains("Structural validation passed."));

    let updated = service
        .update_script(Parameters(
            serde_json::from_value(json!({
                "name": "script://demo.ts",
                "replacements": [
                    { "old_str": "items.list()", "new_str": "items.find('x')" }
                ],
                "typecheck": false
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&updated, "update_script");

    let viewed = service
        .view_script(Parameters(
            serde_json::from_value(json!({ "name": "script://demo.ts" })).unwrap(),
        ))
        .await
        .unwrap();
    let text = text_of(&viewed);
    assert!(text.contains("items.find('x')"));
    assert!(!text.contains("items.list()"));
}

#[tokio::test]
async fn test_create_script_reports_structural_errors_but_saves() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    let created = service
        .create_script(Parameters(
            serde_json::from_value(json!({
                "name": "script://bad.ts",
                "content": "import axios from \"axios\";\nexport default async (client: Client) => {};",
                "typecheck": false
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&created, "create_script invalid");
    let text = text_of(&created);
    assert!(text.contains("Invalid import: \"axios\""));

    // Saved regardless.
    let viewed = service
        .view_script(Parameters(
            serde_json::from_value(json!({ "name": "script://bad.ts" })).unwrap(),
        ))
        .await
        .unwrap();
    assert!(text_of(&viewed).contains("axios"));
}

#[tokio::test]
async fn test_update_script_duplicate_match_is_tagged() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    service
        .create_script(Parameters(
            serde_json::from_value(json!({
                "name": "script://dup.ts",
                "content": "export default async (c: Client) => { x(); x(); };",
                "typecheck": false
            }))
            .unwrap(),
        ))
        .await
        .unwrap();

    let updated = service
        .update_script(Parameters(
            serde_json::from_value(json!({
                "name": "script://dup.ts",
                "replacements": [{ "old_str": "x()", "new_str": "y()" }],
                "typecheck": false
            }))
            .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(updated.is_error, Some(true));
    let text = text_of(&updated);
    assert!(text.contains("#1"));
    assert!(text.contains("must be unique"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_script_runs_through_workspace() {
    let dir = TempDir::new().unwrap();
    let service = service_with_token(&dir);

    service
        .create_script(Parameters(
            serde_json::from_value(json!({
                "name": "script://run.ts",
                "content": SCRIPT,
                "typecheck": false
            }))
            .unwrap(),
        ))
        .await
        .unwrap();

    let executed = service
        .execute_script(Parameters(
            serde_json::from_value(json!({ "name": "script://run.ts" })).unwrap(),
        ))
        .await
        .unwrap();
    assert_not_error(&executed, "execute_script");
    let text = text_of(&executed);
    assert!(text.contains("succeeded"), "text: {text}");
    assert!(text.contains("hi"));
}

// ===========================================================================
// Token gating
// ===========================================================================

#[tokio::test]
async fn test_tool_registration_depends_on_token() {
    let dir = TempDir::new().unwrap();
    let with_token = service_with_token(&dir);

    let dir2 = TempDir::new().unwrap();
    let without_token = service_without_token(&dir2);

    assert!(with_token.tool_count() > without_token.tool_count());
    // Documentation and script tools stay available without a token.
    let result = without_token.resources().await.unwrap();
    assert_ne!(result.is_error, Some(true));
}
