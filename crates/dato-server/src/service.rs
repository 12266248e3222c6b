//! The MCP tool surface.
//!
//! Tools compose into a discover → plan → execute ladder: `resources` →
//! `resource` → `resource_action` → `resource_action_method` for
//! discovery, the script tools for planning and running typed programs,
//! and the execute tools for direct one-shot calls. Documentation and
//! script-authoring tools always register; everything touching the live
//! project requires `DATOCMS_API_TOKEN` and registers only when it is
//! present.
//!
//! Every tool returns a single markdown text block. Failures become error
//! text results (with remediation hints) rather than protocol errors, so
//! one bad call never takes the server down.

use crate::render::{
    render_action, render_error, render_method, render_outcome, render_payload, render_resource,
    render_resources, render_script, render_script_saved, unknown_endpoint_error,
    verb_mismatch_error,
};
use crate::schema_info::{
    client_error, collection, fetch_project_schema, fetch_site_schema, rank_models,
    render_model_info, render_model_list,
};
use crate::state::AppState;
use crate::types::{
    CreateScriptParams, ExecuteMethodParams, ExecuteScriptParams, ResourceActionMethodParams,
    ResourceActionParams, ResourceParams, SchemaInfoParams, UpdateScriptParams, ViewScriptParams,
};
use dato_mcp_core::{select, Error, Result as DatoResult};
use dato_mcp_scripts::{Replacement, Script, ScriptStoreError, ValidationResult};
use dato_mcp_typegraph::{
    extract_method_signature, extract_type_dependencies, list_resource_methods, ExpandOptions,
    MethodSignature,
};
use dato_mcp_workspace::{ExecutionOutcome, TscValidation};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError};
use std::sync::Arc;

/// The MCP service.
#[derive(Debug, Clone)]
pub struct DatoCmsService {
    state: Arc<AppState>,
    tool_router: ToolRouter<Self>,
}

impl DatoCmsService {
    /// Builds the service, registering the client-bound tools only when an
    /// API token is configured.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        let mut tool_router = Self::docs_tool_router();
        if state.config.has_api_token() {
            tool_router = tool_router + Self::client_tool_router();
        } else {
            tracing::info!("no DATOCMS_API_TOKEN: registering documentation and script tools only");
        }
        Self { state, tool_router }
    }

    /// Number of registered tools; client-bound tools register only when
    /// an API token is configured.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tool_router.list_all().len()
    }

    fn respond(result: DatoResult<String>) -> std::result::Result<CallToolResult, McpError> {
        Ok(match result {
            Ok(markdown) => CallToolResult::success(vec![Content::text(markdown)]),
            Err(error) => CallToolResult::error(vec![Content::text(render_error(&error))]),
        })
    }
}

// ===========================================================================
// Documentation & script authoring (always registered)
// ===========================================================================

#[tool_router(router = docs_tool_router)]
impl DatoCmsService {
    /// Lists every CMA resource with its namespace and action count.
    #[tool(
        description = "List all DatoCMS CMA resources (items, uploads, itemTypes, …). Start here; then call `resource` for one of them."
    )]
    pub async fn resources(&self) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let schema = self.state.resources().await?;
            let hyperschema = self.state.hyperschema().await?;
            Ok(render_resources(&schema, hyperschema))
        };
        Self::respond(inner.await)
    }

    /// Describes one resource and lists its actions.
    #[tool(
        description = "Describe one CMA resource and list its actions. Call `resources` first for valid namespaces; pass `expand_details` to open collapsed sections."
    )]
    pub async fn resource(
        &self,
        Parameters(params): Parameters<ResourceParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let schema = self.state.resources().await?;
            let entity = schema.find_by_namespace(&params.resource).ok_or_else(|| {
                Error::not_found(
                    format!("resource `{}`", params.resource),
                    "call `resources` to list valid namespaces",
                )
            })?;
            let hyperschema = self.state.hyperschema().await?;
            let hyper_entity = hyperschema.find_entity(&entity.json_api_type);
            Ok(render_resource(
                entity,
                hyper_entity.as_ref(),
                &params.expand_details,
            ))
        };
        Self::respond(inner.await)
    }

    /// Describes one action: prose, examples, and bound client methods.
    #[tool(
        description = "Describe one action of a resource: documentation, examples, and the client methods implementing it. Call `resource` first for valid action rels."
    )]
    pub async fn resource_action(
        &self,
        Parameters(params): Parameters<ResourceActionParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let schema = self.state.resources().await?;
            let flat = schema
                .find_endpoint_by_rel(&params.resource, &params.action)
                .ok_or_else(|| unknown_endpoint_error(&params.resource, &params.action))?;

            let hyperschema = self.state.hyperschema().await?;
            let link = hyperschema.find_link(&flat.entity.json_api_type, &flat.endpoint.rel);

            let signatures = self
                .signatures_for_action(&params.resource, &flat.endpoint)
                .await?;

            Ok(render_action(
                &flat,
                link.as_ref(),
                &signatures,
                &params.expand_details,
            ))
        };
        Self::respond(inner.await)
    }

    /// Shows one method's exact signature with bounded type expansion.
    #[tool(
        description = "Show the exact TypeScript signature of a client method with its referenced types expanded to a bounded depth. Use `expand_types` to drill into deferred types, or pass \"*\" for everything."
    )]
    pub async fn resource_action_method(
        &self,
        Parameters(params): Parameters<ResourceActionMethodParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let program = self.state.program().await?;
            let signature = extract_method_signature(&program, &params.resource, &params.method)
                .ok_or_else(|| {
                    Error::not_found(
                        format!("method `{}` on resource `{}`", params.method, params.resource),
                        format!(
                            "call `resource_action` with resource `{}` to list its methods",
                            params.resource
                        ),
                    )
                })?;

            let options = ExpandOptions {
                max_depth: params.max_depth.unwrap_or(2),
                expand_types: params.expand_types.clone(),
            };
            let expansion =
                extract_type_dependencies(&program, &signature.referenced_type_symbols, &options);
            Ok(render_method(&params.resource, &signature, &expansion))
        };
        Self::respond(inner.await)
    }

    /// Creates a script, validating but never blocking on validation.
    #[tool(
        description = "Create a TypeScript script named `script://<name>.ts`. The script must default-export an async function taking the client. Invalid scripts are saved anyway so you can read the errors."
    )]
    pub async fn create_script(
        &self,
        Parameters(params): Parameters<CreateScriptParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let (script, structural) = self
                .state
                .scripts
                .create(&params.name, &params.content)
                .await
                .map_err(store_error)?;
            self.finish_script_save(script, structural, params.typecheck, params.execute)
                .await
        };
        Self::respond(inner.await)
    }

    /// Updates a script via ordered exact-match replacements.
    #[tool(
        description = "Update a script with an ordered list of {old_str, new_str} replacements. Each old_str must match exactly once at the time it is applied; the whole update is atomic."
    )]
    pub async fn update_script(
        &self,
        Parameters(params): Parameters<UpdateScriptParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let replacements: Vec<Replacement> = params
                .replacements
                .iter()
                .map(|r| Replacement {
                    old_str: r.old_str.clone(),
                    new_str: r.new_str.clone(),
                })
                .collect();
            let (script, structural) = self
                .state
                .scripts
                .update(&params.name, &replacements)
                .await
                .map_err(store_error)?;
            self.finish_script_save(script, structural, params.typecheck, params.execute)
                .await
        };
        Self::respond(inner.await)
    }

    /// Returns a script's current content.
    #[tool(description = "View the current content of a stored script.")]
    pub async fn view_script(
        &self,
        Parameters(params): Parameters<ViewScriptParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let script = self.state.scripts.get(&params.name).await.ok_or_else(|| {
                Error::not_found(
                    format!("script `{}`", params.name),
                    "create it first with `create_script`",
                )
            })?;
            Ok(render_script(&script))
        };
        Self::respond(inner.await)
    }
}

// ===========================================================================
// Client-bound tools (require DATOCMS_API_TOKEN)
// ===========================================================================

#[tool_router(router = client_tool_router)]
impl DatoCmsService {
    /// Executes a read-only (GET) method directly.
    #[tool(
        description = "Execute a read-only (GET) client method directly. args are the method's positional arguments; output_selector (e.g. `data.*.id`) narrows the payload before the byte cap."
    )]
    pub async fn resource_action_readonly_method_execute(
        &self,
        Parameters(params): Parameters<ExecuteMethodParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        Self::respond(self.execute_method(&params, true).await)
    }

    /// Executes a mutating (non-GET) method directly.
    #[tool(
        description = "Execute a mutating (POST/PUT/DELETE) client method directly. Use the readonly variant for GET endpoints."
    )]
    pub async fn resource_action_destructive_method_execute(
        &self,
        Parameters(params): Parameters<ExecuteMethodParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        Self::respond(self.execute_method(&params, false).await)
    }

    /// Looks up the project's content model.
    #[tool(
        description = "Inspect the project's content model. Without `model`, lists every model; with it, fuzzy-matches by api_key/name/id and returns fields, optionally with fieldsets, nested blocks, reverse references, and block embedders."
    )]
    pub async fn schema_info(
        &self,
        Parameters(params): Parameters<SchemaInfoParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let client = self.state.client().await?;
            let data = fetch_project_schema(&client).await?;

            let Some(query) = &params.model else {
                return Ok(render_model_list(&data));
            };

            let ranked = rank_models(&data, query);
            let Some((model, _)) = ranked.first().copied() else {
                return Err(Error::not_found(
                    format!("model matching `{query}`"),
                    "call `schema_info` without `model` to list all models",
                ));
            };

            let fieldsets = if params.include_fieldsets {
                let raw = client
                    .call("fieldsets", "list", &[serde_json::json!(model.id())])
                    .await
                    .map_err(client_error)?;
                collection(raw)
            } else {
                Vec::new()
            };

            let mut output = render_model_info(&data, model, &params, &fieldsets);
            if ranked.len() > 1 {
                let others: Vec<String> = ranked[1..]
                    .iter()
                    .take(5)
                    .map(|(m, _)| format!("`{}`", m.api_key()))
                    .collect();
                output.push_str(&format!("\nOther candidates: {}.\n", others.join(", ")));
            }
            Ok(output)
        };
        Self::respond(inner.await)
    }

    /// Type-checks and runs a stored script in the workspace sandbox.
    #[tool(
        description = "Type-check and execute a stored script in the workspace sandbox (timeout and output caps apply). The script runs out of process against the live project."
    )]
    pub async fn execute_script(
        &self,
        Parameters(params): Parameters<ExecuteScriptParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let inner = async {
            let script = self.state.scripts.get(&params.name).await.ok_or_else(|| {
                Error::not_found(
                    format!("script `{}`", params.name),
                    "create it first with `create_script`",
                )
            })?;

            let schema_ts = self.project_schema_ts().await?;
            let validation = self
                .state
                .workspace
                .validate_script(script.basename(), &script.content, &schema_ts)
                .await?;
            if !validation.success {
                return Ok(format!(
                    "TypeScript validation failed; the script was not executed:\n```\n{}\n```\n",
                    validation.output
                ));
            }

            let env = self.state.client_env().await?;
            let outcome = self
                .state
                .workspace
                .execute_script(script.basename(), &script.content, &schema_ts, &env)
                .await?;
            Ok(render_outcome(&outcome))
        };
        Self::respond(inner.await)
    }
}

// ===========================================================================
// Shared tool plumbing
// ===========================================================================

impl DatoCmsService {
    /// Extracts the signatures of every client method bound to an endpoint
    /// via the `Read more:` URL; name-based matching is only the fallback
    /// for endpoints without a documentation URL.
    async fn signatures_for_action(
        &self,
        resource: &str,
        endpoint: &dato_mcp_hyperschema::Endpoint,
    ) -> DatoResult<Vec<MethodSignature>> {
        let program = self.state.program().await?;
        let Some(methods) = list_resource_methods(&program, resource) else {
            return Ok(Vec::new());
        };

        let mut signatures = Vec::new();
        for method in methods {
            let Some(signature) = extract_method_signature(&program, resource, &method) else {
                continue;
            };
            let bound = match (&endpoint.doc_url, &signature.action_url) {
                (Some(doc_url), Some(action_url)) => doc_url == action_url,
                (None, _) => {
                    endpoint.name.as_deref() == Some(method.as_str())
                        || endpoint.raw_name == method
                }
                _ => false,
            };
            if bound {
                signatures.push(signature);
            }
        }
        Ok(signatures)
    }

    async fn execute_method(&self, params: &ExecuteMethodParams, readonly: bool) -> DatoResult<String> {
        let schema = self.state.resources().await?;
        let flat = schema
            .find_endpoint_by_rel(&params.resource, &params.action)
            .ok_or_else(|| unknown_endpoint_error(&params.resource, &params.action))?;
        let endpoint = &flat.endpoint;

        let is_get = endpoint.method.eq_ignore_ascii_case("GET");
        if is_get != readonly {
            return Err(verb_mismatch_error(endpoint, readonly));
        }

        let method_matches = endpoint.name.as_deref() == Some(params.method.as_str())
            || endpoint.raw_name == params.method;
        if !method_matches {
            return Err(Error::not_found(
                format!(
                    "method `{}` on action `{}.{}`",
                    params.method, params.resource, params.action
                ),
                format!(
                    "this action maps to `{}`{}",
                    endpoint.raw_name,
                    endpoint
                        .name
                        .as_deref()
                        .map(|n| format!(" / `{n}`"))
                        .unwrap_or_default()
                ),
            ));
        }

        let client = self.state.client().await?;
        let value = client
            .call(&params.resource, &params.method, &params.args)
            .await
            .map_err(client_error)?;

        let value = match &params.output_selector {
            Some(selector) => select(&value, selector)?,
            None => value,
        };
        Ok(render_payload(&value, self.state.config.max_output_bytes))
    }

    /// Runs the optional typecheck/execute follow-ups after a script save.
    async fn finish_script_save(
        &self,
        script: Script,
        structural: ValidationResult,
        typecheck: bool,
        execute: bool,
    ) -> DatoResult<String> {
        let mut tsc: Option<TscValidation> = None;
        let mut outcome: Option<ExecutionOutcome> = None;

        if (typecheck || execute) && self.state.config.has_api_token() {
            let schema_ts = self.project_schema_ts().await?;
            if typecheck {
                tsc = Some(
                    self.state
                        .workspace
                        .validate_script(script.basename(), &script.content, &schema_ts)
                        .await?,
                );
            }
            let typecheck_passed = tsc.as_ref().is_none_or(|v| v.success);
            if execute && typecheck_passed {
                let env = self.state.client_env().await?;
                outcome = Some(
                    self.state
                        .workspace
                        .execute_script(script.basename(), &script.content, &schema_ts, &env)
                        .await?,
                );
            }
        }

        Ok(render_script_saved(
            &script,
            &structural,
            tsc.as_ref(),
            outcome.as_ref(),
        ))
    }

    /// Generates the per-project `schema.ts` source from live data.
    async fn project_schema_ts(&self) -> DatoResult<String> {
        let client = self.state.client().await?;
        let site = fetch_site_schema(&client).await?;
        dato_mcp_workspace::generate_schema_ts(&site)
    }
}

fn store_error(error: ScriptStoreError) -> Error {
    match error {
        ScriptStoreError::NotFound { name } => Error::not_found(
            format!("script `{name}`"),
            "create it first with `create_script`",
        ),
        other => Error::Script {
            message: other.to_string(),
        },
    }
}

#[tool_handler]
impl ServerHandler for DatoCmsService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Work with the DatoCMS Content Management API through a layered toolset: \
                 discover with `resources` → `resource` → `resource_action` → \
                 `resource_action_method`, then either execute a single call with the \
                 execute tools or author a typed TypeScript script with `create_script` \
                 and run it with `execute_script`. Scripts import `@datocms/*` packages \
                 and `./schema` (this project's typed models) only."
                    .to_string(),
            ),
        }
    }
}
