//! Markdown rendering for tool responses.
//!
//! Every tool answers with one markdown text block: TypeScript in `ts`
//! fences, payloads in `json` fences, and an explicit pointer to the next
//! tool in the discover → plan → execute ladder.

use dato_mcp_core::{cap_output, Error};
use dato_mcp_hyperschema::{
    render_description, Endpoint, EndpointWithEntity, Entity, Hyperschema, Link, ResourceEntity,
    ResourceSchema,
};
use dato_mcp_scripts::{Script, ValidationResult};
use dato_mcp_typegraph::{MethodSignature, TypeExpansion};
use dato_mcp_workspace::{ExecutionOutcome, TscValidation};
use serde_json::Value;

/// Renders the grouped resource list for the `resources` tool.
#[must_use]
pub fn render_resources(schema: &ResourceSchema, hyperschema: &Hyperschema) -> String {
    let mut out = String::from("# DatoCMS resources\n\n");
    out.push_str(
        "Call `resource` with one of these namespaces to see its description and actions.\n\n",
    );
    for entity in schema.entities() {
        let title = hyperschema
            .find_entity(&entity.json_api_type)
            .and_then(|e| e.title)
            .unwrap_or_else(|| entity.resource_class_name.clone());
        out.push_str(&format!(
            "- `{}` ({}): {} ({} actions)\n",
            entity.namespace,
            entity.json_api_type,
            title,
            entity.endpoints.len()
        ));
    }
    out
}

/// Renders one resource: description plus its action table.
#[must_use]
pub fn render_resource(
    entity: &ResourceEntity,
    hyper_entity: Option<&Entity>,
    expand_details: &[String],
) -> String {
    let title = hyper_entity
        .and_then(|e| e.title.clone())
        .unwrap_or_else(|| entity.resource_class_name.clone());
    let mut out = format!("# {title} (`{}`)\n\n", entity.namespace);

    if let Some(description) = hyper_entity.and_then(|e| e.description.as_deref()) {
        out.push_str(&render_description(description, &[], expand_details));
        out.push_str("\n\n");
    }

    out.push_str("## Actions\n\n");
    for endpoint in &entity.endpoints {
        out.push_str(&format!(
            "- `{}`: {} `{}`{}{}\n",
            endpoint.rel,
            endpoint.method,
            endpoint.url_template,
            if endpoint.paginated_response {
                " (paginated)"
            } else {
                ""
            },
            endpoint
                .deprecated
                .as_deref()
                .map(|d| format!(" DEPRECATED: {d}"))
                .unwrap_or_default(),
        ));
    }
    out.push_str(&format!(
        "\nCall `resource_action` with resource `{}` and one of the rels above.\n",
        entity.namespace
    ));
    out
}

/// Renders one action: link prose, endpoint metadata, and the signatures
/// of every client method bound to it.
#[must_use]
pub fn render_action(
    flat: &EndpointWithEntity,
    link: Option<&Link>,
    signatures: &[MethodSignature],
    expand_details: &[String],
) -> String {
    let endpoint = &flat.endpoint;
    let title = link
        .and_then(|l| l.title.clone())
        .unwrap_or_else(|| endpoint.rel.clone());
    let mut out = format!("# {}.{}: {title}\n\n", flat.entity.namespace, endpoint.rel);

    out.push_str(&format!(
        "`{} {}`{}\n\n",
        endpoint.method,
        endpoint.url_template,
        if endpoint.paginated_response {
            " (paginated)"
        } else {
            ""
        }
    ));
    if let Some(deprecated) = &endpoint.deprecated {
        out.push_str(&format!("**Deprecated:** {deprecated}\n\n"));
    }

    let examples = link.map(Link::examples).unwrap_or_default();
    if let Some(description) = link.and_then(|l| l.description.as_deref()) {
        out.push_str(&render_description(description, examples, expand_details));
        out.push_str("\n\n");
    } else if !examples.is_empty() {
        out.push_str(&render_description("", examples, expand_details));
        out.push_str("\n\n");
    }

    if signatures.is_empty() {
        out.push_str("No generated client methods are bound to this action.\n");
    } else {
        out.push_str("## Client methods\n\n");
        for signature in signatures {
            out.push_str(&format_signature_block(signature));
            out.push('\n');
        }
        out.push_str(&format!(
            "Call `resource_action_method` with resource `{}` and one of the method names above for full types.\n",
            flat.entity.namespace
        ));
    }
    out
}

/// Renders one method with its expanded type dependencies.
#[must_use]
pub fn render_method(
    resource: &str,
    signature: &MethodSignature,
    expansion: &TypeExpansion,
) -> String {
    let mut out = format!("# {resource}.{}\n\n", signature.method_name);

    if let Some(doc) = &signature.doc {
        out.push_str(doc);
        out.push_str("\n\n");
    }
    out.push_str(&format_signature_block(signature));

    if !expansion.expanded_types.is_empty() {
        out.push_str("\n## Referenced types\n\n```ts\n");
        out.push_str(&expansion.expanded_types);
        out.push_str("\n```\n");
    }
    if !expansion.not_expanded_types.is_empty() {
        out.push_str(&format!(
            "\nReferenced but not expanded: {}.\nCall again with `expand_types` naming any of them (or `\"*\"` for everything).\n",
            expansion
                .not_expanded_types
                .iter()
                .map(|n| format!("`{n}`"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    out
}

/// Formats a signature (all overloads) as one `ts` fence.
#[must_use]
pub fn format_signature_block(signature: &MethodSignature) -> String {
    let mut out = String::from("```ts\n");
    out.push_str(&format_overload(
        &signature.method_name,
        &signature.parameters,
        &signature.return_type,
    ));
    for overload in &signature.overloads {
        out.push_str(&format_overload(
            &signature.method_name,
            &overload.parameters,
            &overload.return_type,
        ));
    }
    out.push_str("```\n");
    out
}

fn format_overload(
    name: &str,
    parameters: &[dato_mcp_typegraph::SignatureParameter],
    return_type: &str,
) -> String {
    let params = parameters
        .iter()
        .map(|p| {
            format!(
                "{}{}: {}",
                p.name,
                if p.is_optional { "?" } else { "" },
                p.type_text
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{name}({params}): {return_type};\n")
}

/// Renders an execute-tool payload: selector-filtered, capped, fenced.
#[must_use]
pub fn render_payload(value: &Value, max_bytes: usize) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    let (capped, truncated) = cap_output(&pretty, max_bytes);
    let mut out = format!("```json\n{capped}\n```\n");
    if truncated {
        out.push_str("\nOutput hit the byte cap; use `output_selector` to narrow it.\n");
    }
    out
}

/// Renders a script execution outcome.
#[must_use]
pub fn render_outcome(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Success { stdout, stderr } => {
            let mut out = String::from("Execution succeeded.\n");
            push_stream(&mut out, "stdout", stdout);
            push_stream(&mut out, "stderr", stderr);
            out
        }
        ExecutionOutcome::Timeout { stdout, stderr } => {
            let mut out = String::from("Execution timed out and the process was killed.\n");
            push_stream(&mut out, "stdout (partial)", stdout);
            push_stream(&mut out, "stderr (partial)", stderr);
            out
        }
        ExecutionOutcome::ExitCode {
            code,
            stdout,
            stderr,
        } => {
            let mut out = format!("Execution failed with exit code {code}.\n");
            push_stream(&mut out, "stdout", stdout);
            push_stream(&mut out, "stderr", stderr);
            out
        }
        ExecutionOutcome::Error { message } => {
            format!("Execution could not run: {message}\n")
        }
    }
}

fn push_stream(out: &mut String, label: &str, content: &str) {
    if !content.is_empty() {
        out.push_str(&format!("\n{label}:\n```\n{content}\n```\n"));
    }
}

/// Renders a saved script plus its validation results.
#[must_use]
pub fn render_script_saved(
    script: &Script,
    structural: &ValidationResult,
    tsc: Option<&TscValidation>,
    outcome: Option<&ExecutionOutcome>,
) -> String {
    let mut out = format!("Saved `{}` ({} bytes).\n", script.name, script.content.len());

    if structural.valid {
        out.push_str("\nStructural validation passed.\n");
    } else {
        out.push_str("\nStructural validation failed (the script was saved anyway):\n");
        for issue in &structural.issues {
            let position = match (issue.line, issue.col) {
                (Some(line), Some(col)) => format!(" [{line}:{col}]"),
                _ => String::new(),
            };
            out.push_str(&format!("- {}{position}\n", issue.message));
        }
    }

    match tsc {
        Some(validation) if validation.success => {
            out.push_str("\nTypeScript validation passed.\n");
        }
        Some(validation) => {
            out.push_str(&format!(
                "\nTypeScript validation failed:\n```\n{}\n```\n",
                validation.output
            ));
        }
        None => {}
    }

    if let Some(outcome) = outcome {
        out.push('\n');
        out.push_str(&render_outcome(outcome));
    }
    out
}

/// Renders a script's content for `view_script`.
#[must_use]
pub fn render_script(script: &Script) -> String {
    format!("`{}`:\n\n```ts\n{}\n```\n", script.name, script.content)
}

/// Renders a workspace-level or upstream error as a markdown error body.
#[must_use]
pub fn render_error(error: &Error) -> String {
    let mut out = format!("**Error:** {error}\n");
    if let Error::NotFound {
        hint: Some(hint), ..
    } = error
    {
        out.push_str(&format!("\n{hint}\n"));
    }
    out
}

/// Helper: renders the unknown-endpoint remediation for execute tools.
#[must_use]
pub fn unknown_endpoint_error(resource: &str, action: &str) -> Error {
    Error::not_found(
        format!("action `{action}` on resource `{resource}`"),
        format!("call `resource` with resource `{resource}` to list its actions"),
    )
}

/// Helper: marks the verb/variant mismatch for execute tools.
#[must_use]
pub fn verb_mismatch_error(endpoint: &Endpoint, readonly: bool) -> Error {
    let variant = if readonly { "readonly" } else { "destructive" };
    Error::not_found(
        format!(
            "`{}` is a {} endpoint, not callable via the {variant} execute tool",
            endpoint.rel, endpoint.method
        ),
        if readonly {
            "use `resource_action_destructive_method_execute` for non-GET endpoints".to_string()
        } else {
            "use `resource_action_readonly_method_execute` for GET endpoints".to_string()
        },
    )
}
