//! Structural script validation.
//!
//! An AST-level gate on script shape, run before any TypeScript compile:
//!
//! 1. every import specifier must match the package whitelist,
//! 2. the default export must be a function taking exactly one parameter
//!    annotated `Client` (or `ReturnType<typeof buildClient>`) and be
//!    `async` or explicitly return a `Promise`,
//! 3. the `any` and `unknown` type keywords are banned outright.
//!
//! All violations are collected and returned together; an invalid script is
//! still saved so its author can read the errors back.

use dato_mcp_typegraph::lexer::{lex, Token, TokenKind};
use serde::Serialize;

/// Import patterns a script may use. A trailing `/*` matches the scope and
/// anything below it, a trailing `*` matches the prefix, anything else is
/// exact.
pub const ALLOWED_IMPORTS: &[&str] = &["@datocms/*", "datocms-*", "./schema"];

/// One violation, with its position when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Human-readable message.
    pub message: String,
    /// 1-based line, when the issue points at a token.
    pub line: Option<u32>,
    /// 1-based column.
    pub col: Option<u32>,
}

/// Outcome of a validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// `true` when no violation was found.
    pub valid: bool,
    /// All violations, in detection order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    fn push(&mut self, message: String, position: Option<(u32, u32)>) {
        self.valid = false;
        self.issues.push(ValidationIssue {
            message,
            line: position.map(|p| p.0),
            col: position.map(|p| p.1),
        });
    }
}

/// Validates a script's structure.
#[must_use]
pub fn validate_script(source: &str) -> ValidationResult {
    let tokens = lex(source);
    let mut result = ValidationResult::ok();

    check_imports(&tokens, &mut result);
    check_default_export(&tokens, &mut result);
    check_banned_keywords(&tokens, &mut result);

    result
}

/// Returns `true` when `specifier` matches the whitelist.
#[must_use]
pub fn import_allowed(specifier: &str) -> bool {
    ALLOWED_IMPORTS.iter().any(|pattern| {
        if let Some(scope) = pattern.strip_suffix("/*") {
            specifier == scope || specifier.starts_with(&format!("{scope}/"))
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            specifier.starts_with(prefix)
        } else {
            specifier == *pattern
        }
    })
}

fn check_imports(tokens: &[Token], result: &mut ValidationResult) {
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.kind == TokenKind::Ident && t.text == "import" {
            // Static `import … from 'spec'` / `import 'spec'`, or dynamic
            // `import('spec')`.
            let mut j = i + 1;
            if tokens.get(j).is_some_and(|n| n.text == "(") {
                j += 1;
            } else {
                while j < tokens.len()
                    && tokens[j].kind != TokenKind::Str
                    && tokens[j].text != ";"
                    && tokens[j].text != "import"
                {
                    j += 1;
                }
            }
            if let Some(spec_token) = tokens.get(j).filter(|n| n.kind == TokenKind::Str) {
                if !import_allowed(&spec_token.text) {
                    result.push(
                        format!(
                            "Invalid import: \"{}\". Allowed packages: {}",
                            spec_token.text,
                            ALLOWED_IMPORTS.join(", ")
                        ),
                        Some((spec_token.line, spec_token.col)),
                    );
                }
                i = j;
            }
        }
        i += 1;
    }
}

fn check_banned_keywords(tokens: &[Token], result: &mut ValidationResult) {
    for t in tokens {
        if t.kind == TokenKind::Ident && (t.text == "any" || t.text == "unknown") {
            result.push(
                format!("Forbidden type keyword `{}`", t.text),
                Some((t.line, t.col)),
            );
        }
    }
}

// ----------------------------------------------------------------------
// Default export
// ----------------------------------------------------------------------

fn check_default_export(tokens: &[Token], result: &mut ValidationResult) {
    let Some(export_idx) = find_default_export(tokens) else {
        result.push("Missing default export".to_string(), None);
        return;
    };

    // Position right after `export default`.
    let head = export_idx + 2;

    // `export default someName;`: follow the identifier to its local
    // definition; a direct function works the same way.
    let head = if tokens.get(head).is_some_and(|t| {
        t.kind == TokenKind::Ident
            && t.text != "async"
            && t.text != "function"
            && tokens.get(export_idx + 3).is_some_and(|n| n.text == ";")
    }) {
        let name = &tokens[head].text;
        match find_local_function(tokens, name) {
            Some(idx) => idx,
            None => {
                result.push(
                    format!("Default export `{name}` does not resolve to a local function"),
                    Some((tokens[head].line, tokens[head].col)),
                );
                return;
            }
        }
    } else {
        head
    };

    let Some(shape) = parse_function_head(tokens, head) else {
        result.push(
            "Default export must be a function".to_string(),
            tokens.get(head).map(|t| (t.line, t.col)),
        );
        return;
    };

    if shape.params.len() != 1 {
        result.push(
            format!(
                "Default export must take exactly one parameter (the client), found {}",
                shape.params.len()
            ),
            tokens.get(head).map(|t| (t.line, t.col)),
        );
    } else {
        let annotation = &shape.params[0];
        if !is_client_annotation(annotation) {
            result.push(
                "Default export parameter must be annotated as `Client` or `ReturnType<typeof buildClient>`"
                    .to_string(),
                tokens.get(head).map(|t| (t.line, t.col)),
            );
        }
    }

    if !shape.is_async && !shape.returns_promise {
        result.push(
            "Default export must be `async` or declare a `Promise<…>` return type".to_string(),
            tokens.get(head).map(|t| (t.line, t.col)),
        );
    }
}

fn find_default_export(tokens: &[Token]) -> Option<usize> {
    (0..tokens.len().saturating_sub(1)).find(|&i| {
        tokens[i].kind == TokenKind::Ident
            && tokens[i].text == "export"
            && tokens[i + 1].text == "default"
    })
}

/// Finds the head of a local function bound to `name`:
/// `function name(…)`, or `const name = <function>`.
fn find_local_function(tokens: &[Token], name: &str) -> Option<usize> {
    for i in 0..tokens.len() {
        let t = &tokens[i];
        if t.kind != TokenKind::Ident {
            continue;
        }
        if t.text == "function" && tokens.get(i + 1).is_some_and(|n| n.text == name) {
            // Include a leading `async` in the head.
            if i > 0 && tokens[i - 1].text == "async" {
                return Some(i - 1);
            }
            return Some(i);
        }
        if matches!(t.text.as_str(), "const" | "let" | "var")
            && tokens.get(i + 1).is_some_and(|n| n.text == name)
            && tokens.get(i + 2).is_some_and(|n| n.text == "=")
        {
            return Some(i + 3);
        }
    }
    None
}

#[derive(Debug)]
struct FunctionShape {
    is_async: bool,
    /// Type-annotation token texts for each parameter (empty when a
    /// parameter has no annotation).
    params: Vec<Vec<String>>,
    returns_promise: bool,
}

/// Parses a function head starting at `idx`: `[async] function [name] (…)`,
/// `[async] (…) =>`, or a bare single-identifier arrow. Returns `None` when
/// the tokens do not form a function.
fn parse_function_head(tokens: &[Token], idx: usize) -> Option<FunctionShape> {
    let mut i = idx;
    let mut is_async = false;

    if tokens.get(i).is_some_and(|t| t.text == "async") {
        is_async = true;
        i += 1;
    }
    if tokens.get(i).is_some_and(|t| t.text == "function") {
        i += 1;
        // Optional name.
        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::Ident) {
            i += 1;
        }
    } else if tokens
        .get(i)
        .is_some_and(|t| t.kind == TokenKind::Ident && tokens.get(i + 1).is_some_and(|n| n.text == "=>"))
    {
        // `c => …`: one unannotated parameter.
        return Some(FunctionShape {
            is_async,
            params: vec![Vec::new()],
            returns_promise: false,
        });
    }

    if !tokens.get(i).is_some_and(|t| t.text == "(") {
        return None;
    }
    let close = matching_paren(tokens, i)?;

    // Arrow functions need `=>` after the parameter list (possibly behind a
    // return annotation); plain functions need `{` or `:`.
    let mut after = close + 1;
    let mut returns_promise = false;
    if tokens.get(after).is_some_and(|t| t.text == ":") {
        returns_promise = tokens
            .get(after + 1)
            .is_some_and(|t| t.text == "Promise");
        // Skip the return annotation to find `=>` or `{`.
        after += 1;
        let mut depth = 0usize;
        while let Some(t) = tokens.get(after) {
            match t.text.as_str() {
                "<" => depth += 1,
                ">" => depth = depth.saturating_sub(1),
                "=>" | "{" if depth == 0 => break,
                ";" if depth == 0 => break,
                _ => {}
            }
            after += 1;
        }
    }
    let is_arrow = tokens.get(after).is_some_and(|t| t.text == "=>");
    let is_block = tokens.get(after).is_some_and(|t| t.text == "{");
    if !is_arrow && !is_block {
        return None;
    }

    Some(FunctionShape {
        is_async,
        params: split_params(&tokens[i + 1..close]),
        returns_promise,
    })
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, t) in tokens[open..].iter().enumerate() {
        match t.text.as_str() {
            "(" => depth += 1,
            ")" => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a parameter token slice on top-level commas and extracts each
/// parameter's annotation token texts.
fn split_params(tokens: &[Token]) -> Vec<Vec<String>> {
    let mut params = Vec::new();
    let mut current: Vec<&Token> = Vec::new();
    let mut depth = 0i32;

    for t in tokens {
        match t.text.as_str() {
            "(" | "[" | "{" | "<" => depth += 1,
            ")" | "]" | "}" | ">" => depth -= 1,
            "," if depth == 0 => {
                params.push(annotation_of(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(t);
    }
    if !current.is_empty() {
        params.push(annotation_of(&current));
    }
    params
}

/// Extracts the annotation tokens after the first top-level `:` (and before
/// any top-level `=` default).
fn annotation_of(tokens: &[&Token]) -> Vec<String> {
    let mut depth = 0i32;
    let mut colon = None;
    for (i, t) in tokens.iter().enumerate() {
        match t.text.as_str() {
            "(" | "[" | "{" | "<" => depth += 1,
            ")" | "]" | "}" | ">" => depth -= 1,
            ":" if depth == 0 && colon.is_none() => colon = Some(i),
            "=" if depth == 0 => {
                return tokens[colon.map_or(i, |c| c + 1)..i]
                    .iter()
                    .map(|t| t.text.clone())
                    .collect();
            }
            _ => {}
        }
    }
    colon.map_or_else(Vec::new, |c| {
        tokens[c + 1..].iter().map(|t| t.text.clone()).collect()
    })
}

fn is_client_annotation(annotation: &[String]) -> bool {
    let texts: Vec<&str> = annotation.iter().map(String::as_str).collect();
    texts == ["Client"]
        || texts == ["ReturnType", "<", "typeof", "buildClient", ">"]
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
import { buildClient, Client } from "@datocms/cma-client-node";
import type { Article } from "./schema";

export default async (client: Client) => {
    const items = await client.items.list();
    console.log(items.length);
};
"#;

    fn messages(source: &str) -> Vec<String> {
        validate_script(source)
            .issues
            .into_iter()
            .map(|i| i.message)
            .collect()
    }

    #[test]
    fn test_valid_script_passes() {
        let result = validate_script(VALID);
        assert!(result.valid, "issues: {:?}", result.issues);
    }

    #[test]
    fn test_disallowed_import_is_reported() {
        let source = r#"
import axios from "axios";
export default async (client: Client) => {};
"#;
        let result = validate_script(source);
        assert!(!result.valid);
        assert!(result.issues[0].message.contains("Invalid import: \"axios\""));
        assert!(result.issues[0].message.contains("@datocms/*"));
        assert_eq!(result.issues[0].line, Some(2));
    }

    #[test]
    fn test_import_whitelist_patterns() {
        assert!(import_allowed("@datocms/cma-client-node"));
        assert!(import_allowed("@datocms/cma-client/dist/utils"));
        assert!(import_allowed("datocms-structured-text-utils"));
        assert!(import_allowed("./schema"));
        assert!(!import_allowed("./other"));
        assert!(!import_allowed("axios"));
        assert!(!import_allowed("@datocmsish/evil"));
    }

    #[test]
    fn test_dynamic_import_is_checked() {
        let source = r#"
export default async (client: Client) => {
    const lodash = await import("lodash");
};
"#;
        assert!(messages(source).iter().any(|m| m.contains("Invalid import: \"lodash\"")));
    }

    #[test]
    fn test_missing_default_export() {
        let source = "const x = 1;";
        assert!(messages(source).iter().any(|m| m.contains("Missing default export")));
    }

    #[test]
    fn test_default_export_must_take_one_param() {
        let source = "export default async (a: Client, b: Client) => {};";
        assert!(messages(source)
            .iter()
            .any(|m| m.contains("exactly one parameter")));
    }

    #[test]
    fn test_param_annotation_enforced() {
        let source = "export default async (client) => {};";
        assert!(messages(source)
            .iter()
            .any(|m| m.contains("must be annotated as `Client`")));
    }

    #[test]
    fn test_return_type_client_variant_accepted() {
        let source =
            "export default async (client: ReturnType<typeof buildClient>) => {};";
        let result = validate_script(source);
        assert!(result.valid, "issues: {:?}", result.issues);
    }

    #[test]
    fn test_sync_function_without_promise_rejected() {
        let source = "export default (client: Client) => {};";
        assert!(messages(source)
            .iter()
            .any(|m| m.contains("`async` or declare a `Promise<…>`")));
    }

    #[test]
    fn test_sync_function_with_promise_return_accepted() {
        let source =
            "export default function run(client: Client): Promise<void> { return Promise.resolve(); }";
        let result = validate_script(source);
        assert!(result.valid, "issues: {:?}", result.issues);
    }

    #[test]
    fn test_named_identifier_export_resolves() {
        let source = r#"
const run = async (client: Client) => {
    await client.items.list();
};
export default run;
"#;
        let result = validate_script(source);
        assert!(result.valid, "issues: {:?}", result.issues);
    }

    #[test]
    fn test_named_function_declaration_export_resolves() {
        let source = r#"
async function run(client: Client) {}
export default run;
"#;
        let result = validate_script(source);
        assert!(result.valid, "issues: {:?}", result.issues);
    }

    #[test]
    fn test_unresolvable_identifier_export() {
        let source = "export default mystery;";
        assert!(messages(source)
            .iter()
            .any(|m| m.contains("does not resolve to a local function")));
    }

    #[test]
    fn test_any_and_unknown_are_banned_with_positions() {
        let source = "export default async (client: Client) => {\n    const x: any = 1;\n    const y = x as unknown;\n};";
        let result = validate_script(source);
        assert!(!result.valid);
        let any_issue = result
            .issues
            .iter()
            .find(|i| i.message.contains("`any`"))
            .unwrap();
        assert_eq!(any_issue.line, Some(2));
        assert!(result.issues.iter().any(|i| i.message.contains("`unknown`")));
    }

    #[test]
    fn test_all_violations_collected() {
        let source = r#"
import axios from "axios";
const x: any = 1;
"#;
        let result = validate_script(source);
        // Import + missing default export + `any`.
        assert!(result.issues.len() >= 3);
    }
}
