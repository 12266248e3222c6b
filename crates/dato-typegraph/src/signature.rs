//! Method signature extraction.
//!
//! Given `(resource, method)`, locates the resource property on the `Client`
//! class (walking base classes), finds the method on the resource class, and
//! projects every overload: parameter names, optionality, printed types, the
//! return type, and the JSDoc. Named types referenced by the signature are
//! resolved to their defining symbols so that same-named types from
//! different files stay apart.
//!
//! The `Read more:` URL in the method's JSDoc is the only robust binding
//! between a client method and a hyperschema link; name- or rel-based
//! matching breaks on `list`/`rawList` pairs and paged-iterator helpers.

use crate::ast::{ClassMethod, Decl, DeclKind, TsType, TypeRef};
use crate::parser::collect_refs;
use crate::program::{ModuleId, Resolution, SymbolId, TypeProgram};
use std::collections::{HashMap, HashSet};

/// A named type referenced by a signature, with its resolved identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedType {
    /// The reference as written in the signature (`ApiTypes.Item`).
    pub name: String,
    /// The defining symbol.
    pub symbol: SymbolId,
}

/// One projected parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameter {
    /// Parameter name.
    pub name: String,
    /// Printed parameter type.
    pub type_text: String,
    /// Marked optional with `?` (or carrying an initializer).
    pub is_optional: bool,
    /// `@param` documentation, when present.
    pub doc: Option<String>,
}

/// One method overload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOverload {
    /// Projected parameters.
    pub parameters: Vec<SignatureParameter>,
    /// Printed return type.
    pub return_type: String,
}

/// A fully projected method signature.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    /// Method name as found on the resource class.
    pub method_name: String,
    /// Parameters of the primary (first) overload.
    pub parameters: Vec<SignatureParameter>,
    /// Return type of the primary overload.
    pub return_type: String,
    /// Method JSDoc, cleaned.
    pub doc: Option<String>,
    /// First URL after `Read more:` in the JSDoc; binds the method to a
    /// hyperschema link via the link's `docUrl`.
    pub action_url: Option<String>,
    /// Additional overloads beyond the primary one.
    pub overloads: Vec<SignatureOverload>,
    /// Named type symbols referenced anywhere in the signature, in order of
    /// first appearance.
    pub referenced_type_symbols: Vec<ReferencedType>,
}

/// Extracts the signature of `method` on `resource`, or `None` when either
/// does not exist on the client.
#[must_use]
pub fn extract_method_signature(
    program: &TypeProgram,
    resource: &str,
    method: &str,
) -> Option<MethodSignature> {
    let resource_class = locate_resource_class(program, resource)?;
    let overloads = collect_method_overloads(program, &resource_class, method);
    if overloads.is_empty() {
        return None;
    }

    let mut projected = Vec::new();
    let mut referenced = Vec::new();
    let mut seen_refs = HashSet::new();
    let mut doc = None;

    for (decl_module, overload) in &overloads {
        let param_docs = overload
            .doc
            .as_deref()
            .map(parse_param_docs)
            .unwrap_or_default();

        let parameters: Vec<SignatureParameter> = overload
            .signature
            .params
            .iter()
            .map(|param| SignatureParameter {
                name: param.name.clone(),
                type_text: param
                    .ty
                    .as_ref()
                    .map_or_else(|| "any".to_string(), ToString::to_string),
                is_optional: param.optional,
                doc: param_docs.get(param.name.as_str()).cloned(),
            })
            .collect();

        let return_type = overload
            .signature
            .return_type
            .as_ref()
            .map_or_else(|| "void".to_string(), ToString::to_string);

        if doc.is_none() {
            doc.clone_from(&overload.doc);
        }

        collect_signature_refs(
            program,
            *decl_module,
            overload,
            &mut referenced,
            &mut seen_refs,
        );

        projected.push(SignatureOverload {
            parameters,
            return_type,
        });
    }

    let primary = projected.remove(0);
    let action_url = doc.as_deref().and_then(parse_action_url);

    Some(MethodSignature {
        method_name: method.to_string(),
        parameters: primary.parameters,
        return_type: primary.return_type,
        doc,
        action_url,
        overloads: projected,
        referenced_type_symbols: referenced,
    })
}

/// Lists the resource property names exposed by the `Client` class,
/// including inherited ones, in declaration order.
#[must_use]
pub fn list_client_resources(program: &TypeProgram) -> Vec<String> {
    let mut names = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![program.client_class().clone()];

    while let Some(symbol) = stack.pop() {
        if !visited.insert(symbol.clone()) {
            continue;
        }
        for decl in program.decls_of(&symbol) {
            let Some(class) = &decl.class else { continue };
            for property in &class.properties {
                // A resource property is one whose type resolves to a class
                // declaration; plain config objects don't qualify.
                let Some(TsType::Named { parts, .. }) = &property.ty else {
                    continue;
                };
                let resolved = program.resolve_ref(symbol.module, &TypeRef::new(parts.clone()));
                if let Some(Resolution::Symbol(target)) = resolved {
                    if program
                        .decls_of(&target)
                        .iter()
                        .any(|d| d.kind == DeclKind::Class)
                    {
                        names.push(property.name.clone());
                    }
                }
            }
            for heritage in &class.extends {
                if let Some(Resolution::Symbol(base)) = program.resolve_ref(symbol.module, heritage)
                {
                    stack.push(base);
                }
            }
        }
    }
    names
}

/// Lists the method names of a resource class, base classes included,
/// deduplicated in declaration order. Returns `None` for an unknown
/// resource.
#[must_use]
pub fn list_resource_methods(program: &TypeProgram, resource: &str) -> Option<Vec<String>> {
    let class = locate_resource_class(program, resource)?;
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for_each_class_in_chain(program, &class, &mut |_, decl| {
        if let Some(details) = &decl.class {
            for method in &details.methods {
                if seen.insert(method.name.clone()) {
                    names.push(method.name.clone());
                }
            }
        }
    });
    Some(names)
}

/// Resolves the resource class symbol behind a property on `Client`.
fn locate_resource_class(program: &TypeProgram, resource: &str) -> Option<SymbolId> {
    let mut found: Option<(ModuleId, TypeRef)> = None;
    for_each_class_in_chain(program, program.client_class(), &mut |module, decl| {
        if found.is_some() {
            return;
        }
        if let Some(class) = &decl.class {
            if let Some(property) = class.properties.iter().find(|p| p.name == resource) {
                if let Some(TsType::Named { parts, .. }) = &property.ty {
                    found = Some((module, TypeRef::new(parts.clone())));
                }
            }
        }
    });

    let (module, reference) = found?;
    match program.resolve_ref(module, &reference)? {
        Resolution::Symbol(symbol) => Some(symbol),
        Resolution::Module(_) => None,
    }
}

/// Walks a class and its base-class chain, visiting every declaration.
fn for_each_class_in_chain(
    program: &TypeProgram,
    start: &SymbolId,
    visit: &mut impl FnMut(ModuleId, &Decl),
) {
    let mut visited = HashSet::new();
    let mut queue = vec![start.clone()];
    while let Some(symbol) = queue.pop() {
        if !visited.insert(symbol.clone()) {
            continue;
        }
        for decl in program.decls_of(&symbol) {
            visit(symbol.module, decl);
            if let Some(class) = &decl.class {
                for heritage in &class.extends {
                    if let Some(Resolution::Symbol(base)) =
                        program.resolve_ref(symbol.module, heritage)
                    {
                        queue.push(base);
                    }
                }
            }
        }
    }
}

/// Collects all overloads of `method` across the class chain, paired with
/// the module each declaration lives in.
fn collect_method_overloads(
    program: &TypeProgram,
    class: &SymbolId,
    method: &str,
) -> Vec<(ModuleId, ClassMethod)> {
    let mut overloads = Vec::new();
    for_each_class_in_chain(program, class, &mut |module, decl| {
        if let Some(details) = &decl.class {
            for candidate in &details.methods {
                if candidate.name == method {
                    overloads.push((module, candidate.clone()));
                }
            }
        }
    });
    overloads
}

fn collect_signature_refs(
    program: &TypeProgram,
    module: ModuleId,
    overload: &ClassMethod,
    out: &mut Vec<ReferencedType>,
    seen: &mut HashSet<String>,
) {
    let mut refs = Vec::new();
    for param in &overload.signature.params {
        if let Some(ty) = &param.ty {
            collect_refs(ty, &mut refs);
        }
    }
    if let Some(ret) = &overload.signature.return_type {
        collect_refs(ret, &mut refs);
    }

    for reference in refs {
        let written = reference.written();
        if seen.contains(&written) {
            continue;
        }
        // Primitives never reach here (the parser drops them); anything
        // that fails to resolve lives in the TS lib or an unrelated
        // dependency and is skipped.
        if let Some(Resolution::Symbol(symbol)) = program.resolve_ref(module, &reference) {
            seen.insert(written.clone());
            out.push(ReferencedType {
                name: written,
                symbol,
            });
        }
    }
}

/// Extracts a map of `@param name description` entries from a JSDoc block.
fn parse_param_docs(doc: &str) -> HashMap<String, String> {
    let mut docs = HashMap::new();
    for line in doc.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("@param") else {
            continue;
        };
        let rest = rest.trim_start();
        let Some((name, description)) = rest.split_once(char::is_whitespace) else {
            continue;
        };
        let description = description.trim_start().trim_start_matches("- ").trim();
        if !description.is_empty() {
            docs.insert(name.to_string(), description.to_string());
        }
    }
    docs
}

/// Extracts the first URL following `Read more:` from a docstring.
fn parse_action_url(doc: &str) -> Option<String> {
    let index = doc.find("Read more:")?;
    let rest = doc[index + "Read more:".len()..].trim_start();
    let url_start = rest.find("http")?;
    let rest = &rest[url_start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ')')
        .unwrap_or(rest.len());
    Some(rest[..end].trim_end_matches(['.', ',']).to_string())
}
