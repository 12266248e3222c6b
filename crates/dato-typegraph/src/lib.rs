//! TypeScript declaration introspector for the DatoCMS client.
//!
//! Answers three questions about the installed client package without ever
//! running the TypeScript compiler:
//!
//! 1. What resources and methods exist on the `Client` class?
//! 2. What is the exact signature of a given method, overloads included?
//! 3. What are all transitively referenced type declarations, bounded by
//!    depth, with namespace-aware disambiguation?
//!
//! The crate parses `.d.ts` files into a module graph (the "type program",
//! built once per process) and resolves every name to a symbol identified by
//! `(source file, declaration name)`. That identity is load-bearing: the
//! simple and raw API namespaces declare types with equal names and
//! different shapes, and collapsing them by name would produce wrong
//! expansions.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod ast;
pub mod dependencies;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod signature;

pub use dependencies::{extract_type_dependencies, ExpandOptions, TypeExpansion, EXPAND_ALL};
pub use program::{resolve_package_types, ModuleId, Resolution, SymbolId, TypeProgram};
pub use signature::{
    extract_method_signature, list_client_resources, list_resource_methods, MethodSignature,
    ReferencedType, SignatureOverload, SignatureParameter,
};
