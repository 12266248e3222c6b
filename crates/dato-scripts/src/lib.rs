//! Script store and structural validator.
//!
//! Scripts are the unit of work the LLM authors against the client: named
//! `script://…` URIs held in memory, validated structurally on every write
//! (package whitelist, default-export contract, `any`/`unknown` ban), and
//! saved even when invalid so the author can see its own errors.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod store;
pub mod validator;

pub use store::{Replacement, Script, ScriptStore, ScriptStoreError, SCRIPT_SCHEME};
pub use validator::{
    import_allowed, validate_script, ValidationIssue, ValidationResult, ALLOWED_IMPORTS,
};
