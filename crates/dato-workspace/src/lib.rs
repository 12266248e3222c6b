//! Durable script workspace: type-checking and sandboxed execution.
//!
//! The workspace is a once-initialized directory in the OS user-data
//! location where user scripts are statically checked against the real
//! client's declarations (`tsc --noEmit`) and executed out-of-process
//! (`tsx runner.ts <script>`) under a wall-clock timeout and per-stream
//! output byte caps. A freshly generated `schema.ts` gives every script
//! typed access to the project's own models.
//!
//! None of this is a security boundary against a hostile local user; it is
//! a resource fence around LLM-authored code.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod lock;
pub mod outcome;
pub mod schema_gen;
pub mod workspace;

pub use outcome::{ExecutionOutcome, TscValidation};
pub use schema_gen::{
    generate_schema_ts, to_pascal_case, FieldSchema, ItemTypeSchema, SiteSchema,
};
pub use workspace::{
    ClientEnv, Workspace, APP_DIR_NAME, CLIENT_PACKAGE, DEFAULT_CLIENT_VERSION,
};
