//! DatoCMS MCP server: a layered discover → plan → execute toolset over
//! the Content Management API.
//!
//! Instead of exposing ~150 REST endpoints as individual tools, the server
//! offers six layers: resource discovery backed by the REST hyperschema
//! and the client's endpoint manifest, exact method signatures from a
//! `.d.ts` introspector, direct one-shot execution with output selection,
//! project schema lookup, and a TypeScript script workspace where the LLM
//! authors typed, batched programs that run out of process under a
//! timeout and output caps.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod render;
pub mod schema_info;
pub mod service;
pub mod state;
pub mod types;

pub use service::DatoCmsService;
pub use state::AppState;
