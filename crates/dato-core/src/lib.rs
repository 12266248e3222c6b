//! Core types, errors, and configuration for the DatoCMS MCP server.
//!
//! This crate provides the foundations shared by every other crate in the
//! workspace:
//!
//! - The [`Error`] hierarchy and [`Result`] alias
//! - Runtime [`Config`] read from environment variables
//! - [`Memo`], the single-flight cache for expensive async initializers
//! - [`fuzzy_score`], the schema-lookup scoring function
//! - [`select`], the JSONPath-like output selector
//! - [`truncate`], byte caps with a visible truncation sentinel

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod config;
mod error;
mod memo;

pub mod fuzzy;
pub mod selector;
pub mod truncate;

pub use config::{
    Config, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_MAX_OUTPUT_BYTES, ENV_API_TOKEN, ENV_BASE_URL,
    ENV_ENVIRONMENT, ENV_EXECUTION_TIMEOUT, ENV_MAX_OUTPUT_BYTES,
};
pub use error::{Error, Result};
pub use fuzzy::fuzzy_score;
pub use memo::Memo;
pub use selector::select;
pub use truncate::{cap_output, TRUNCATION_SENTINEL};
