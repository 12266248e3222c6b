//! DatoCMS REST hyperschema and resource manifest loaders.
//!
//! Three concerns live here:
//!
//! - [`hyperschema`]: fetching the published hyperschema and dereferencing
//!   every `$ref`, with entity/link lookup.
//! - [`resources`]: the client's shipped `resources.json` endpoint
//!   manifest, flattened so each endpoint carries its entity identity.
//! - [`details`]: collapsing/expanding `<details>` blocks and
//!   `::example[id]` tokens in documentation prose.
//!
//! Both loaders are expensive and pure; callers memoize them per process
//! with [`dato_mcp_core::Memo`].

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod details;
pub mod hyperschema;
pub mod resources;

pub use details::{render_description, render_example};
pub use hyperschema::{DocExample, Entity, Hyperschema, Link, HYPERSCHEMA_URL};
pub use resources::{
    locate_resources_json, Endpoint, EndpointWithEntity, EntityIdentity, ResourceEntity,
    ResourceSchema,
};
