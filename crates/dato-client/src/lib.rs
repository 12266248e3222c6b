//! Opaque CMA client interface.
//!
//! The rest of the workspace treats the DatoCMS client as an object
//! exposing `resource.method(args…)` plus a `{api_token, environment,
//! base_url}` config; this crate pins that seam down as the [`CmaClient`]
//! trait and ships a thin HTTP implementation driven by the endpoint
//! manifest. Errors surface as [`ApiError`] (request/response pairs with
//! `find_error`) or [`TimeoutError`], both serializable for markdown
//! rendering.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

use async_trait::async_trait;
use dato_mcp_hyperschema::{Endpoint, ResourceSchema};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default CMA base URL.
pub const DEFAULT_BASE_URL: &str = "https://site-api.datocms.com";

/// Client configuration, mirroring the JS client's `config` object.
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    /// CMA API token.
    pub api_token: String,
    /// Optional target environment.
    pub environment: Option<String>,
    /// Base URL; defaults to [`DEFAULT_BASE_URL`].
    pub base_url: Option<String>,
}

impl ClientConfig {
    /// The effective base URL.
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

/// A serialized API failure: the request/response pair plus the JSON:API
/// error objects found in the body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Human-readable summary.
    pub message: String,
    /// The request that failed.
    pub request: RequestSnapshot,
    /// The response, when one was received.
    pub response: Option<ResponseSnapshot>,
    /// JSON:API error objects from the response body.
    pub errors: Vec<Value>,
}

/// Request half of an [`ApiError`].
#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    /// HTTP verb.
    pub method: String,
    /// Full URL.
    pub url: String,
    /// Serialized body, when one was sent.
    pub body: Option<Value>,
}

/// Response half of an [`ApiError`].
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSnapshot {
    /// HTTP status code.
    pub status: u16,
    /// Decoded body, when decodable.
    pub body: Option<Value>,
}

impl ApiError {
    /// Finds the first JSON:API error object whose `attributes.code`
    /// matches.
    #[must_use]
    pub fn find_error(&self, code: &str) -> Option<&Value> {
        self.errors.iter().find(|error| {
            error
                .pointer("/attributes/code")
                .and_then(Value::as_str)
                .is_some_and(|c| c == code)
        })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} failed: {}",
            self.request.method, self.request.url, self.message
        )
    }
}

/// An API call that exceeded its deadline.
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutError {
    /// The request that timed out.
    pub request: RequestSnapshot,
    /// The configured deadline.
    pub timeout_secs: u64,
}

/// Failure surface of a [`CmaClient`] call.
#[derive(Debug, Error)]
pub enum CmaError {
    /// The API answered with a failure status.
    #[error("{0}")]
    Api(Box<ApiError>),

    /// The call exceeded its deadline.
    #[error("request to {} timed out after {}s", .0.request.url, .0.timeout_secs)]
    Timeout(Box<TimeoutError>),

    /// The `(resource, method)` pair does not exist in the manifest.
    #[error("unknown client method {resource}.{method}")]
    UnknownMethod {
        /// Resource namespace.
        resource: String,
        /// Method name.
        method: String,
    },

    /// Arguments did not match the endpoint shape.
    #[error("invalid arguments for {resource}.{method}: {message}")]
    InvalidArguments {
        /// Resource namespace.
        resource: String,
        /// Method name.
        method: String,
        /// What was wrong.
        message: String,
    },

    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

/// The opaque client seam: configuration plus dynamic method dispatch.
#[async_trait]
pub trait CmaClient: Send + Sync + fmt::Debug {
    /// The client's configuration.
    fn config(&self) -> &ClientConfig;

    /// Invokes `resource.method(args…)` and returns the decoded JSON
    /// payload.
    async fn call(&self, resource: &str, method: &str, args: &[Value])
        -> Result<Value, CmaError>;
}

/// Shared handle to a client implementation.
pub type SharedClient = Arc<dyn CmaClient>;

/// Manifest-driven HTTP implementation of [`CmaClient`].
#[derive(Debug)]
pub struct HttpCmaClient {
    config: ClientConfig,
    schema: Arc<ResourceSchema>,
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpCmaClient {
    /// Builds a client over the given manifest.
    #[must_use]
    pub fn new(config: ClientConfig, schema: Arc<ResourceSchema>, timeout: Duration) -> Self {
        Self {
            config,
            schema,
            http: reqwest::Client::new(),
            timeout,
        }
    }
}

/// The pure request-shape resolution behind [`HttpCmaClient::call`]:
/// positional args fill URL placeholders first, then the body (for verbs
/// that carry one), then optional query parameters.
fn resolve_request(
    endpoint: &Endpoint,
    resource: &str,
    method: &str,
    args: &[Value],
) -> Result<RequestParts, CmaError> {
    let mut remaining = args.iter();
    let mut path = endpoint.url_template.clone();

    for placeholder in &endpoint.url_placeholders {
        let value = remaining.next().ok_or_else(|| CmaError::InvalidArguments {
            resource: resource.to_string(),
            method: method.to_string(),
            message: format!("missing URL placeholder argument `{}`", placeholder.variable_name),
        })?;
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                // Simple-method convenience: an entity object stands in for
                // its own id.
                other
                    .pointer("/id")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
                    .ok_or_else(|| CmaError::InvalidArguments {
                        resource: resource.to_string(),
                        method: method.to_string(),
                        message: format!(
                            "placeholder `{}` must be a string, number, or entity with an id",
                            placeholder.variable_name
                        ),
                    })?
            }
        };
        path = path.replace(&format!(":{}", placeholder.variable_name), &text);
    }

    let verb = endpoint.method.to_uppercase();
    let has_body = matches!(verb.as_str(), "POST" | "PUT" | "PATCH");
    let body = if has_body { remaining.next().cloned() } else { None };

    let query = remaining
        .next()
        .and_then(Value::as_object)
        .map(|map| flatten_query("", map))
        .unwrap_or_default();

    Ok(RequestParts {
        verb,
        path,
        body,
        query,
    })
}

#[derive(Debug, PartialEq)]
struct RequestParts {
    verb: String,
    path: String,
    body: Option<Value>,
    query: Vec<(String, String)>,
}

/// Flattens nested query objects to `outer[inner]=value` pairs, the
/// JSON:API convention.
fn flatten_query(prefix: &str, map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}[{key}]")
        };
        match value {
            Value::Object(nested) => pairs.extend(flatten_query(&name, nested)),
            Value::Null => {}
            Value::String(s) => pairs.push((name, s.clone())),
            other => pairs.push((name, other.to_string())),
        }
    }
    pairs
}

#[async_trait]
impl CmaClient for HttpCmaClient {
    fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn call(
        &self,
        resource: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CmaError> {
        let entity = self.schema.find_by_namespace(resource).ok_or_else(|| {
            CmaError::UnknownMethod {
                resource: resource.to_string(),
                method: method.to_string(),
            }
        })?;
        let endpoint = entity
            .endpoints
            .iter()
            .find(|e| e.name.as_deref() == Some(method) || e.raw_name == method)
            .ok_or_else(|| CmaError::UnknownMethod {
                resource: resource.to_string(),
                method: method.to_string(),
            })?;

        let parts = resolve_request(endpoint, resource, method, args)?;
        let url = format!("{}{}", self.config.effective_base_url(), parts.path);
        let snapshot = RequestSnapshot {
            method: parts.verb.clone(),
            url: url.clone(),
            body: parts.body.clone(),
        };

        let verb = reqwest::Method::from_bytes(parts.verb.as_bytes())
            .map_err(|_| CmaError::Transport {
                message: format!("invalid HTTP verb {}", parts.verb),
            })?;

        let mut request = self
            .http
            .request(verb, &url)
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .query(&parts.query);
        if let Some(environment) = &self.config.environment {
            request = request.header("X-Environment", environment);
        }
        if let Some(body) = &parts.body {
            request = request
                .header("Content-Type", "application/vnd.api+json")
                .json(body);
        }

        tracing::debug!(%url, verb = %parts.verb, "CMA request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CmaError::Timeout(Box::new(TimeoutError {
                    request: snapshot.clone(),
                    timeout_secs: self.timeout.as_secs(),
                }))
            } else {
                CmaError::Transport {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body: Option<Value> = response.json().await.ok();

        if status.is_success() {
            Ok(body.unwrap_or(Value::Null))
        } else {
            let errors = body
                .as_ref()
                .and_then(|b| b.get("data"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            Err(CmaError::Api(Box::new(ApiError {
                message: format!("HTTP {status}"),
                request: snapshot,
                response: Some(ResponseSnapshot {
                    status: status.as_u16(),
                    body,
                }),
                errors,
            })))
        }
    }
}
