//! Error types for the DatoCMS MCP server.
//!
//! This module provides the workspace-wide error hierarchy with contextual
//! information. Tool-facing code converts these into markdown error results;
//! nothing here ever crosses the MCP transport as a panic.
//!
//! # Examples
//!
//! ```
//! use dato_mcp_core::{Error, Result};
//!
//! fn find_resource(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(Error::NotFound {
//!             resource: "resource ''".to_string(),
//!             hint: Some("call the `resources` tool to list them".to_string()),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! let err = find_resource("").unwrap_err();
//! assert!(err.is_not_found());
//! ```

use thiserror::Error;

/// Main error type for the DatoCMS MCP server.
///
/// All crates in the workspace use this type at their public boundaries,
/// providing a consistent taxonomy for the tool layer to render.
#[derive(Error, Debug)]
pub enum Error {
    /// A named resource, action, method, or script does not exist.
    ///
    /// Always carries a remediation hint pointing at the discovery tool
    /// that lists valid names.
    #[error("Not found: {resource}")]
    NotFound {
        /// Identifier of the missing thing
        resource: String,
        /// Remediation hint for the caller
        hint: Option<String>,
    },

    /// Configuration error.
    ///
    /// Raised when environment variables are malformed or a required
    /// setting is missing.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// The type program is in an impossible state.
    ///
    /// Raised for internal invariant violations, e.g. the client package's
    /// declarations do not contain a `Client` class. Terminates the
    /// in-flight tool call only.
    #[error("Type program error: {message}")]
    TypeProgram {
        /// Description of the invariant violation
        message: String,
    },

    /// A TypeScript declaration file could not be parsed.
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Path of the offending file
        path: String,
        /// Parser diagnostic
        message: String,
    },

    /// An upstream HTTP request failed.
    ///
    /// Covers both the hyperschema fetch and CMA API calls.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Description of the failure
        message: String,
        /// Underlying error cause
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Filesystem operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// What was being done
        message: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
        /// Underlying serde error
        #[source]
        source: Option<serde_json::Error>,
    },

    /// An operation exceeded its configured timeout.
    #[error("Operation timed out after {duration_secs}s: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// Duration in seconds before the timeout fired
        duration_secs: u64,
    },

    /// The on-disk workspace could not be initialized or used.
    #[error("Workspace error: {message}")]
    Workspace {
        /// Description of the workspace failure
        message: String,
    },

    /// Template rendering failed.
    #[error("Template error: {message}")]
    Template {
        /// Description of the rendering failure
        message: String,
    },

    /// An output selector expression was malformed or matched nothing.
    #[error("Selector error: {message}")]
    Selector {
        /// Description of the selector failure
        message: String,
    },

    /// A script store operation failed (bad name, duplicate, failed
    /// replacement).
    #[error("Script error: {message}")]
    Script {
        /// Description of the failure
        message: String,
    },
}

impl Error {
    /// Builds a [`Error::NotFound`] with a remediation hint.
    #[must_use]
    pub fn not_found(resource: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            hint: Some(hint.into()),
        }
    }

    /// Builds an [`Error::Io`] wrapping the given operation description.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is an upstream HTTP error.
    #[must_use]
    pub const fn is_http_error(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    /// Returns `true` if this is a type-program invariant violation.
    #[must_use]
    pub const fn is_type_program_error(&self) -> bool {
        matches!(self, Self::TypeProgram { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialization {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = Error::not_found("resource 'item'", "call `resources` first");
        assert!(err.is_not_found());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            resource: "method 'frobnicate'".to_string(),
            hint: None,
        };
        let display = format!("{err}");
        assert!(display.contains("Not found"));
        assert!(display.contains("frobnicate"));
    }

    #[test]
    fn test_timeout_detection() {
        let err = Error::Timeout {
            operation: "execute_script".to_string(),
            duration_secs: 60,
        };
        assert!(err.is_timeout());
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_config_error_display() {
        let err = Error::Config {
            message: "EXECUTION_TIMEOUT_SECONDS is not a number".to_string(),
        };
        assert!(format!("{err}").contains("Configuration error"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = serde_err.into();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_type_program_detection() {
        let err = Error::TypeProgram {
            message: "no `Client` class in declarations".to_string(),
        };
        assert!(err.is_type_program_error());
        assert!(!err.is_http_error());
    }
}
