//! Runtime configuration for the DatoCMS MCP server.
//!
//! All settings come from the environment at startup. The API token gates
//! which tools the server registers: without it, only the documentation and
//! script create/update/view tools are exposed.
//!
//! # Examples
//!
//! ```
//! use dato_mcp_core::Config;
//! use std::time::Duration;
//!
//! let config = Config {
//!     api_token: Some("secret".to_string()),
//!     execution_timeout: Duration::from_secs(30),
//!     ..Default::default()
//! };
//!
//! assert!(config.has_api_token());
//! assert_eq!(config.execution_timeout.as_secs(), 30);
//! ```

use crate::{Error, Result};
use std::time::Duration;

/// Environment variable holding the CMA API token.
pub const ENV_API_TOKEN: &str = "DATOCMS_API_TOKEN";

/// Environment variable selecting the target environment.
pub const ENV_ENVIRONMENT: &str = "DATOCMS_ENVIRONMENT";

/// Environment variable overriding the CMA base URL.
pub const ENV_BASE_URL: &str = "DATOCMS_BASE_URL";

/// Environment variable for the script execution timeout, in seconds.
pub const ENV_EXECUTION_TIMEOUT: &str = "EXECUTION_TIMEOUT_SECONDS";

/// Environment variable for the per-stream output byte cap.
pub const ENV_MAX_OUTPUT_BYTES: &str = "MAX_OUTPUT_BYTES";

/// Default script execution timeout.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default per-stream output byte cap.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 2048;

/// Runtime configuration for the server.
///
/// # Examples
///
/// ```
/// use dato_mcp_core::Config;
///
/// let config = Config::default();
/// assert!(!config.has_api_token());
/// assert_eq!(config.max_output_bytes, 2048);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// CMA API token. When `None`, only documentation and script
    /// create/update/view tools register.
    pub api_token: Option<String>,

    /// Optional target environment (e.g. a sandbox environment name).
    pub environment: Option<String>,

    /// Optional CMA base URL override.
    pub base_url: Option<String>,

    /// Wall-clock limit for one script execution. The child process is
    /// killed when it fires.
    pub execution_timeout: Duration,

    /// Per-stream (stdout, stderr) byte cap for captured output.
    pub max_output_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: None,
            environment: None,
            base_url: None,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// Unset variables fall back to defaults; empty strings count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `EXECUTION_TIMEOUT_SECONDS` or
    /// `MAX_OUTPUT_BYTES` are present but not valid positive integers.
    pub fn from_env() -> Result<Self> {
        let execution_timeout = match read_var(ENV_EXECUTION_TIMEOUT) {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| Error::Config {
                    message: format!("{ENV_EXECUTION_TIMEOUT} must be a positive integer, got {raw:?}"),
                })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_EXECUTION_TIMEOUT,
        };

        let max_output_bytes = match read_var(ENV_MAX_OUTPUT_BYTES) {
            Some(raw) => raw.parse().map_err(|_| Error::Config {
                message: format!("{ENV_MAX_OUTPUT_BYTES} must be a positive integer, got {raw:?}"),
            })?,
            None => DEFAULT_MAX_OUTPUT_BYTES,
        };

        Ok(Self {
            api_token: read_var(ENV_API_TOKEN),
            environment: read_var(ENV_ENVIRONMENT),
            base_url: read_var(ENV_BASE_URL),
            execution_timeout,
            max_output_bytes,
        })
    }

    /// Returns `true` when an API token is configured.
    #[must_use]
    pub fn has_api_token(&self) -> bool {
        self.api_token.is_some()
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
