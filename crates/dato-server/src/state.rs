//! Shared server state: configuration, memoized loaders, script store,
//! workspace, and the optional CMA client.
//!
//! The hyperschema, the resource manifest, and the type program are all
//! expensive pure initializations; each sits behind a single-flight memo
//! so concurrent tool calls share one load and a failed load retries on
//! the next call.

use dato_mcp_client::{ClientConfig, HttpCmaClient, SharedClient};
use dato_mcp_core::{Config, Error, Memo, Result};
use dato_mcp_hyperschema::{
    locate_resources_json, Hyperschema, ResourceSchema, HYPERSCHEMA_URL,
};
use dato_mcp_scripts::ScriptStore;
use dato_mcp_typegraph::{resolve_package_types, TypeProgram};
use dato_mcp_workspace::{ClientEnv, Workspace, CLIENT_PACKAGE};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Base client package whose declarations the Node flavor re-exports.
const BASE_CLIENT_PACKAGE: &str = "@datocms/cma-client";

/// Process-wide server state, shared across tool calls.
#[derive(Debug)]
pub struct AppState {
    /// Runtime configuration.
    pub config: Config,
    /// In-memory script store.
    pub scripts: ScriptStore,
    /// On-disk workspace.
    pub workspace: Workspace,

    hyperschema: Memo<Hyperschema>,
    resources: Memo<Arc<ResourceSchema>>,
    program: Memo<Arc<TypeProgram>>,
    client: OnceCell<SharedClient>,

    hyperschema_url: String,
    hyperschema_document: Option<Value>,
    node_modules_override: Option<PathBuf>,
    client_override: Option<SharedClient>,
}

impl AppState {
    /// Builds state from configuration, with the workspace at its default
    /// OS location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the platform has no user-data
    /// directory.
    pub fn new(config: Config) -> Result<Self> {
        let workspace = Workspace::new(
            Workspace::default_root()?,
            config.execution_timeout,
            config.max_output_bytes,
        );
        Ok(Self::with_workspace(config, workspace))
    }

    /// Builds state around an explicit workspace.
    #[must_use]
    pub fn with_workspace(config: Config, workspace: Workspace) -> Self {
        Self {
            config,
            scripts: ScriptStore::new(),
            workspace,
            hyperschema: Memo::new(),
            resources: Memo::new(),
            program: Memo::new(),
            client: OnceCell::new(),
            hyperschema_url: HYPERSCHEMA_URL.to_string(),
            hyperschema_document: None,
            node_modules_override: None,
            client_override: None,
        }
    }

    /// Serves the hyperschema from an already-loaded document instead of
    /// fetching it (offline operation and tests).
    #[must_use]
    pub fn with_hyperschema_document(mut self, document: Value) -> Self {
        self.hyperschema_document = Some(document);
        self
    }

    /// Overrides the hyperschema URL.
    #[must_use]
    pub fn with_hyperschema_url(mut self, url: String) -> Self {
        self.hyperschema_url = url;
        self
    }

    /// Reads the client package from an explicit `node_modules` directory
    /// instead of the workspace's own installation.
    #[must_use]
    pub fn with_node_modules(mut self, node_modules: PathBuf) -> Self {
        self.node_modules_override = Some(node_modules);
        self
    }

    /// Injects a pre-built client implementation.
    #[must_use]
    pub fn with_client(mut self, client: SharedClient) -> Self {
        self.client_override = Some(client);
        self
    }

    /// The dereferenced hyperschema, loaded once.
    ///
    /// # Errors
    ///
    /// Propagates fetch failures; a failed fetch is retried on the next
    /// call.
    pub async fn hyperschema(&self) -> Result<&Hyperschema> {
        self.hyperschema
            .get_or_try_init(|| async {
                match &self.hyperschema_document {
                    Some(document) => Ok(Hyperschema::from_value(document.clone())),
                    None => Hyperschema::fetch(&self.hyperschema_url).await,
                }
            })
            .await
    }

    /// The parsed resource manifest, loaded once from the installed client
    /// package.
    ///
    /// # Errors
    ///
    /// Propagates workspace initialization and parse failures.
    pub async fn resources(&self) -> Result<Arc<ResourceSchema>> {
        self.resources
            .get_or_try_init(|| async {
                let node_modules = self.node_modules().await?;
                let path = locate_resources_json(&node_modules)?;
                let schema = tokio::task::spawn_blocking(move || ResourceSchema::load(&path))
                    .await
                    .map_err(|e| Error::Workspace {
                        message: format!("resource manifest load task failed: {e}"),
                    })??;
                Ok(Arc::new(schema))
            })
            .await
            .cloned()
    }

    /// The type program, built once over the installed client's
    /// declarations.
    ///
    /// # Errors
    ///
    /// Propagates workspace initialization and parse failures; fails
    /// loudly when the declarations expose no `Client` class.
    pub async fn program(&self) -> Result<Arc<TypeProgram>> {
        self.program
            .get_or_try_init(|| async {
                let node_modules = self.node_modules().await?;
                let program = tokio::task::spawn_blocking(move || {
                    let entry = resolve_package_types(&node_modules, CLIENT_PACKAGE)?;
                    let mut packages = HashMap::new();
                    packages.insert(CLIENT_PACKAGE.to_string(), entry.clone());
                    if let Ok(base) = resolve_package_types(&node_modules, BASE_CLIENT_PACKAGE) {
                        packages.insert(BASE_CLIENT_PACKAGE.to_string(), base);
                    }
                    TypeProgram::build(&entry, &packages)
                })
                .await
                .map_err(|e| Error::Workspace {
                    message: format!("type program build task failed: {e}"),
                })??;
                Ok(Arc::new(program))
            })
            .await
            .cloned()
    }

    /// The CMA client, when an API token is configured.
    ///
    /// # Errors
    ///
    /// Propagates manifest loading failures for the HTTP implementation.
    pub async fn client(&self) -> Result<SharedClient> {
        if let Some(client) = &self.client_override {
            return Ok(Arc::clone(client));
        }
        let api_token = self.config.api_token.clone().ok_or_else(|| Error::Config {
            message: "DATOCMS_API_TOKEN is not set".to_string(),
        })?;

        self.client
            .get_or_try_init(|| async {
                let schema = self.resources().await?;
                let client: SharedClient = Arc::new(HttpCmaClient::new(
                    ClientConfig {
                        api_token,
                        environment: self.config.environment.clone(),
                        base_url: self.config.base_url.clone(),
                    },
                    schema,
                    self.config.execution_timeout,
                ));
                Ok::<_, Error>(client)
            })
            .await
            .cloned()
    }

    /// The client environment handed to the script runner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without an API token.
    pub async fn client_env(&self) -> Result<ClientEnv> {
        let client = self.client().await?;
        let config = client.config();
        Ok(ClientEnv {
            api_token: config.api_token.clone(),
            environment: config.environment.clone(),
            base_url: config.base_url.clone(),
        })
    }

    async fn node_modules(&self) -> Result<PathBuf> {
        if let Some(path) = &self.node_modules_override {
            return Ok(path.clone());
        }
        self.workspace.ensure().await?;
        Ok(self.workspace.root().join("node_modules"))
    }
}
