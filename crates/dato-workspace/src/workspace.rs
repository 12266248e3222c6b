//! The durable on-disk workspace.
//!
//! A once-initialized directory in the OS user-data location holding
//! `package.json`, `tsconfig.json`, `runner.ts`, and `node_modules`, plus a
//! `scripts/` directory for per-operation temp files. Initialization runs
//! under a cross-process lock; within the process, validation and execution
//! are serialized through one async mutex so two operations never race on
//! `schema.ts`.

use crate::lock;
use crate::outcome::{ExecutionOutcome, TscValidation};
use dato_mcp_core::truncate::CappedBuffer;
use dato_mcp_core::{Error, Memo, Result};
use handlebars::Handlebars;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Directory name under the OS user-data dir.
pub const APP_DIR_NAME: &str = "datocms-mcp";

/// The client package installed into the workspace.
pub const CLIENT_PACKAGE: &str = "@datocms/cma-client-node";

/// Version requirement used when no installed copy is detectable.
pub const DEFAULT_CLIENT_VERSION: &str = "^4.0.0";

/// Environment handed to the runner child process.
#[derive(Debug, Clone)]
pub struct ClientEnv {
    /// CMA API token.
    pub api_token: String,
    /// Optional target environment.
    pub environment: Option<String>,
    /// Optional base URL override.
    pub base_url: Option<String>,
}

/// The workspace handle. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    execution_timeout: Duration,
    max_output_bytes: usize,
    run_install: bool,
    ensured: Memo<()>,
    op_lock: Mutex<()>,
}

/// RAII cleanup for a per-operation temp script file.
struct TempFileGuard {
    path: PathBuf,
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), %error, "failed to remove temp script");
            }
        }
    }
}

impl Workspace {
    /// Creates a handle over `root` with the given execution limits.
    #[must_use]
    pub fn new(root: PathBuf, execution_timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            root,
            execution_timeout,
            max_output_bytes,
            run_install: true,
            ensured: Memo::new(),
            op_lock: Mutex::new(()),
        }
    }

    /// The OS-standard workspace location: `<user-data-dir>/datocms-mcp`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the platform exposes no user-data
    /// directory.
    pub fn default_root() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| Error::Config {
                message: "no user data directory on this platform".to_string(),
            })
    }

    /// The workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Materializes the workspace if needed. Idempotent and single-flight:
    /// in-process callers share one initialization via the memo, and a
    /// cross-process directory lock covers concurrent server instances.
    /// After this returns, `package.json`, `tsconfig.json`, `runner.ts`,
    /// and `node_modules` all exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] when `npm install` fails and
    /// [`Error::Io`]/[`Error::Timeout`] on filesystem or lock problems.
    pub async fn ensure(&self) -> Result<()> {
        self.ensured
            .get_or_try_init(|| self.initialize())
            .await
            .copied()
    }

    async fn initialize(&self) -> Result<()> {
        if self.is_complete().await {
            return Ok(());
        }

        let _guard = lock::acquire(&self.root).await?;

        // Another process may have finished while we waited on the lock.
        if self.is_complete().await {
            return Ok(());
        }

        tracing::info!(root = %self.root.display(), "initializing workspace");
        tokio::fs::create_dir_all(self.scripts_dir())
            .await
            .map_err(|e| Error::io("creating workspace directories", e))?;

        let client_version = detect_client_version(&self.root)
            .unwrap_or_else(|| DEFAULT_CLIENT_VERSION.to_string());
        let files = render_workspace_files(&client_version)?;
        for (name, content) in files {
            tokio::fs::write(self.root.join(name), content)
                .await
                .map_err(|e| Error::io(format!("writing {name}"), e))?;
        }

        if self.run_install {
            self.npm_install().await?;
        } else {
            tokio::fs::create_dir_all(self.root.join("node_modules"))
                .await
                .map_err(|e| Error::io("creating node_modules", e))?;
        }

        tracing::info!(root = %self.root.display(), "workspace ready");
        Ok(())
    }

    async fn npm_install(&self) -> Result<()> {
        let output = Command::new("npm")
            .args(["install", "--no-audit", "--no-fund"])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::io("spawning npm install", e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Workspace {
                message: format!(
                    "npm install failed with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            })
        }
    }

    async fn is_complete(&self) -> bool {
        for required in ["package.json", "tsconfig.json", "runner.ts", "node_modules"] {
            if !self.root.join(required).exists() {
                return false;
            }
        }
        true
    }

    fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    /// Type-checks a script with `tsc --noEmit`; pass ⇔ exit 0.
    ///
    /// # Errors
    ///
    /// Returns an error when the workspace cannot be initialized or the
    /// compiler cannot be spawned; compile failures are a non-`success`
    /// [`TscValidation`], not an error.
    pub async fn validate_script(
        &self,
        basename: &str,
        content: &str,
        schema_ts: &str,
    ) -> Result<TscValidation> {
        let _op = self.op_lock.lock().await;
        self.ensure().await?;

        let script_path = self.write_operation_files(basename, content, schema_ts).await?;
        let _cleanup = TempFileGuard {
            path: script_path.clone(),
        };

        let tsc = self.root.join("node_modules/.bin/tsc");
        let output = Command::new(&tsc)
            .arg("--noEmit")
            .arg(&script_path)
            .args(["--pretty", "false"])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::io(format!("spawning {}", tsc.display()), e))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(TscValidation {
            success: output.status.success(),
            output: combined.trim().to_string(),
        })
    }

    /// Runs a script through the workspace runner under the configured
    /// timeout and per-stream output caps.
    ///
    /// Spawn failures map to [`ExecutionOutcome::Error`]; only workspace
    /// initialization problems surface as `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error when the workspace cannot be initialized or the
    /// temp files cannot be written.
    pub async fn execute_script(
        &self,
        basename: &str,
        content: &str,
        schema_ts: &str,
        env: &ClientEnv,
    ) -> Result<ExecutionOutcome> {
        let _op = self.op_lock.lock().await;
        self.ensure().await?;

        let script_path = self.write_operation_files(basename, content, schema_ts).await?;
        let _cleanup = TempFileGuard {
            path: script_path.clone(),
        };

        let tsx = self.root.join("node_modules/.bin/tsx");
        let mut command = Command::new(&tsx);
        command
            .arg(self.root.join("runner.ts"))
            .arg(&script_path)
            .current_dir(&self.root)
            .env("DATOCMS_API_TOKEN", &env.api_token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(environment) = &env.environment {
            command.env("DATOCMS_ENVIRONMENT", environment);
        }
        if let Some(base_url) = &env.base_url {
            command.env("DATOCMS_BASE_URL", base_url);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                return Ok(ExecutionOutcome::Error {
                    message: format!("failed to spawn runner: {error}"),
                })
            }
        };

        let stdout_task = child.stdout.take().map(|stream| {
            tokio::spawn(drain_capped(stream, self.max_output_bytes))
        });
        let stderr_task = child.stderr.take().map(|stream| {
            tokio::spawn(drain_capped(stream, self.max_output_bytes))
        });

        let timed_out = match tokio::time::timeout(self.execution_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let (stdout, stderr) = join_streams(stdout_task, stderr_task).await;
                return Ok(match status.code() {
                    Some(0) => ExecutionOutcome::Success { stdout, stderr },
                    Some(code) => ExecutionOutcome::ExitCode {
                        code,
                        stdout,
                        stderr,
                    },
                    // Killed by a signal.
                    None => ExecutionOutcome::ExitCode {
                        code: -1,
                        stdout,
                        stderr,
                    },
                });
            }
            Ok(Err(error)) => {
                return Ok(ExecutionOutcome::Error {
                    message: format!("waiting for runner: {error}"),
                })
            }
            Err(_) => true,
        };
        debug_assert!(timed_out);

        tracing::warn!(
            script = basename,
            timeout_secs = self.execution_timeout.as_secs(),
            "script execution timed out, killing"
        );
        if let Err(error) = child.start_kill() {
            tracing::warn!(%error, "failed to kill timed-out runner");
        }
        let _ = child.wait().await;
        // Orphaned grandchildren may keep the pipes open after the kill;
        // bound the drain so a straggler cannot wedge the tool call.
        let (stdout, stderr) = tokio::time::timeout(
            Duration::from_secs(2),
            join_streams(stdout_task, stderr_task),
        )
        .await
        .unwrap_or_default();
        Ok(ExecutionOutcome::Timeout { stdout, stderr })
    }

    /// Writes the temp script (mode 0600) and regenerates `schema.ts`.
    async fn write_operation_files(
        &self,
        basename: &str,
        content: &str,
        schema_ts: &str,
    ) -> Result<PathBuf> {
        if basename.contains('/') || basename.contains('\\') || basename.contains("..") {
            return Err(Error::Workspace {
                message: format!("script basename {basename:?} must be a plain filename"),
            });
        }

        let scripts_dir = self.scripts_dir();
        tokio::fs::create_dir_all(&scripts_dir)
            .await
            .map_err(|e| Error::io("creating scripts directory", e))?;

        let script_path = scripts_dir.join(basename);
        write_private(&script_path, content).await?;
        write_private(&scripts_dir.join("schema.ts"), schema_ts).await?;
        Ok(script_path)
    }
}

async fn write_private(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| Error::io(format!("writing {}", path.display()), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::io(format!("chmod {}", path.display()), e))?;
    }
    Ok(())
}

async fn drain_capped(mut stream: impl AsyncReadExt + Unpin, budget: usize) -> CappedBuffer {
    let mut buffer = CappedBuffer::new(budget);
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.push(&chunk[..n]),
        }
    }
    buffer
}

type StreamTask = Option<tokio::task::JoinHandle<CappedBuffer>>;

async fn join_streams(stdout: StreamTask, stderr: StreamTask) -> (String, String) {
    let collect = |task: StreamTask| async {
        match task {
            Some(handle) => match handle.await {
                Ok(buffer) => buffer.into_string(),
                Err(_) => String::new(),
            },
            None => String::new(),
        }
    };
    (collect(stdout).await, collect(stderr).await)
}

/// Reads the installed client's version from the workspace's own
/// `node_modules`, when a previous initialization left one behind.
fn detect_client_version(root: &Path) -> Option<String> {
    let manifest = root
        .join("node_modules")
        .join(CLIENT_PACKAGE)
        .join("package.json");
    let raw = std::fs::read_to_string(manifest).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&raw).ok()?;
    parsed
        .get("version")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}

/// Renders the three static workspace files.
fn render_workspace_files(client_version: &str) -> Result<Vec<(&'static str, String)>> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    let templates = [
        ("package.json", include_str!("../templates/package.json.hbs")),
        ("tsconfig.json", include_str!("../templates/tsconfig.json.hbs")),
        ("runner.ts", include_str!("../templates/runner.ts.hbs")),
    ];
    for (name, source) in &templates {
        handlebars
            .register_template_string(name, *source)
            .map_err(|e| Error::Template {
                message: format!("registering {name} template: {e}"),
            })?;
    }

    let context = json!({ "client_version": client_version });
    templates
        .iter()
        .map(|(name, _)| {
            handlebars
                .render(name, &context)
                .map(|rendered| (*name, rendered))
                .map_err(|e| Error::Template {
                    message: format!("rendering {name}: {e}"),
                })
        })
        .collect()
}
