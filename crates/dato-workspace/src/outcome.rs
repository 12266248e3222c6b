//! Execution and validation outcome types.

use serde::Serialize;

/// Outcome of one out-of-process script execution.
///
/// `stdout`/`stderr` are capped per stream; a capped buffer carries the
/// literal `…[truncated]` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The script ran to completion with exit code 0.
    Success {
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The wall-clock timeout fired and the child was killed; output is
    /// whatever was captured before the kill.
    Timeout {
        /// Partial standard output.
        stdout: String,
        /// Partial standard error.
        stderr: String,
    },
    /// The script exited with a non-zero code (or died on a signal, mapped
    /// to -1).
    ExitCode {
        /// Exit code.
        code: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The execution machinery itself failed (spawn error, I/O error).
    Error {
        /// What went wrong.
        message: String,
    },
}

impl ExecutionOutcome {
    /// Returns `true` for [`ExecutionOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcome of a `tsc --noEmit` validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TscValidation {
    /// `true` iff the compiler exited 0.
    pub success: bool,
    /// Combined compiler stdout and stderr.
    pub output: String,
}
