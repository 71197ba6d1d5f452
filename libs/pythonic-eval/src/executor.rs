/// Submission Executor - The Fault Containment Boundary
///
/// **Responsibility:**
/// Turn (code, required file) into an ExecutionResult, whatever happens.
///
/// **Architecture:**
/// 1. Prepare the workspace (shared directory or per-run scratch directory)
/// 2. Materialize the level's required file, aborting on failure
/// 3. Hand the source to a SandboxEngine (engine.rs)
/// 4. Classify the raw outcome: success, runtime fault, timeout, sandbox fault
///
/// Nothing that goes wrong inside the submission or the backend escapes this
/// module as an error; it always comes back as data.

use crate::engine::{RawExecution, SandboxEngine, SandboxRequest};
use crate::sandbox;
use pythonic_common::config::{EvaluatorConfig, WorkspaceMode};
use pythonic_common::types::{ExecutionError, ExecutionResult, FaultKind, RequiredFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Per-run scratch directory, removed on drop
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(root: &Path) -> std::io::Result<Self> {
        let path = root.join(format!("pythonic-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch workspace");
        }
    }
}

pub struct Executor {
    engine: Arc<dyn SandboxEngine>,
    workdir: PathBuf,
    workspace: WorkspaceMode,
    timeout: Duration,
    max_source_bytes: usize,
}

impl Executor {
    pub fn new(engine: Arc<dyn SandboxEngine>, config: &EvaluatorConfig) -> Self {
        Self {
            engine,
            workdir: config.workdir.clone(),
            workspace: config.workspace,
            timeout: config.timeout(),
            max_source_bytes: config.max_source_bytes,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `code` once, materializing `required_file` first when given
    #[instrument(skip_all, fields(engine = self.engine.name(), source_size = code.len()))]
    pub async fn execute(&self, code: &str, required_file: Option<&RequiredFile>) -> ExecutionResult {
        if code.len() > self.max_source_bytes {
            return ExecutionResult::failure(
                ExecutionError::new(
                    FaultKind::Sandbox,
                    format!("source exceeds maximum size of {} bytes", self.max_source_bytes),
                ),
                0,
            );
        }

        let scratch = match self.workspace {
            WorkspaceMode::Shared => None,
            WorkspaceMode::Scratch => match ScratchDir::create(&self.workdir) {
                Ok(dir) => Some(dir),
                Err(e) => {
                    return ExecutionResult::failure(
                        ExecutionError::new(
                            FaultKind::Sandbox,
                            format!("could not create workspace: {}", e),
                        ),
                        0,
                    );
                }
            },
        };
        let workdir = scratch.as_ref().map(|s| s.path.as_path()).unwrap_or(self.workdir.as_path());

        if let Some(file) = required_file {
            let path = workdir.join(&file.filename);
            if let Err(e) = tokio::fs::write(&path, &file.content).await {
                warn!(filename = %file.filename, error = %e, "Failed to create required file");
                return ExecutionResult::failure(
                    ExecutionError::new(
                        FaultKind::FileCreation,
                        format!("Error creating file '{}': {}", file.filename, e),
                    ),
                    0,
                );
            }
            debug!(filename = %file.filename, "Required file created");
        }

        let request = SandboxRequest {
            source: code,
            workdir,
            timeout: self.timeout,
        };

        let result = match self.engine.run(&request).await {
            Ok(raw) => classify(&raw, self.timeout),
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(error = %message, "Sandbox execution failed");
                ExecutionResult::failure(ExecutionError::new(FaultKind::Sandbox, message), 0)
            }
        };

        debug!(
            succeeded = result.succeeded,
            fault = ?result.fault_kind(),
            execution_ms = result.execution_time_ms,
            "Execution completed"
        );

        result
    }
}

/// Interpret a raw run
///
/// Priority: timeout, then the runner envelope, then a sandbox fault built
/// from the exit code and stderr when no envelope came back.
pub fn classify(raw: &RawExecution, timeout: Duration) -> ExecutionResult {
    if raw.timed_out {
        return ExecutionResult::failure(
            ExecutionError::new(
                FaultKind::Timeout,
                format!("your code ran longer than {} ms and was stopped", timeout.as_millis()),
            ),
            raw.execution_time_ms,
        );
    }

    match sandbox::parse_envelope(&raw.stdout) {
        Ok(envelope) => match envelope.error {
            None if envelope.ok => ExecutionResult::success(&envelope.output, raw.execution_time_ms),
            Some(error) => ExecutionResult::failure(
                ExecutionError::runtime(error.name, error.message),
                raw.execution_time_ms,
            ),
            None => ExecutionResult::failure(
                ExecutionError::new(FaultKind::Sandbox, "runner reported failure without an error"),
                raw.execution_time_ms,
            ),
        },
        Err(_) => {
            let detail = raw
                .stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no diagnostic output");
            let message = match raw.exit_code {
                Some(code) => format!("interpreter exited with code {}: {}", code, detail.trim()),
                None => format!("interpreter terminated abnormally: {}", detail.trim()),
            };
            ExecutionResult::failure(
                ExecutionError::new(FaultKind::Sandbox, message),
                raw.execution_time_ms,
            )
        }
    }
}
