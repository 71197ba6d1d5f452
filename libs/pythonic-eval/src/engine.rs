/// Execution Engine - Abstraction for Sandboxed Code Execution
///
/// **Core Responsibility:**
/// Run the sandbox runner against a submission and capture its raw output.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local process, Docker container)
/// - Engine does NOT know rubrics or verdicts
/// - Engine does NOT interpret the runner envelope
/// - Engine enforces the wall-clock timeout and kills the worker on expiry
///
/// **Why This Exists:**
/// Enables swappable isolation backends without touching evaluation logic.
/// The desktop game uses ProcessEngine; DockerEngine adds memory/CPU/network
/// limits where a Docker daemon is available.

use crate::sandbox;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use pythonic_common::config::{Backend, DockerSettings, EvaluatorConfig, SandboxPolicy};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Raw outcome of one sandboxed run, before the envelope is interpreted
#[derive(Debug, Clone, Default)]
pub struct RawExecution {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub execution_time_ms: u64,
    pub timed_out: bool,
}

/// One request to a sandbox backend
#[derive(Debug, Clone)]
pub struct SandboxRequest<'a> {
    pub source: &'a str,
    /// Directory the submission runs in; holds any required file
    pub workdir: &'a Path,
    pub timeout: Duration,
}

#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Run the runner on `request.source`
    ///
    /// Returns `Err` only when the backend itself fails. A submission that
    /// raises, or runs past its timeout, is still an `Ok` raw execution.
    async fn run(&self, request: &SandboxRequest<'_>) -> Result<RawExecution>;
}

/// Build the engine selected by the config
pub fn build_engine(config: &EvaluatorConfig) -> Result<Arc<dyn SandboxEngine>> {
    match config.backend {
        Backend::Process => Ok(Arc::new(ProcessEngine::new(
            config.python.clone(),
            config.policy.clone(),
        ))),
        Backend::Docker => Ok(Arc::new(DockerEngine::new(
            config.docker.clone(),
            config.policy.clone(),
        )?)),
    }
}

/// Keep the first `limit` bytes and drain the rest so the writer never sees a closed pipe
async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Runs the interpreter as a local child process
///
/// **Isolation:**
/// - Cleared environment (only PATH and the runner variables)
/// - stdin closed, stdout/stderr piped and size-capped
/// - Interpreter in isolated mode (`-I -B -S`)
/// - Child killed on timeout and on drop
pub struct ProcessEngine {
    python: String,
    policy: SandboxPolicy,
}

impl ProcessEngine {
    pub fn new(python: impl Into<String>, policy: SandboxPolicy) -> Self {
        Self {
            python: python.into(),
            policy,
        }
    }
}

#[async_trait]
impl SandboxEngine for ProcessEngine {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(&self, request: &SandboxRequest<'_>) -> Result<RawExecution> {
        let mut command = Command::new(&self.python);
        command
            .args(sandbox::interpreter_args())
            .current_dir(request.workdir)
            .env_clear()
            .envs(sandbox::runner_env(request.source, &self.policy))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let start_time = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn interpreter '{}'", self.python))?;

        let stdout = child.stdout.take().context("Child stdout was not captured")?;
        let stderr = child.stderr.take().context("Child stderr was not captured")?;
        let stdout_task = tokio::spawn(read_capped(stdout, sandbox::stdout_capacity(&self.policy)));
        let stderr_task = tokio::spawn(read_capped(stderr, self.policy.max_output_bytes));

        let (exit_code, timed_out) = match tokio::time::timeout(request.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for interpreter")?;
                (status.code().map(i64::from), false)
            }
            Err(_) => {
                warn!(
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Execution timed out - killing interpreter"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out interpreter");
                }
                (None, true)
            }
        };

        let stdout = stdout_task.await.context("stdout reader panicked")??;
        let stderr = stderr_task.await.context("stderr reader panicked")??;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        debug!(
            exit_code = ?exit_code,
            timed_out,
            execution_time_ms,
            "Interpreter finished"
        );

        Ok(RawExecution {
            stdout: if timed_out { String::new() } else { stdout },
            stderr,
            exit_code,
            execution_time_ms,
            timed_out,
        })
    }
}

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution panics or is cancelled
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Cannot await in Drop; removal is handed to the runtime
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
            }
        });
    }
}

/// Docker-based engine: one throwaway container per execution
///
/// **Container Rules:**
/// 1. Pulls the configured Python image if not present
/// 2. Network disabled, memory and CPU limits enforced
/// 3. Workspace bind-mounted at /workspace (required files live there)
/// 4. Runner invoked exactly as the process backend invokes it
/// 5. Container killed on timeout, removed on drop
pub struct DockerEngine {
    docker: Docker,
    settings: DockerSettings,
    policy: SandboxPolicy,
}

impl DockerEngine {
    pub fn new(settings: DockerSettings, policy: SandboxPolicy) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        Ok(Self {
            docker,
            settings,
            policy,
        })
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    fn bind_for(workdir: &Path) -> Result<String> {
        let host: PathBuf = workdir
            .canonicalize()
            .with_context(|| format!("Workspace {} does not exist", workdir.display()))?;
        Ok(format!("{}:/workspace", host.display()))
    }
}

#[async_trait]
impl SandboxEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(&self, request: &SandboxRequest<'_>) -> Result<RawExecution> {
        let image = self.settings.image.clone();
        let container_name = format!("pythonic-{}", uuid::Uuid::new_v4());

        self.ensure_image(&image)
            .await
            .with_context(|| format!("Failed to ensure Docker image '{}' is available", image))?;

        let mut cmd = vec!["python3".to_string()];
        cmd.extend(sandbox::interpreter_args());
        let env: Vec<String> = sandbox::runner_env(request.source, &self.policy)
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let config = Config {
            image: Some(image.clone()),
            cmd: Some(cmd),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            working_dir: Some("/workspace".to_string()),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(self.settings.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((self.settings.cpu_limit * 1_000_000_000.0) as i64),
                binds: Some(vec![Self::bind_for(request.workdir)?]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;
        let container_id = container.id.clone();
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        let start_time = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        let capacity = sandbox::stdout_capacity(&self.policy);
        let execution_future = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let mut exit_code: Option<i64> = None;

            let logs_options = Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: true,
                ..Default::default()
            });
            let mut logs_stream = self.docker.logs(&container_id, logs_options);
            while let Some(output) = logs_stream.next().await {
                match output {
                    Ok(LogOutput::StdOut { message }) => {
                        if stdout.len() < capacity {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        if stderr.len() < self.policy.max_output_bytes {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Error reading container logs");
                        break;
                    }
                    _ => {}
                }
            }

            let wait_options = WaitContainerOptions {
                condition: "not-running",
            };
            let mut wait_stream = self.docker.wait_container(&container_id, Some(wait_options));
            match wait_stream.next().await {
                Some(Ok(response)) => exit_code = Some(response.status_code),
                // Non-zero exits arrive as an error carrying the code
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                    exit_code = Some(code)
                }
                Some(Err(e)) => warn!(error = %e, "Failed to get container exit code"),
                None => {}
            }

            (stdout, stderr, exit_code)
        };

        let (stdout, stderr, exit_code, timed_out) =
            match tokio::time::timeout(request.timeout, execution_future).await {
                Ok((out, mut err, code)) => {
                    match code {
                        Some(137) => err.push_str("\n[Container killed: likely exceeded memory limit]"),
                        Some(139) => err.push_str("\n[Container killed: segmentation fault]"),
                        _ => {}
                    }
                    (out, err, code, false)
                }
                Err(_) => {
                    warn!(
                        container_id = %container_id,
                        timeout_ms = request.timeout.as_millis() as u64,
                        "Execution timed out - killing container"
                    );
                    if let Err(e) = self
                        .docker
                        .kill_container(&container_id, None::<KillContainerOptions<String>>)
                        .await
                    {
                        warn!(error = %e, "Failed to kill timed-out container");
                    }
                    (String::new(), String::new(), None, true)
                }
            };

        if stdout.is_empty() && !timed_out && exit_code.is_none() {
            bail!("Container {} produced no output and no exit code", container_id);
        }

        Ok(RawExecution {
            stdout,
            stderr,
            exit_code,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
            timed_out,
        })
    }
}
