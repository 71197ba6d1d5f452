// Evaluator configuration for Mission: Pythonic
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/evaluator.json";

/// Builtins visible to submissions unless the config says otherwise
pub const DEFAULT_BUILTINS: &[&str] = &[
    "__build_class__",
    "abs",
    "all",
    "any",
    "bin",
    "bool",
    "callable",
    "chr",
    "classmethod",
    "dict",
    "divmod",
    "enumerate",
    "filter",
    "float",
    "format",
    "frozenset",
    "hasattr",
    "hash",
    "hex",
    "id",
    "input",
    "int",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "list",
    "map",
    "max",
    "min",
    "next",
    "object",
    "oct",
    "open",
    "ord",
    "pow",
    "print",
    "property",
    "range",
    "repr",
    "reversed",
    "round",
    "set",
    "slice",
    "sorted",
    "staticmethod",
    "str",
    "sum",
    "super",
    "tuple",
    "type",
    "zip",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "BaseException",
    "EOFError",
    "Exception",
    "FileNotFoundError",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "NotImplementedError",
    "OSError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

/// Modules a submission may `import`; `random` is always the sandbox's own seeded instance
pub const DEFAULT_MODULES: &[&str] = &["random", "math", "string"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Local interpreter subprocess
    Process,
    /// Throwaway Docker container per execution
    Docker,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "process" => Ok(Backend::Process),
            "docker" => Ok(Backend::Docker),
            other => bail!("Unknown backend '{}' (expected process or docker)", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    /// Run in `workdir`; required files stay behind after execution
    Shared,
    /// Fresh directory under `workdir` per execution, removed afterwards
    Scratch,
}

impl std::str::FromStr for WorkspaceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(WorkspaceMode::Shared),
            "scratch" => Ok(WorkspaceMode::Scratch),
            other => bail!("Unknown workspace mode '{}' (expected shared or scratch)", other),
        }
    }
}

/// Capabilities granted to submitted code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxPolicy {
    pub allowed_builtins: Vec<String>,
    pub allowed_modules: Vec<String>,
    /// Seed for the sandbox's random module; fresh entropy when unset
    pub seed: Option<u64>,
    pub max_output_bytes: usize,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allowed_builtins: DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect(),
            allowed_modules: DEFAULT_MODULES.iter().map(|s| s.to_string()).collect(),
            seed: None,
            max_output_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    pub image: String,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            memory_limit_mb: 128,
            cpu_limit: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub backend: Backend,
    /// Wall-clock budget per execution
    pub timeout_ms: u64,
    /// Interpreter used by the process backend
    pub python: String,
    pub workdir: PathBuf,
    pub workspace: WorkspaceMode,
    pub max_source_bytes: usize,
    pub policy: SandboxPolicy,
    pub docker: DockerSettings,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Process,
            timeout_ms: 5000,
            python: "python3".to_string(),
            workdir: PathBuf::from("."),
            workspace: WorkspaceMode::Shared,
            max_source_bytes: 1024 * 1024,
            policy: SandboxPolicy::default(),
            docker: DockerSettings::default(),
        }
    }
}

impl EvaluatorConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Evaluator config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EvaluatorConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from config/evaluator.json, falling back to defaults when it is absent
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            tracing::debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
            Ok(Self::default())
        }
    }

    /// Apply PYTHONIC_* environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(backend) = std::env::var("PYTHONIC_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Ok(timeout) = std::env::var("PYTHONIC_TIMEOUT_MS") {
            self.timeout_ms = timeout
                .parse()
                .with_context(|| format!("Invalid PYTHONIC_TIMEOUT_MS: {}", timeout))?;
        }
        if let Ok(python) = std::env::var("PYTHONIC_PYTHON") {
            self.python = python;
        }
        if let Ok(workspace) = std::env::var("PYTHONIC_WORKSPACE") {
            self.workspace = workspace.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.python.trim().is_empty() {
            bail!("python interpreter must not be empty");
        }
        if self.policy.max_output_bytes == 0 {
            bail!("policy.max_output_bytes must be greater than zero");
        }
        if !self.policy.allowed_builtins.iter().any(|b| b == "print") {
            bail!("policy.allowed_builtins must include print");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
