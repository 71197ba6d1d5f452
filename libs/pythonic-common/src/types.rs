use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker variable substituted by `multi_test` rubrics when a level does not name one
pub const DEFAULT_MARKER: &str = "security_level";

/// Where an execution attempt went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The level's required file could not be written
    FileCreation,
    /// The submission raised while running
    Runtime,
    /// The submission exceeded its wall-clock budget and was killed
    Timeout,
    /// The execution backend itself failed
    Sandbox,
}

impl FaultKind {
    /// Fault name used when the interpreter does not supply one
    pub fn default_name(&self) -> &'static str {
        match self {
            FaultKind::FileCreation => "FileCreationError",
            FaultKind::Runtime => "RuntimeError",
            FaultKind::Timeout => "TimeLimitExceeded",
            FaultKind::Sandbox => "SandboxError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: FaultKind,
    pub name: String,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: kind.default_name().to_string(),
            message: message.into(),
        }
    }

    /// A fault raised by the submission, named after its exception class
    pub fn runtime(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Runtime,
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Outcome of running one submission once
///
/// `error` is set iff `succeeded` is false, and a failed result carries no
/// output. Build values through [`ExecutionResult::success`] and
/// [`ExecutionResult::failure`] to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub output: String,
    pub error: Option<ExecutionError>,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn success(output: &str, execution_time_ms: u64) -> Self {
        Self {
            succeeded: true,
            output: output.trim().to_string(),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failure(error: ExecutionError, execution_time_ms: u64) -> Self {
        Self {
            succeeded: false,
            output: String::new(),
            error: Some(error),
            execution_time_ms,
        }
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Error text as shown to the player, empty on success
    pub fn error_message(&self) -> String {
        self.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
    }
}

/// A file materialized in the working directory before the submission runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFile {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub code_modification: Option<String>,
    pub expected_output: String,
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

/// Declarative pass/fail rule attached to a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rubric {
    OutputContains {
        expected: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    OutputLines {
        expected: Vec<String>,
    },
    OutputRange {
        min: i64,
        max: i64,
    },
    OutputExact {
        expected: String,
    },
    MultiTest {
        tests: Vec<TestCase>,
        #[serde(default = "default_marker")]
        marker: String,
    },
    #[serde(other)]
    Unknown,
}

impl Rubric {
    pub fn kind(&self) -> &'static str {
        match self {
            Rubric::OutputContains { .. } => "output_contains",
            Rubric::OutputLines { .. } => "output_lines",
            Rubric::OutputRange { .. } => "output_range",
            Rubric::OutputExact { .. } => "output_exact",
            Rubric::MultiTest { .. } => "multi_test",
            Rubric::Unknown => "unknown",
        }
    }
}

/// Final pass/fail and message handed to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub message: String,
    /// 1-based index of the multi-test case that failed
    pub failed_test: Option<usize>,
    pub fault: Option<FaultKind>,
}

impl Verdict {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            failed_test: None,
            fault: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            failed_test: None,
            fault: None,
        }
    }

    pub fn with_failed_test(mut self, index: usize) -> Self {
        self.failed_test = Some(index);
        self
    }

    pub fn with_fault(mut self, fault: Option<FaultKind>) -> Self {
        self.fault = fault;
        self
    }

    pub fn timed_out(&self) -> bool {
        self.fault == Some(FaultKind::Timeout)
    }

    /// The `(passed, message)` pair exposed to the game layer
    pub fn into_parts(self) -> (bool, String) {
        (self.passed, self.message)
    }
}
