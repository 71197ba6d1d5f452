/// Evaluation Orchestrator - Submission + Rubric → Verdict
///
/// **Responsibility:**
/// Coordinate the executor and the checker registry to produce one verdict.
///
/// **Flow:**
/// - multi_test: derive one variant per test case by marker substitution,
///   execute each in order, stop at the first failure
/// - everything else: execute once, judge with checker.rs
///
/// Holds no state between calls.

use crate::checker;
use crate::engine::{build_engine, SandboxEngine};
use crate::executor::Executor;
use anyhow::{Context, Result};
use pythonic_common::config::EvaluatorConfig;
use pythonic_common::level::Level;
use pythonic_common::types::{ExecutionResult, RequiredFile, Rubric, TestCase, Verdict};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Replace every line that mentions `marker` and contains `=` with `replacement`
///
/// Purely textual: `security_level == 3` or a comment naming the marker also
/// match. Lines are split and re-joined on `\n` only.
pub fn apply_code_modification(code: &str, marker: &str, replacement: &str) -> String {
    code.split('\n')
        .map(|line| {
            if line.contains(marker) && line.contains('=') {
                replacement
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn variant_for(code: &str, marker: &str, test: &TestCase) -> String {
    match &test.code_modification {
        Some(replacement) => apply_code_modification(code, marker, replacement),
        None => code.to_string(),
    }
}

pub struct Evaluator {
    executor: Executor,
}

impl Evaluator {
    /// Build an evaluator with the backend named in `config`
    pub fn new(config: &EvaluatorConfig) -> Result<Self> {
        let engine = build_engine(config).context("Failed to initialize sandbox engine")?;
        info!(
            engine = engine.name(),
            timeout_ms = config.timeout_ms,
            workspace = ?config.workspace,
            "Evaluator ready"
        );
        Ok(Self::with_engine(engine, config))
    }

    pub fn with_engine(engine: Arc<dyn SandboxEngine>, config: &EvaluatorConfig) -> Self {
        Self {
            executor: Executor::new(engine, config),
        }
    }

    /// Raw execution without judging, for diagnostics
    pub async fn execute(&self, code: &str, required_file: Option<&RequiredFile>) -> ExecutionResult {
        self.executor.execute(code, required_file).await
    }

    pub async fn evaluate_level(&self, code: &str, level: &Level) -> Verdict {
        self.evaluate(code, &level.checker, level.requires_file.as_ref())
            .await
    }

    #[instrument(skip_all, fields(rubric = rubric.kind()))]
    pub async fn evaluate(
        &self,
        code: &str,
        rubric: &Rubric,
        required_file: Option<&RequiredFile>,
    ) -> Verdict {
        let verdict = match rubric {
            Rubric::MultiTest { tests, marker } => {
                self.evaluate_multi(code, tests, marker, required_file).await
            }
            _ => self.evaluate_single(code, rubric, required_file).await,
        };

        info!(
            passed = verdict.passed,
            failed_test = ?verdict.failed_test,
            fault = ?verdict.fault,
            "Evaluation complete"
        );
        verdict
    }

    /// Synchronous entry point for hosts without a runtime
    ///
    /// Drives a private current-thread runtime; must not be called from
    /// inside another tokio runtime.
    pub fn evaluate_blocking(
        &self,
        code: &str,
        rubric: &Rubric,
        required_file: Option<&RequiredFile>,
    ) -> Result<Verdict> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build evaluation runtime")?;
        Ok(runtime.block_on(self.evaluate(code, rubric, required_file)))
    }

    async fn evaluate_multi(
        &self,
        code: &str,
        tests: &[TestCase],
        marker: &str,
        required_file: Option<&RequiredFile>,
    ) -> Verdict {
        for (idx, test) in tests.iter().enumerate() {
            let test_num = idx + 1;
            let variant = variant_for(code, marker, test);
            let result = self.executor.execute(&variant, required_file).await;

            if !result.succeeded {
                debug!(test_num, error = %result.error_message(), "Test case errored");
                return Verdict::fail(format!("Test {} failed: {}", test_num, result.error_message()))
                    .with_failed_test(test_num)
                    .with_fault(result.fault_kind());
            }

            if !checker::output_contains(&result.output, &test.expected_output, false) {
                debug!(test_num, "Test case output mismatch");
                return Verdict::fail(format!(
                    "Test {} failed: Expected '{}', got '{}'",
                    test_num, test.expected_output, result.output
                ))
                .with_failed_test(test_num);
            }

            debug!(test_num, "Test case passed");
        }

        Verdict::pass("All tests passed!")
    }

    async fn evaluate_single(
        &self,
        code: &str,
        rubric: &Rubric,
        required_file: Option<&RequiredFile>,
    ) -> Verdict {
        let result = self.executor.execute(code, required_file).await;

        if !result.succeeded {
            return Verdict::fail(format!("Error: {}", result.error_message()))
                .with_fault(result.fault_kind());
        }

        if checker::check(&result, rubric) {
            Verdict::pass(format!("Success! Output: {}", result.output))
        } else {
            Verdict::fail(format!("Output doesn't match expected. Got: {}", result.output))
        }
    }
}
