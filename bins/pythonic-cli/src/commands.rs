// CLI commands for running submissions and validating level content
use anyhow::{bail, Context, Result};
use pythonic_common::config::EvaluatorConfig;
use pythonic_common::level::LevelLoader;
use pythonic_common::types::{ExecutionResult, RequiredFile, Verdict};
use pythonic_eval::Evaluator;
use std::fs;
use std::path::Path;
use tracing::info;

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn print_result(result: &ExecutionResult) {
    if result.succeeded {
        println!("✓ Ran in {}ms", result.execution_time_ms);
        if !result.output.is_empty() {
            println!("{}", result.output);
        }
    } else {
        println!("✗ {}", result.error_message());
    }
}

fn print_verdict(verdict: &Verdict) {
    let mark = if verdict.passed { "✓" } else { "✗" };
    println!("{} {}", mark, verdict.message);
    if verdict.timed_out() {
        println!("  Your code ran too long. Look for a loop that never ends.");
    }
}

/// Execute a file without judging it
pub async fn run_file(
    config: &EvaluatorConfig,
    file: &Path,
    required_file: Option<String>,
    required_content: Option<&Path>,
    json: bool,
) -> Result<bool> {
    let source = read_source(file)?;
    let required = match (required_file, required_content) {
        (Some(filename), Some(content_path)) => Some(RequiredFile {
            filename,
            content: read_source(content_path)?,
        }),
        (None, None) => None,
        _ => bail!("--required-file and --required-content must be given together"),
    };

    let evaluator = Evaluator::new(config)?;
    let result = evaluator.execute(&source, required.as_ref()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(result.succeeded)
}

/// Evaluate a file against one level
pub async fn evaluate_file(
    config: &EvaluatorConfig,
    file: &Path,
    level_id: &str,
    levels_dir: &Path,
) -> Result<bool> {
    let source = read_source(file)?;
    let loader = LevelLoader::load(levels_dir)?;
    let level = loader
        .get_level(level_id)
        .with_context(|| format!("Level '{}' not found in {}", level_id, levels_dir.display()))?;

    println!("→ {} - {}", level.id, level.title);
    let evaluator = Evaluator::new(config)?;
    let verdict = evaluator.evaluate_level(&source, level).await;
    print_verdict(&verdict);
    Ok(verdict.passed)
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checked: usize,
    pub failures: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every level's reference solution through its own rubric
pub async fn validate_with(evaluator: &Evaluator, loader: &LevelLoader) -> ValidationReport {
    let mut report = ValidationReport::default();

    for error in loader.load_errors() {
        report
            .failures
            .push(format!("{}: {}", error.path.display(), error.message));
    }

    for level in loader.all_levels() {
        report.checked += 1;
        let verdict = evaluator.evaluate_level(&level.solution, level).await;
        info!(level_id = %level.id, passed = verdict.passed, "Validated level");
        if !verdict.passed {
            report
                .failures
                .push(format!("{}: solution does not pass - {}", level.id, verdict.message));
        }
    }

    report
}

pub async fn validate_levels(config: &EvaluatorConfig, levels_dir: &Path) -> Result<bool> {
    let loader = LevelLoader::load(levels_dir)?;
    if loader.level_count() == 0 && loader.load_errors().is_empty() {
        bail!("No levels found in {}", levels_dir.display());
    }

    let evaluator = Evaluator::new(config)?;
    let report = validate_with(&evaluator, &loader).await;

    println!("→ Checked {} level(s) in {}", report.checked, loader.levels_dir().display());
    for failure in &report.failures {
        println!("  ✗ {}", failure);
    }
    if report.is_clean() {
        println!("✅ All levels valid");
    }
    Ok(report.is_clean())
}

pub fn list_levels(levels_dir: &Path) -> Result<bool> {
    let loader = LevelLoader::load(levels_dir)?;
    for level in loader.all_levels() {
        println!(
            "{}  {:<28} {:<12} {:>4} pts  {:>3}s  [{}]",
            level.id,
            level.title,
            level.difficulty,
            level.points,
            level.time_limit,
            level.checker.kind()
        );
    }
    for error in loader.load_errors() {
        println!("⚠ {}: {}", error.path.display(), error.message);
    }
    Ok(loader.load_errors().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pythonic_common::config::WorkspaceMode;
    use pythonic_eval::engine::{RawExecution, SandboxEngine, SandboxRequest};
    use std::sync::Arc;

    /// Answers every run with the same printed output
    struct FixedOutput(&'static str);

    #[async_trait]
    impl SandboxEngine for FixedOutput {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn run(&self, _request: &SandboxRequest<'_>) -> Result<RawExecution> {
            let body = serde_json::json!({ "ok": true, "output": self.0, "error": null });
            Ok(RawExecution {
                stdout: body.to_string(),
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    fn level_json(id: &str, expected: &str) -> String {
        serde_json::json!({
            "id": id,
            "title": "Handshake",
            "mission_log": "",
            "challenge": "",
            "starter_code": "",
            "solution": "print('Hello')",
            "checker": {"type": "output_contains", "expected": expected}
        })
        .to_string()
    }

    #[test]
    fn test_shipped_levels_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../levels");
        let loader = LevelLoader::load(&dir).unwrap();
        assert!(loader.load_errors().is_empty(), "{:?}", loader.load_errors());
        assert_eq!(loader.level_count(), 6);

        let mut kinds: Vec<&str> = loader.all_levels().into_iter().map(|l| l.checker.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(
            kinds,
            vec!["multi_test", "output_contains", "output_exact", "output_lines", "output_range"]
        );
    }

    #[tokio::test]
    async fn test_validate_reports_failing_solutions_and_broken_files() {
        let dir = std::env::temp_dir().join(format!("pythonic-cli-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("level_001.json"), level_json("level_001", "hello")).unwrap();
        fs::write(dir.join("level_002.json"), level_json("level_002", "goodbye")).unwrap();
        fs::write(dir.join("level_003.json"), "{ not json").unwrap();

        let config = EvaluatorConfig {
            workdir: std::env::temp_dir(),
            workspace: WorkspaceMode::Scratch,
            ..Default::default()
        };
        let evaluator = Evaluator::with_engine(Arc::new(FixedOutput("Hello")), &config);
        let loader = LevelLoader::load(&dir).unwrap();

        let report = validate_with(&evaluator, &loader).await;
        assert_eq!(report.checked, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().any(|f| f.contains("level_003.json")));
        assert!(report.failures.iter().any(|f| f.starts_with("level_002: solution does not pass")));
        assert!(!report.is_clean());

        fs::remove_dir_all(&dir).unwrap();
    }
}
