/// Checker Registry - Rubric Interpretation
///
/// **Core Responsibility:**
/// Decide whether one ExecutionResult satisfies a single-case rubric.
///
/// **Critical Properties:**
/// - Knows nothing about interpreters, processes or containers
/// - Pure function: (execution result, rubric) → bool
/// - A failed execution never passes
/// - Unknown rubric kinds fail closed
/// - `multi_test` is driven by the evaluator, never judged here
///
/// **Normalization Rules:**
/// - output_contains: case-folded on both sides unless case_sensitive
/// - output_lines: each line trimmed, blank lines dropped, order and count matter
/// - output_range: whole trimmed output must be a base-10 integer
/// - output_exact: trimmed on both sides, case-sensitive

use pythonic_common::types::{ExecutionResult, Rubric};

pub fn check(result: &ExecutionResult, rubric: &Rubric) -> bool {
    if !result.succeeded {
        return false;
    }

    match rubric {
        Rubric::OutputContains {
            expected,
            case_sensitive,
        } => output_contains(&result.output, expected, *case_sensitive),
        Rubric::OutputLines { expected } => output_lines(&result.output, expected),
        Rubric::OutputRange { min, max } => output_range(&result.output, *min, *max),
        Rubric::OutputExact { expected } => output_exact(&result.output, expected),
        Rubric::MultiTest { .. } | Rubric::Unknown => false,
    }
}

pub fn output_contains(output: &str, expected: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        output.contains(expected)
    } else {
        output.to_lowercase().contains(&expected.to_lowercase())
    }
}

pub fn output_lines(output: &str, expected: &[String]) -> bool {
    let lines: Vec<&str> = output
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines.len() == expected.len() && lines.iter().zip(expected).all(|(a, b)| *a == b.as_str())
}

pub fn output_range(output: &str, min: i64, max: i64) -> bool {
    match output.trim().parse::<i64>() {
        Ok(value) => min <= value && value <= max,
        Err(_) => false,
    }
}

pub fn output_exact(output: &str, expected: &str) -> bool {
    output.trim() == expected.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pythonic_common::types::{ExecutionError, TestCase};

    fn ok(output: &str) -> ExecutionResult {
        ExecutionResult::success(output, 1)
    }

    fn contains(expected: &str, case_sensitive: bool) -> Rubric {
        Rubric::OutputContains {
            expected: expected.to_string(),
            case_sensitive,
        }
    }

    fn lines(expected: &[&str]) -> Rubric {
        Rubric::OutputLines {
            expected: expected.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_failed_execution_never_passes() {
        let failed = ExecutionResult::failure(ExecutionError::runtime("ValueError", "bad"), 1);
        assert!(!check(&failed, &contains("", false)));
        assert!(!check(&failed, &Rubric::OutputRange { min: i64::MIN, max: i64::MAX }));
    }

    #[test]
    fn test_contains_case_insensitive() {
        assert!(check(&ok("Hello"), &contains("hello", false)));
        assert!(check(&ok("ACCESS GRANTED"), &contains("Access granted", false)));
        assert!(check(&ok("hello world"), &contains("WORLD", false)));
        assert!(!check(&ok("goodbye"), &contains("hello", false)));
    }

    #[test]
    fn test_contains_invariant_under_case_permutation() {
        let outputs = ["Mainframe Breached", "mainframe breached", "MAINFRAME BREACHED", "mAiNfRaMe BrEaChEd"];
        let expected = ["breached", "BREACHED", "Breached", "bReAcHeD"];
        for output in outputs {
            for e in expected {
                assert!(check(&ok(output), &contains(e, false)), "{} / {}", output, e);
            }
        }
    }

    #[test]
    fn test_contains_case_sensitive() {
        assert!(!check(&ok("Hello"), &contains("hello", true)));
        assert!(check(&ok("Hello"), &contains("Hello", true)));
    }

    #[test]
    fn test_lines_exact_order() {
        assert!(check(&ok("a\nb"), &lines(&["a", "b"])));
        assert!(!check(&ok("b\na"), &lines(&["a", "b"])));
    }

    #[test]
    fn test_lines_ignore_blank_lines_and_padding() {
        assert!(check(&ok("\n  a  \n\n\t\nb\t\n\n"), &lines(&["a", "b"])));
        assert!(check(&ok("a\r\nb\r\n"), &lines(&["a", "b"])));
    }

    #[test]
    fn test_lines_count_matters() {
        assert!(!check(&ok("a\nb\nc"), &lines(&["a", "b"])));
        assert!(!check(&ok("a"), &lines(&["a", "b"])));
        assert!(!check(&ok("a\na\nb"), &lines(&["a", "b"])));
        assert!(check(&ok(""), &lines(&[])));
    }

    #[test]
    fn test_range() {
        let rubric = Rubric::OutputRange { min: 1, max: 10 };
        assert!(check(&ok("5"), &rubric));
        assert!(!check(&ok("50"), &rubric));
        assert!(!check(&ok("0"), &rubric));
        assert!(check(&ok("-3"), &Rubric::OutputRange { min: -5, max: -1 }));
    }

    #[test]
    fn test_range_inclusive_bounds() {
        let rubric = Rubric::OutputRange { min: 1, max: 10 };
        assert!(check(&ok("1"), &rubric));
        assert!(check(&ok("10"), &rubric));
    }

    #[test]
    fn test_range_non_numeric() {
        let rubric = Rubric::OutputRange { min: 1, max: 10 };
        assert!(!check(&ok("abc"), &rubric));
        assert!(!check(&ok("5.0"), &rubric));
        assert!(!check(&ok("5\n6"), &rubric));
        assert!(!check(&ok(""), &rubric));
    }

    #[test]
    fn test_exact() {
        let rubric = Rubric::OutputExact {
            expected: "42".to_string(),
        };
        assert!(check(&ok(" 42 \n"), &rubric));
        assert!(!check(&ok("420"), &rubric));
    }

    #[test]
    fn test_unknown_and_multi_test_fail_closed() {
        assert!(!check(&ok("anything"), &Rubric::Unknown));
        let multi = Rubric::MultiTest {
            tests: vec![TestCase {
                code_modification: None,
                expected_output: "anything".to_string(),
            }],
            marker: "security_level".to_string(),
        };
        assert!(!check(&ok("anything"), &multi));
    }
}
