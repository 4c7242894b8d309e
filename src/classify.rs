//! Outcome classification.
//!
//! Combines what actually happened (an `ExecutionResult`) with what the
//! configuration declared (a `Disposition`) into a final `Outcome`.
//! Output comparison uses WDL-level value equality: numbers compare
//! numerically, collections compare element/key-wise, and the top-level
//! output object is a subset check (extra engine outputs are ignored,
//! following the established convention for WDL output payloads).

use serde_json::Value as JsonValue;
use std::fmt;

use crate::discovery::TestCase;
use crate::engine::{ExecutionResult, ExecutionStatus};
use crate::expectations::Disposition;

/// Final classification of one test case. Derived only; never stored
/// independently of the execution result and disposition it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Pass,
    ExpectedFail,
    UnexpectedFail,
    UnexpectedPass,
    Skipped,
    Cancelled,
}

impl Outcome {
    /// Whether this outcome makes the overall run unsuccessful.
    /// EXPECTED_FAIL and SKIPPED are the whole point of tracking
    /// exclusions and never count against success.
    pub fn counts_against_success(&self) -> bool {
        matches!(self, Outcome::UnexpectedFail | Outcome::UnexpectedPass)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::ExpectedFail => write!(f, "EXPECTED_FAIL"),
            Outcome::UnexpectedFail => write!(f, "UNEXPECTED_FAIL"),
            Outcome::UnexpectedPass => write!(f, "UNEXPECTED_PASS"),
            Outcome::Skipped => write!(f, "SKIPPED"),
            Outcome::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Apply the classification decision table.
pub fn classify(case: &TestCase, result: &ExecutionResult, disposition: &Disposition) -> Outcome {
    if result.status == ExecutionStatus::Cancelled {
        return Outcome::Cancelled;
    }
    match disposition {
        // Skipped cases are short-circuited by the scheduler before the
        // engine runs; this row keeps the table total.
        Disposition::Skip(_) => Outcome::Skipped,
        Disposition::Normal => {
            if matches_expected(case, result) {
                Outcome::Pass
            } else {
                Outcome::UnexpectedFail
            }
        }
        Disposition::Xfail(_) => {
            if matches_expected(case, result) {
                Outcome::UnexpectedPass
            } else {
                Outcome::ExpectedFail
            }
        }
    }
}

/// Whether the actual result matches the fixture's declared expectation.
/// Timeouts, crashes, malformed output, and spawn failures never match.
pub fn matches_expected(case: &TestCase, result: &ExecutionResult) -> bool {
    let ExecutionStatus::Completed { exit_code } = result.status else {
        return false;
    };

    if exit_code != case.expected.exit_code.unwrap_or(0) {
        return false;
    }

    match &case.expected.outputs {
        Some(expected) => match &result.outputs {
            Some(actual) => outputs_match(expected, actual, case.expected.float_tolerance),
            None => false,
        },
        None => true,
    }
}

/// Describe why a completed execution did not match, for the report.
/// Returns `None` when there is nothing useful to say.
pub fn failure_detail(case: &TestCase, result: &ExecutionResult) -> Option<String> {
    match result.status {
        ExecutionStatus::Completed { exit_code } => {
            let expected_code = case.expected.exit_code.unwrap_or(0);
            if exit_code != expected_code {
                return Some(format!(
                    "exit code {} (expected {})",
                    exit_code, expected_code
                ));
            }
            if case.expected.outputs.is_some() && !matches_expected(case, result) {
                return Some("output values do not match expected values".to_string());
            }
            None
        }
        _ => result.message.clone(),
    }
}

/// Compare the expected output payload against the actual one. At the top
/// level only the declared keys are checked; nested values compare exactly.
pub fn outputs_match(expected: &JsonValue, actual: &JsonValue, tolerance: Option<f64>) -> bool {
    match (expected, actual) {
        (JsonValue::Object(exp), JsonValue::Object(act)) => exp
            .iter()
            .all(|(key, value)| act.get(key).is_some_and(|a| values_equal(value, a, tolerance))),
        _ => values_equal(expected, actual, tolerance),
    }
}

/// WDL-level value equality over JSON-encoded values.
pub fn values_equal(expected: &JsonValue, actual: &JsonValue, tolerance: Option<f64>) -> bool {
    match (expected, actual) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a == b,
        (JsonValue::Number(a), JsonValue::Number(b)) => numbers_equal(a, b, tolerance),
        (JsonValue::String(a), JsonValue::String(b)) => a == b,
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| values_equal(x, y, tolerance))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).is_some_and(|w| values_equal(value, w, tolerance)))
        }
        _ => false,
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number, tolerance: Option<f64>) -> bool {
    // Integer pairs compare exactly; anything involving a float goes
    // through f64 so that 1 == 1.0 holds, with tolerance if declared.
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => match tolerance {
            Some(tol) => (x - y).abs() <= tol,
            None => x == y,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ExpectedResult;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn case_with(expected: ExpectedResult) -> TestCase {
        TestCase {
            spec_version: "wdl-1.1".to_string(),
            name: "case.wdl".to_string(),
            wdl_path: PathBuf::from("case.wdl"),
            inputs_path: None,
            expected,
        }
    }

    fn completed(exit_code: i32, outputs: Option<JsonValue>) -> ExecutionResult {
        ExecutionResult {
            status: ExecutionStatus::Completed { exit_code },
            outputs,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
            message: None,
        }
    }

    fn tagged(status: ExecutionStatus) -> ExecutionResult {
        ExecutionResult {
            status,
            outputs: None,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
            message: Some("detail".to_string()),
        }
    }

    #[test]
    fn test_normal_match_is_pass() {
        let case = case_with(ExpectedResult {
            outputs: Some(json!({"t.out": "done"})),
            ..Default::default()
        });
        let result = completed(0, Some(json!({"t.out": "done"})));
        assert_eq!(
            classify(&case, &result, &Disposition::Normal),
            Outcome::Pass
        );
    }

    #[test]
    fn test_normal_exit_code_mismatch_is_unexpected_fail() {
        let case = case_with(ExpectedResult::default());
        let result = completed(1, None);
        let outcome = classify(&case, &result, &Disposition::Normal);
        assert_eq!(outcome, Outcome::UnexpectedFail);
        assert!(outcome.counts_against_success());
    }

    #[test]
    fn test_xfail_mismatch_is_expected_fail() {
        let case = case_with(ExpectedResult {
            outputs: Some(json!({"p.out": [1, 2]})),
            ..Default::default()
        });
        let result = completed(0, Some(json!({"p.out": [1, 3]})));
        let disposition = Disposition::Xfail(Some("known bug".to_string()));
        let outcome = classify(&case, &result, &disposition);
        assert_eq!(outcome, Outcome::ExpectedFail);
        assert!(!outcome.counts_against_success());
    }

    #[test]
    fn test_xfail_match_is_unexpected_pass() {
        let case = case_with(ExpectedResult {
            outputs: Some(json!({"p.out": [1, 2]})),
            ..Default::default()
        });
        let result = completed(0, Some(json!({"p.out": [1, 2]})));
        let disposition = Disposition::Xfail(None);
        assert_eq!(
            classify(&case, &result, &disposition),
            Outcome::UnexpectedPass
        );
    }

    #[test]
    fn test_declared_nonzero_exit_code_can_pass() {
        let case = case_with(ExpectedResult {
            exit_code: Some(1),
            ..Default::default()
        });
        let result = completed(1, None);
        assert_eq!(
            classify(&case, &result, &Disposition::Normal),
            Outcome::Pass
        );
    }

    #[test]
    fn test_timeout_never_matches() {
        let case = case_with(ExpectedResult::default());
        for status in [
            ExecutionStatus::Timeout,
            ExecutionStatus::MalformedOutput,
            ExecutionStatus::SpawnFailed,
        ] {
            let result = tagged(status);
            assert_eq!(
                classify(&case, &result, &Disposition::Normal),
                Outcome::UnexpectedFail
            );
            // Under xfail the same result is an expected failure.
            assert_eq!(
                classify(&case, &result, &Disposition::Xfail(None)),
                Outcome::ExpectedFail
            );
        }
    }

    #[test]
    fn test_cancelled_overrides_disposition() {
        let case = case_with(ExpectedResult::default());
        let result = tagged(ExecutionStatus::Cancelled);
        assert_eq!(
            classify(&case, &result, &Disposition::Normal),
            Outcome::Cancelled
        );
        assert_eq!(
            classify(&case, &result, &Disposition::Xfail(None)),
            Outcome::Cancelled
        );
    }

    #[test]
    fn test_top_level_subset_semantics() {
        let expected = json!({"t.out": 1});
        let actual = json!({"t.out": 1, "t.extra": "ignored"});
        assert!(outputs_match(&expected, &actual, None));

        // Nested objects compare exactly.
        let expected = json!({"t.obj": {"a": 1}});
        let actual = json!({"t.obj": {"a": 1, "b": 2}});
        assert!(!outputs_match(&expected, &actual, None));
    }

    #[test]
    fn test_numeric_equality_across_int_and_float() {
        assert!(values_equal(&json!(1), &json!(1.0), None));
        assert!(!values_equal(&json!(1), &json!(1.5), None));
        assert!(values_equal(&json!(0.1), &json!(0.1), None));
    }

    #[test]
    fn test_float_tolerance() {
        assert!(!values_equal(&json!(1.0), &json!(1.0000001), None));
        assert!(values_equal(&json!(1.0), &json!(1.0000001), Some(1e-6)));
        assert!(!values_equal(&json!(1.0), &json!(1.1), Some(1e-6)));
    }

    #[test]
    fn test_collections_compare_pairwise() {
        assert!(!values_equal(&json!([1, 2]), &json!([1, 2, 3]), None));
        assert!(values_equal(
            &json!({"a": [1, 2], "b": "x"}),
            &json!({"b": "x", "a": [1, 2]}),
            None
        ));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2}), None));
        assert!(!values_equal(&json!("1"), &json!(1), None));
    }

    #[test]
    fn test_failure_detail() {
        let case = case_with(ExpectedResult {
            outputs: Some(json!({"t.out": 1})),
            ..Default::default()
        });

        let detail = failure_detail(&case, &completed(2, None)).unwrap();
        assert!(detail.contains("exit code 2"));

        let detail = failure_detail(&case, &completed(0, Some(json!({"t.out": 9})))).unwrap();
        assert!(detail.contains("do not match"));

        assert!(failure_detail(&case, &completed(0, Some(json!({"t.out": 1})))).is_none());

        let detail = failure_detail(&case, &tagged(ExecutionStatus::Timeout)).unwrap();
        assert_eq!(detail, "detail");
    }
}
