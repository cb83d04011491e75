/// Test Evaluator - language-agnostic scoring
///
/// Turns execution outcomes into per-case verdicts and a suite summary.
/// Knows nothing about processes or toolchains.
///
/// **Normalization Rules (applied to both sides, all languages):**
/// - Leading and trailing whitespace trimmed (covers `\n` vs `\r\n` at the end)
/// - Internal whitespace significant
/// - Case significant
///
/// **Scoring Rules:**
/// - A case passes only if the run `Completed` and the normalized outputs match
/// - earned = sum of points of passed cases, plus the compile bonus when the
///   source prepared cleanly
/// - score_percent = earned / total * 100, 0 when total is 0
/// - success_rate_percent = passed / tests * 100, 0 when there are no tests

use codegrade_common::types::{
    ExecutionOutcome, ExecutionState, TestCase, TestCaseResult, TestSuiteSummary,
};

pub fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Grade one case against the outcome of running it
pub fn evaluate_case(outcome: &ExecutionOutcome, case: &TestCase) -> TestCaseResult {
    let passed = outcome.state == ExecutionState::Completed
        && normalize_output(&outcome.stdout) == normalize_output(&case.expected_output);

    let error = match outcome.state {
        ExecutionState::Completed => None,
        _ => outcome
            .diagnostic
            .clone()
            .or_else(|| Some(outcome.state.to_string())),
    };

    TestCaseResult {
        input: case.input.clone(),
        expected_output: case.expected_output.clone(),
        actual_output: outcome.stdout.clone(),
        passed,
        state: outcome.state,
        elapsed_ms: outcome.elapsed_ms,
        error,
        points: if passed { case.points } else { 0 },
    }
}

/// Result for a case that never ran because preparation failed
pub fn unrun_case(case: &TestCase, state: ExecutionState, diagnostic: &str) -> TestCaseResult {
    TestCaseResult {
        input: case.input.clone(),
        expected_output: case.expected_output.clone(),
        actual_output: String::new(),
        passed: false,
        state,
        elapsed_ms: 0,
        error: Some(diagnostic.to_string()),
        points: 0,
    }
}

/// Aggregate case results into the suite summary.
///
/// `compile_bonus` only counts towards a non-empty suite; it always adds to
/// the total and is earned when `prepared_cleanly`.
pub fn summarize(
    results: &[TestCaseResult],
    cases: &[TestCase],
    compile_bonus: u32,
    prepared_cleanly: bool,
) -> TestSuiteSummary {
    let total_tests = cases.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    // u64 so large per-case points cannot overflow the totals
    let bonus = if cases.is_empty() { 0 } else { u64::from(compile_bonus) };
    let total_points = cases.iter().map(|c| u64::from(c.points)).sum::<u64>() + bonus;
    let earned_points = results.iter().map(|r| u64::from(r.points)).sum::<u64>()
        + if prepared_cleanly { bonus } else { 0 };

    TestSuiteSummary {
        total_tests,
        passed_tests,
        total_points,
        earned_points,
        success_rate_percent: percent(passed_tests as f64, total_tests as f64),
        score_percent: percent(earned_points as f64, total_points as f64),
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}
