/// Test Harness - glue between the orchestrator and the evaluator
///
/// Compiles a submission once, then runs every test case against the same
/// artifact, strictly in order, inside a single pool slot and workspace.
/// If preparation fails every case fails with the same diagnostic.

use crate::engine::{Engine, Preparation};
use crate::error::EngineResult;
use crate::evaluator;
use crate::metrics;
use codegrade_common::types::{Language, SuiteReport, TestCase};
use tracing::{debug, info, instrument};

impl Engine {
    #[instrument(skip_all, fields(language = %language, cases = cases.len()))]
    pub async fn test_against_cases(
        &self,
        source: &str,
        language: Language,
        cases: &[TestCase],
        time_limit_ms: u64,
    ) -> EngineResult<SuiteReport> {
        let largest_input = cases.iter().map(|c| c.input.len()).max().unwrap_or(0);
        self.check_request(time_limit_ms, largest_input)?;

        let _slot = self.acquire_slot().await?;
        metrics::SUITES_TOTAL.inc();
        let bonus = self.config().scoring.compile_bonus_points;

        let prepared = match self.prepare(source, language).await? {
            Preparation::Ready(prepared) => prepared,
            Preparation::Rejected(outcome) => {
                let diagnostic = outcome
                    .diagnostic
                    .clone()
                    .unwrap_or_else(|| outcome.state.to_string());
                info!(state = %outcome.state, "Submission rejected before running any case");

                let results: Vec<_> = cases
                    .iter()
                    .map(|case| evaluator::unrun_case(case, outcome.state, &diagnostic))
                    .collect();
                let summary = evaluator::summarize(&results, cases, bonus, false);
                return Ok(SuiteReport {
                    summary,
                    results,
                    compile_diagnostic: Some(diagnostic),
                });
            }
        };

        let mut results = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            let outcome = match self.run_prepared(&prepared, &case.input, time_limit_ms).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    prepared.release().await;
                    return Err(e);
                }
            };
            let result = evaluator::evaluate_case(&outcome, case);
            debug!(
                case = index + 1,
                passed = result.passed,
                state = %result.state,
                elapsed_ms = result.elapsed_ms,
                "Test case evaluated"
            );
            results.push(result);
        }
        prepared.release().await;

        let summary = evaluator::summarize(&results, cases, bonus, true);
        info!(
            passed = summary.passed_tests,
            total = summary.total_tests,
            earned = summary.earned_points,
            max = summary.total_points,
            "Suite graded"
        );

        Ok(SuiteReport {
            summary,
            results,
            compile_diagnostic: None,
        })
    }
}
