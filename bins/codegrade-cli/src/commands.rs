// CLI commands. Each returns whether the outcome was a success, which
// becomes the process exit status.
use anyhow::{Context, Result};
use codegrade_common::types::{ExecutionRequest, ExecutionState, Language, SuiteReport, TestCase};
use codegrade_engine::evaluator::normalize_output;
use codegrade_engine::Engine;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read source file {}", file.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?);
    Ok(())
}

/// Resolve `--input` / `--input-file` into the stdin text
pub fn read_stdin_arg(input: Option<String>, input_file: Option<&Path>) -> Result<String> {
    match (input, input_file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display())),
        (None, None) => Ok(String::new()),
    }
}

/// Load test cases from a JSON array
pub fn load_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test cases {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse test cases {}", path.display()))
}

pub async fn run(
    engine: &Engine,
    language: Language,
    file: &Path,
    stdin: String,
    time_limit_ms: u64,
    json: bool,
) -> Result<bool> {
    let source = read_source(file)?;
    let request = ExecutionRequest::new(source, language, stdin, time_limit_ms);
    let outcome = engine.execute(&request).await?;

    if json {
        print_json(&outcome)?;
        return Ok(outcome.success);
    }

    print!("{}", outcome.stdout);
    if !outcome.stdout.is_empty() && !outcome.stdout.ends_with('\n') {
        println!();
    }

    let exit = outcome
        .exit_code
        .map(|code| format!(", exit code {}", code))
        .unwrap_or_default();
    if outcome.success {
        eprintln!("✅ {} in {} ms{}", outcome.state, outcome.elapsed_ms, exit);
    } else {
        eprintln!("❌ {} after {} ms{}", outcome.state, outcome.elapsed_ms, exit);
        if let Some(diagnostic) = &outcome.diagnostic {
            eprintln!("\n{}", diagnostic);
        }
    }
    Ok(outcome.success)
}

pub async fn test(
    engine: &Engine,
    language: Language,
    file: &Path,
    cases_file: &Path,
    time_limit_ms: u64,
    graded: bool,
    json: bool,
) -> Result<bool> {
    let source = read_source(file)?;
    let cases = load_cases(cases_file)?;
    let report = engine
        .test_against_cases(&source, language, &cases, time_limit_ms)
        .await?;
    let all_passed = report.summary.passed_tests == report.summary.total_tests;

    match (json, graded) {
        (true, true) => print_json(&report.graded_view())?,
        (true, false) => print_json(&report)?,
        (false, _) => print_report(&report, &cases, graded),
    }
    Ok(all_passed)
}

fn print_report(report: &SuiteReport, cases: &[TestCase], graded: bool) {
    let summary = &report.summary;
    println!(
        "🧪 {}/{} passed, {}/{} points ({:.1}%)",
        summary.passed_tests,
        summary.total_tests,
        summary.earned_points,
        summary.total_points,
        summary.score_percent
    );

    if let Some(diagnostic) = &report.compile_diagnostic {
        println!("\n❌ Submission did not build:\n{}", diagnostic);
        return;
    }

    println!();
    for (index, (result, case)) in report.results.iter().zip(cases).enumerate() {
        let label = case
            .description
            .clone()
            .unwrap_or_else(|| format!("case {}", index + 1));
        if result.passed {
            println!("  ✅ {} ({} ms, {} pts)", label, result.elapsed_ms, result.points);
            continue;
        }

        println!("  ❌ {} ({})", label, result.state);
        if graded || case.is_hidden {
            continue;
        }
        if result.state == ExecutionState::Completed {
            println!("     expected: {:?}", normalize_output(&result.expected_output));
            println!("     got:      {:?}", normalize_output(&result.actual_output));
        } else if let Some(error) = &result.error {
            println!("     {}", error.lines().next().unwrap_or(""));
        }
    }
}

pub fn validate(engine: &Engine, language: Language, file: &Path, json: bool) -> Result<bool> {
    let source = read_source(file)?;
    let report = engine.validate_syntax(&source, language);

    if json {
        print_json(&report)?;
    } else if report.is_valid {
        println!("✅ {} passes pre-validation", file.display());
    } else {
        println!("❌ {} rejected:", file.display());
        for error in &report.errors {
            println!("  - {}", error);
        }
    }
    Ok(report.is_valid)
}

pub async fn doctor(engine: &Engine, json: bool) -> Result<bool> {
    let report = engine.check_environment().await;
    let healthy = report.values().all(|ok| *ok);

    if json {
        print_json(&report)?;
        return Ok(healthy);
    }

    println!("🩺 Toolchains:\n");
    for (tool, ok) in &report {
        println!("  {} {}", if *ok { "✅" } else { "❌" }, tool);
    }
    println!("\n📂 Scratch root: {}", engine.config().scratch_root.display());
    println!("⚙️  Pool: {} slot(s)", engine.config().pool.max_concurrent_executions);
    Ok(healthy)
}

pub async fn sweep(engine: &Engine, max_age_secs: Option<u64>, json: bool) -> Result<bool> {
    let max_age = Duration::from_secs(max_age_secs.unwrap_or(engine.config().reaper.max_age_secs));
    let removed = engine.sweep_stale(max_age).await;

    if json {
        print_json(&serde_json::json!({ "removed": removed }))?;
    } else {
        println!(
            "🧹 Removed {} stale workspace(s) from {}",
            removed,
            engine.config().scratch_root.display()
        );
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_stdin_from_text_or_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1 2 3").unwrap();

        assert_eq!(read_stdin_arg(Some("x".to_string()), None).unwrap(), "x");
        assert_eq!(read_stdin_arg(None, Some(file.path())).unwrap(), "1 2 3");
        assert_eq!(read_stdin_arg(None, None).unwrap(), "");
    }

    #[test]
    fn test_load_cases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"input": "4", "expected_output": "5", "points": 10}}, {{"input": "", "expected_output": "", "is_hidden": true}}]"#
        )
        .unwrap();

        let cases = load_cases(file.path()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].points, 10);
        assert!(cases[1].is_hidden);
    }

    #[test]
    fn test_load_cases_reports_path() {
        let err = load_cases(Path::new("/nonexistent/cases.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cases.json"));
    }
}
