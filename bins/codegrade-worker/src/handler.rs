//! Job dispatch: one parsed line in, one response out

use codegrade_common::jobs::{parse_job, Job, JobKind, JobOutput, JobResponse};
use codegrade_common::types::ExecutionRequest;
use codegrade_engine::{metrics, Engine, EngineResult};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Handle one raw input line. Malformed lines still get a response, tagged
/// with whatever `id`/`attempt_id` could be recovered from them.
pub async fn handle_line(engine: &Engine, line: &str) -> JobResponse {
    match parse_job(line) {
        Ok(job) => handle_job(engine, job).await,
        Err(e) => {
            let (id, attempt_id) = salvage_ids(line);
            warn!(job_id = ?id, error = %e, "Malformed job");
            JobResponse::error(id, attempt_id, format!("malformed job: {}", e))
        }
    }
}

pub async fn handle_job(engine: &Engine, job: Job) -> JobResponse {
    let start = Instant::now();
    info!(job_id = %job.id, kind = job.kind.name(), attempt_id = ?job.attempt_id, "Received job");

    match run_job(engine, &job.kind).await {
        Ok(output) => {
            info!(
                job_id = %job.id,
                kind = job.kind.name(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Job completed"
            );
            JobResponse::ok(&job, output)
        }
        Err(e) => {
            error!(job_id = %job.id, kind = job.kind.name(), error = %e, "Job failed");
            JobResponse::error(Some(job.id), job.attempt_id.clone(), e.to_string())
        }
    }
}

async fn run_job(engine: &Engine, kind: &JobKind) -> EngineResult<JobOutput> {
    let output = match kind {
        JobKind::Execute {
            code,
            language,
            stdin,
            time_limit_ms,
        } => {
            let request = ExecutionRequest::new(code.clone(), *language, stdin.clone(), *time_limit_ms);
            JobOutput::Execution(engine.execute(&request).await?)
        }
        JobKind::Test {
            code,
            language,
            test_cases,
            time_limit_ms,
            graded,
        } => {
            let report = engine
                .test_against_cases(code, *language, test_cases, *time_limit_ms)
                .await?;
            if *graded {
                JobOutput::Graded(report.graded_view())
            } else {
                JobOutput::Suite(report)
            }
        }
        JobKind::Validate { code, language } => {
            JobOutput::Syntax(engine.validate_syntax(code, *language))
        }
        JobKind::Environment => JobOutput::Environment(engine.check_environment().await),
        JobKind::Metrics => JobOutput::Metrics(metrics::render()),
    };
    Ok(output)
}

fn salvage_ids(line: &str) -> (Option<Uuid>, Option<String>) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return (None, None);
    };
    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    let attempt_id = value
        .get("attempt_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    (id, attempt_id)
}
