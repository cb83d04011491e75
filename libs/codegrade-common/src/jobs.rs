use crate::types::{ExecutionOutcome, GradedView, Language, SuiteReport, SyntaxReport, TestCase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Worker wire semantics - one JSON object per line in each direction.
/// Shared here so the worker and anything feeding it never drift.

pub const DEFAULT_TIME_LIMIT_MS: u64 = 5000;

fn default_time_limit() -> u64 {
    DEFAULT_TIME_LIMIT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub attempt_id: Option<String>,
    #[serde(flatten)]
    pub kind: JobKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Ad-hoc run with custom input
    Execute {
        code: String,
        language: Language,
        #[serde(default)]
        stdin: String,
        #[serde(default = "default_time_limit")]
        time_limit_ms: u64,
    },
    /// Run against a list of test cases
    Test {
        code: String,
        language: Language,
        test_cases: Vec<TestCase>,
        #[serde(default = "default_time_limit")]
        time_limit_ms: u64,
        /// Only pass/fail and scores in the response
        #[serde(default)]
        graded: bool,
    },
    Validate {
        code: String,
        language: Language,
    },
    Environment,
    Metrics,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Execute { .. } => "execute",
            JobKind::Test { .. } => "test",
            JobKind::Validate { .. } => "validate",
            JobKind::Environment => "environment",
            JobKind::Metrics => "metrics",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobOutput {
    Execution(ExecutionOutcome),
    Suite(SuiteReport),
    Graded(GradedView),
    Syntax(SyntaxReport),
    Environment(BTreeMap<String, bool>),
    Metrics(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Ok { result: JobOutput },
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: Option<Uuid>,
    pub attempt_id: Option<String>,
    pub completed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: JobStatus,
}

impl JobResponse {
    pub fn ok(job: &Job, result: JobOutput) -> Self {
        Self {
            id: Some(job.id),
            attempt_id: job.attempt_id.clone(),
            completed_at: Utc::now(),
            status: JobStatus::Ok { result },
        }
    }

    pub fn error(id: Option<Uuid>, attempt_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            attempt_id,
            completed_at: Utc::now(),
            status: JobStatus::Error { error: error.into() },
        }
    }
}

/// Parse one line of worker input
pub fn parse_job(line: &str) -> serde_json::Result<Job> {
    serde_json::from_str(line)
}

/// Encode a response as a single line (no trailing newline)
pub fn encode_response(response: &JobResponse) -> serde_json::Result<String> {
    serde_json::to_string(response)
}
