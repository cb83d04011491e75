use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the engine knows how to build and run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::C, Language::Cpp, Language::Java, Language::Python];

    /// Parse a language name, accepting the common aliases callers send
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "c" => Some(Language::C),
            "cpp" | "c++" | "cxx" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "python" | "python3" | "py" => Some(Language::Python),
            _ => None,
        }
    }

    /// Whether a compile step precedes the run step
    pub fn is_compiled(&self) -> bool {
        !matches!(self, Language::Python)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
        };
        f.write_str(name)
    }
}

/// A single ad-hoc execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language: Language,
    #[serde(default)]
    pub stdin: String,
    pub wall_clock_limit_ms: u64,
}

impl ExecutionRequest {
    pub fn new(
        source_code: impl Into<String>,
        language: Language,
        stdin: impl Into<String>,
        wall_clock_limit_ms: u64,
    ) -> Self {
        Self {
            source_code: source_code.into(),
            language,
            stdin: stdin.into(),
            wall_clock_limit_ms,
        }
    }
}

/// Lifecycle of one execution request.
///
/// `Created` and `RunPending` are the same point for interpreted languages,
/// which never pass through `Compiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Created,
    SyntaxRejected,
    CompilePending,
    Compiling,
    CompileFailed,
    RunPending,
    Running,
    Completed,
    TimedOut,
    RuntimeFailed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::SyntaxRejected
                | ExecutionState::CompileFailed
                | ExecutionState::Completed
                | ExecutionState::TimedOut
                | ExecutionState::RuntimeFailed
        )
    }

    /// Legal edges of the state machine
    pub fn can_advance_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Created, SyntaxRejected)
                | (Created, CompilePending)
                | (Created, RunPending)
                | (Created, Running)
                | (CompilePending, Compiling)
                | (Compiling, CompileFailed)
                | (Compiling, RunPending)
                | (RunPending, Running)
                | (Running, Completed)
                | (Running, TimedOut)
                | (Running, RuntimeFailed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        use ExecutionState::*;
        match self {
            Created => "created",
            SyntaxRejected => "syntax_rejected",
            CompilePending => "compile_pending",
            Compiling => "compiling",
            CompileFailed => "compile_failed",
            RunPending => "run_pending",
            Running => "running",
            Completed => "completed",
            TimedOut => "timed_out",
            RuntimeFailed => "runtime_failed",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of one execution request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub state: ExecutionState,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub diagnostic: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for a request that never reached a process
    pub fn rejected(state: ExecutionState, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        Self {
            state,
            success: false,
            stdout: String::new(),
            stderr: diagnostic.clone(),
            elapsed_ms: 0,
            exit_code: None,
            timed_out: false,
            diagnostic: Some(diagnostic),
        }
    }
}

/// Test case supplied by the question service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub description: Option<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>, points: u32) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            is_hidden: false,
            points,
            description: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub state: ExecutionState,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    /// Points awarded for this case
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuiteSummary {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub total_points: u64,
    pub earned_points: u64,
    pub success_rate_percent: f64,
    pub score_percent: f64,
}

/// Everything a suite run produces, in test case order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub summary: TestSuiteSummary,
    pub results: Vec<TestCaseResult>,
    pub compile_diagnostic: Option<String>,
}

/// Per-case verdict without any test case content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseVerdict {
    pub passed: bool,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedView {
    pub summary: TestSuiteSummary,
    pub verdicts: Vec<CaseVerdict>,
}

impl SuiteReport {
    /// Strip inputs, outputs and diagnostics for graded submissions
    pub fn graded_view(&self) -> GradedView {
        GradedView {
            summary: self.summary.clone(),
            verdicts: self
                .results
                .iter()
                .map(|r| CaseVerdict {
                    passed: r.passed,
                    points: r.points,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl SyntaxReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
