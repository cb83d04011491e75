use crate::runner::RunnerError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop the engine from producing an outcome at all.
///
/// Compile errors, crashes and timeouts are not here: they are ordinary
/// `ExecutionOutcome`s.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no execution slot available after waiting {waited_ms}ms")]
    Busy { waited_ms: u64 },

    #[error("failed to allocate workspace under {root}: {source}")]
    Workspace {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write source file {path}: {source}")]
    SourceWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("process I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<RunnerError> for EngineError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Spawn { program, source } => EngineError::Spawn { program, source },
            RunnerError::Wait { source, .. } => EngineError::Io(source),
        }
    }
}
