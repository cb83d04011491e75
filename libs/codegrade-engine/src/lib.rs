pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod languages;
pub mod metrics;
pub mod probe;
pub mod runner;
pub mod syntax;
pub mod workspace;


pub use config::EngineConfig;
pub use engine::{Engine, ExecutionSlot, Preparation, Prepared};
pub use error::{EngineError, EngineResult};
