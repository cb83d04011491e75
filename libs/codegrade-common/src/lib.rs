pub mod jobs;
pub mod types;
