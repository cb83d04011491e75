//! Python language adapter

use super::{first_name, resolve_step, CommandPlan, LanguageAdapter, ToolProbe};
use crate::config::ToolchainConfig;
use crate::runner::CommandSpec;
use codegrade_common::types::Language;
use std::path::Path;

pub const SOURCE_FILE: &str = "solution.py";

#[derive(Debug, Clone)]
pub struct PythonAdapter {
    toolchain: ToolchainConfig,
}

impl PythonAdapter {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn source_file_name(&self, _source: &str) -> String {
        SOURCE_FILE.to_string()
    }

    fn build_commands(&self, workspace: &Path, _source: &str) -> CommandPlan {
        // -u: unbuffered, so a killed process still leaves its output behind
        let run = resolve_step("Python interpreter", &self.toolchain.runtimes).map(|python| {
            CommandSpec::new(python)
                .arg("-u")
                .arg(workspace.join(SOURCE_FILE).display().to_string())
                .current_dir(workspace)
        });

        CommandPlan {
            compile: None,
            run,
            artifact: None,
        }
    }

    fn probes(&self) -> Vec<ToolProbe> {
        vec![ToolProbe {
            name: first_name(&self.toolchain.runtimes, "python3"),
            candidates: self.toolchain.runtimes.clone(),
            version_arg: "--version",
        }]
    }
}
