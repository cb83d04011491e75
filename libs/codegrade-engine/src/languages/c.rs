//! C language adapter

use super::{first_name, native_plan, CommandPlan, LanguageAdapter, ToolProbe};
use crate::config::ToolchainConfig;
use codegrade_common::types::Language;
use std::path::Path;

pub const SOURCE_FILE: &str = "solution.c";

#[derive(Debug, Clone)]
pub struct CAdapter {
    toolchain: ToolchainConfig,
}

impl CAdapter {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }
}

impl LanguageAdapter for CAdapter {
    fn language(&self) -> Language {
        Language::C
    }

    fn source_file_name(&self, _source: &str) -> String {
        SOURCE_FILE.to_string()
    }

    fn build_commands(&self, workspace: &Path, _source: &str) -> CommandPlan {
        native_plan("C compiler", &self.toolchain, workspace, SOURCE_FILE)
    }

    fn probes(&self) -> Vec<ToolProbe> {
        vec![ToolProbe {
            name: first_name(&self.toolchain.compilers, "gcc"),
            candidates: self.toolchain.compilers.clone(),
            version_arg: "--version",
        }]
    }
}
