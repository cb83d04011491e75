//! C++ language adapter

use super::{first_name, native_plan, CommandPlan, LanguageAdapter, ToolProbe};
use crate::config::ToolchainConfig;
use codegrade_common::types::Language;
use std::path::Path;

pub const SOURCE_FILE: &str = "solution.cpp";

#[derive(Debug, Clone)]
pub struct CppAdapter {
    toolchain: ToolchainConfig,
}

impl CppAdapter {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }
}

impl LanguageAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn source_file_name(&self, _source: &str) -> String {
        SOURCE_FILE.to_string()
    }

    fn build_commands(&self, workspace: &Path, _source: &str) -> CommandPlan {
        native_plan("C++ compiler", &self.toolchain, workspace, SOURCE_FILE)
    }

    fn probes(&self) -> Vec<ToolProbe> {
        vec![ToolProbe {
            name: first_name(&self.toolchain.compilers, "g++"),
            candidates: self.toolchain.compilers.clone(),
            version_arg: "--version",
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolchainsConfig;

    #[test]
    fn test_uses_cpp_flags_and_source() {
        let mut toolchain = ToolchainsConfig::default().cpp;
        toolchain.compilers = vec!["/bin/sh".to_string()];
        let adapter = CppAdapter::new(toolchain);
        let ws = Path::new("/scratch/cg-3");

        assert_eq!(adapter.source_file_name(""), "solution.cpp");

        let compile = adapter.build_commands(ws, "").compile.unwrap().unwrap();
        assert!(compile.args.contains(&"-std=c++17".to_string()));
        assert_eq!(compile.args.last().map(String::as_str), Some("/scratch/cg-3/solution.cpp"));
    }

    #[test]
    fn test_probe_named_after_first_candidate() {
        let adapter = CppAdapter::new(ToolchainsConfig::default().cpp);
        let probes = adapter.probes();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].name, "g++");
    }
}
