//! Language adapters: file naming and compile/run command construction

pub mod c;
pub mod cpp;
pub mod java;
pub mod python;

use crate::config::{ToolchainConfig, ToolchainsConfig};
use crate::runner::CommandSpec;
use codegrade_common::types::Language;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A toolchain binary that none of the configured candidates provided
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("toolchain missing: no {tool} found (tried {})", candidates.join(", "))]
pub struct ToolchainMissing {
    pub tool: &'static str,
    pub candidates: Vec<String>,
}

/// One step of a plan, or the toolchain that step would need
pub type Step = Result<CommandSpec, ToolchainMissing>;

#[derive(Debug, Clone)]
pub struct CommandPlan {
    /// Absent for interpreted languages
    pub compile: Option<Step>,
    pub run: Step,
    /// Binary or class file the compile step produces; its absence after a
    /// successful compile fails the build
    pub artifact: Option<PathBuf>,
}

/// Version query used by the environment probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolProbe {
    pub name: String,
    pub candidates: Vec<String>,
    pub version_arg: &'static str,
}

pub trait LanguageAdapter: fmt::Debug + Send + Sync {
    fn language(&self) -> Language;

    /// File name the source must be written under inside the workspace
    fn source_file_name(&self, source: &str) -> String;

    /// Compile (optional) and run commands for a source written to `workspace`
    fn build_commands(&self, workspace: &Path, source: &str) -> CommandPlan;

    /// Tools this language needs, for `check_environment`
    fn probes(&self) -> Vec<ToolProbe>;
}

/// Get the adapter for a language
pub fn adapter_for(language: Language, toolchains: &ToolchainsConfig) -> Box<dyn LanguageAdapter> {
    match language {
        Language::C => Box::new(c::CAdapter::new(toolchains.c.clone())),
        Language::Cpp => Box::new(cpp::CppAdapter::new(toolchains.cpp.clone())),
        Language::Java => Box::new(java::JavaAdapter::new(toolchains.java.clone())),
        Language::Python => Box::new(python::PythonAdapter::new(toolchains.python.clone())),
    }
}

/// First candidate that exists, either as a path or on `PATH`
pub fn resolve_executable(candidates: &[String]) -> Option<PathBuf> {
    let search_path = std::env::var_os("PATH");
    candidates.iter().find_map(|candidate| {
        let as_path = Path::new(candidate);
        if as_path.components().count() > 1 {
            return as_path.is_file().then(|| as_path.to_path_buf());
        }
        let dirs = search_path.as_ref()?;
        std::env::split_paths(dirs)
            .map(|dir| dir.join(candidate))
            .find(|full| full.is_file())
    })
}

pub(crate) fn resolve_step(tool: &'static str, candidates: &[String]) -> Result<PathBuf, ToolchainMissing> {
    resolve_executable(candidates).ok_or_else(|| ToolchainMissing {
        tool,
        candidates: candidates.to_vec(),
    })
}

/// gcc-style native build: `<cc> <flags> -o <ws>/solution <ws>/<src> <link flags>`
pub(crate) fn native_plan(
    tool: &'static str,
    toolchain: &ToolchainConfig,
    workspace: &Path,
    source_name: &str,
) -> CommandPlan {
    let binary = workspace.join(NATIVE_BINARY);
    let compile = resolve_step(tool, &toolchain.compilers).map(|compiler| {
        CommandSpec::new(compiler)
            .args(toolchain.compile_flags.iter().cloned())
            .arg("-o")
            .arg(binary.display().to_string())
            .arg(workspace.join(source_name).display().to_string())
            .args(toolchain.link_flags.iter().cloned())
            .current_dir(workspace)
    });
    let run = Ok(CommandSpec::new(&binary).current_dir(workspace));

    CommandPlan {
        compile: Some(compile),
        run,
        artifact: Some(binary),
    }
}

pub(crate) const NATIVE_BINARY: &str = "solution";

pub(crate) fn first_name(candidates: &[String], fallback: &str) -> String {
    candidates
        .first()
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_path() {
        let found = resolve_executable(&["/nonexistent/cc".to_string(), "/bin/sh".to_string()]);
        assert_eq!(found, Some(PathBuf::from("/bin/sh")));
    }

    #[test]
    fn test_resolve_on_path() {
        let found = resolve_executable(&["codegrade-no-such-tool".to_string(), "sh".to_string()]);
        let found = found.expect("sh is on PATH");
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn test_resolve_nothing() {
        assert_eq!(resolve_executable(&["codegrade-no-such-tool".to_string()]), None);
        assert_eq!(resolve_executable(&[]), None);
    }

    #[test]
    fn test_missing_toolchain_message() {
        let err = resolve_step(
            "C compiler",
            &["codegrade-gcc".to_string(), "codegrade-cc".to_string()],
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "toolchain missing: no C compiler found (tried codegrade-gcc, codegrade-cc)"
        );
    }

    #[test]
    fn test_adapter_for_every_language() {
        let toolchains = ToolchainsConfig::default();
        for language in Language::ALL {
            assert_eq!(adapter_for(language, &toolchains).language(), language);
        }
    }
}
