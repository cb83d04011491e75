//! Java language adapter
//!
//! javac insists that a public class lives in a file of the same name, so
//! the source file name is derived from the first `public class <Name>`
//! declaration. Sources without a match are saved as `Solution.java`; if
//! they still declare some other public class, javac rejects them with a
//! message naming the expected file.
//!
//! Without a public class the JVM is pointed at the class that declares
//! `main`, falling back to the first class in the file.

use super::{first_name, resolve_step, CommandPlan, LanguageAdapter, ToolProbe};
use crate::config::ToolchainConfig;
use crate::runner::CommandSpec;
use codegrade_common::types::Language;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

pub const FALLBACK_CLASS: &str = "Solution";

lazy_static! {
    static ref PUBLIC_CLASS: Regex =
        Regex::new(r"\bpublic\s+class\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid regex");
    static ref ANY_CLASS: Regex =
        Regex::new(r"\bclass\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid regex");
    static ref MAIN_METHOD: Regex =
        Regex::new(r"\bstatic\s+void\s+main\s*\(").expect("valid regex");
}

fn public_class(source: &str) -> Option<&str> {
    PUBLIC_CLASS
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Stem of the `.java` file the source is saved as
pub fn source_class_name(source: &str) -> String {
    public_class(source).unwrap_or(FALLBACK_CLASS).to_string()
}

/// Class name the JVM will be asked to run
pub fn main_class_name(source: &str) -> String {
    if let Some(name) = public_class(source) {
        return name.to_string();
    }

    let classes: Vec<_> = ANY_CLASS
        .captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .collect();
    // last class opened before `main` is the one declaring it
    let enclosing = MAIN_METHOD.find(source).and_then(|main| {
        classes
            .iter()
            .take_while(|class| class.start() < main.start())
            .last()
    });

    enclosing
        .or_else(|| classes.first())
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| FALLBACK_CLASS.to_string())
}

#[derive(Debug, Clone)]
pub struct JavaAdapter {
    toolchain: ToolchainConfig,
}

impl JavaAdapter {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }
}

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn source_file_name(&self, source: &str) -> String {
        format!("{}.java", source_class_name(source))
    }

    fn build_commands(&self, workspace: &Path, source: &str) -> CommandPlan {
        let class_name = main_class_name(source);
        let source_path = workspace.join(self.source_file_name(source));
        let workspace_arg = workspace.display().to_string();

        let compile = resolve_step("Java compiler", &self.toolchain.compilers).map(|javac| {
            CommandSpec::new(javac)
                .args(self.toolchain.compile_flags.iter().cloned())
                .arg("-d")
                .arg(workspace_arg.clone())
                .arg(source_path.display().to_string())
                .current_dir(workspace)
                .env_remove("JAVA_TOOL_OPTIONS")
        });

        // JAVA_TOOL_OPTIONS makes the JVM print a banner to stderr
        let run = resolve_step("Java runtime", &self.toolchain.runtimes).map(|java| {
            CommandSpec::new(java)
                .arg("-cp")
                .arg(workspace_arg.clone())
                .arg(class_name.clone())
                .current_dir(workspace)
                .env_remove("JAVA_TOOL_OPTIONS")
        });

        CommandPlan {
            compile: Some(compile),
            run,
            artifact: Some(workspace.join(format!("{}.class", class_name))),
        }
    }

    fn probes(&self) -> Vec<ToolProbe> {
        vec![
            ToolProbe {
                name: first_name(&self.toolchain.compilers, "javac"),
                candidates: self.toolchain.compilers.clone(),
                version_arg: "-version",
            },
            ToolProbe {
                name: first_name(&self.toolchain.runtimes, "java"),
                candidates: self.toolchain.runtimes.clone(),
                version_arg: "-version",
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_from_public_class() {
        let source = r#"
import java.util.*;

public class Main {
    public static void main(String[] args) {}
}
"#;
        assert_eq!(main_class_name(source), "Main");
    }

    #[test]
    fn test_first_public_class_wins() {
        let source = "class Helper {}\npublic class Answer {}\npublic class Other {}";
        assert_eq!(main_class_name(source), "Answer");
    }

    #[test]
    fn test_fallback_without_public_class() {
        assert_eq!(source_class_name("class Main { }"), "Solution");
        // modifiers between public and class defeat the pattern
        assert_eq!(source_class_name("public final class Foo {}"), "Solution");
        assert_eq!(source_class_name(""), "Solution");
        assert_eq!(main_class_name(""), "Solution");
    }

    #[test]
    fn test_run_class_without_public_class() {
        let source = "class Main {\n    public static void main(String[] args) {}\n}\n";
        assert_eq!(main_class_name(source), "Main");

        let source = "class Helper { int twice(int x) { return 2 * x; } }\n\
                      class Entry { public static void main(String[] a) {} }";
        assert_eq!(main_class_name(source), "Entry");

        // no main anywhere: first declared class
        assert_eq!(main_class_name("class First {} class Second {}"), "First");
    }

    #[test]
    fn test_identifier_with_dollar_and_digits() {
        assert_eq!(main_class_name("public   class\tA1$b {}"), "A1$b");
    }

    #[test]
    fn test_file_name_matches_class() {
        let adapter = JavaAdapter::new(ToolchainConfig::default());
        assert_eq!(adapter.source_file_name("public class Foo {}"), "Foo.java");
        assert_eq!(adapter.source_file_name("class Foo {}"), "Solution.java");
    }

    #[test]
    fn test_commands() {
        let adapter = JavaAdapter::new(ToolchainConfig {
            compilers: vec!["/bin/sh".to_string()],
            runtimes: vec!["/bin/sh".to_string()],
            ..Default::default()
        });
        let ws = Path::new("/scratch/cg-4");
        let plan = adapter.build_commands(ws, "public class Foo {}");

        let compile = plan.compile.unwrap().unwrap();
        assert_eq!(compile.args, vec!["-d", "/scratch/cg-4", "/scratch/cg-4/Foo.java"]);
        assert_eq!(compile.env_remove, vec!["JAVA_TOOL_OPTIONS".to_string()]);

        let run = plan.run.unwrap();
        assert_eq!(run.args, vec!["-cp", "/scratch/cg-4", "Foo"]);
        assert_eq!(plan.artifact, Some(ws.join("Foo.class")));
    }

    #[test]
    fn test_package_private_main_class() {
        let adapter = JavaAdapter::new(ToolchainConfig {
            compilers: vec!["/bin/sh".to_string()],
            runtimes: vec!["/bin/sh".to_string()],
            ..Default::default()
        });
        let ws = Path::new("/scratch/cg-6");
        let source = "class Main { public static void main(String[] args) {} }";
        let plan = adapter.build_commands(ws, source);

        let compile = plan.compile.unwrap().unwrap();
        assert_eq!(compile.args.last().unwrap(), "/scratch/cg-6/Solution.java");
        assert_eq!(plan.run.unwrap().args, vec!["-cp", "/scratch/cg-6", "Main"]);
        assert_eq!(plan.artifact, Some(ws.join("Main.class")));
    }

    #[test]
    fn test_missing_runtime_only_fails_run_step() {
        let adapter = JavaAdapter::new(ToolchainConfig {
            compilers: vec!["/bin/sh".to_string()],
            runtimes: vec!["codegrade-no-java".to_string()],
            ..Default::default()
        });
        let plan = adapter.build_commands(Path::new("/scratch/cg-5"), "");

        assert!(plan.compile.unwrap().is_ok());
        assert_eq!(plan.run.unwrap_err().tool, "Java runtime");
    }
}
