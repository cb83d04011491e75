//! Environment probe: which toolchains answer a version query

use crate::config::ToolchainsConfig;
use crate::languages::{adapter_for, resolve_executable, ToolProbe};
use crate::runner::{CommandSpec, ProcessRunner};
use codegrade_common::types::Language;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Run every language's version queries concurrently.
///
/// Keys are the tool names (`gcc`, `javac`, ...). A tool counts as available
/// only if it resolves and exits 0 within `timeout`.
pub async fn check_environment(
    toolchains: &ToolchainsConfig,
    runner: &ProcessRunner,
    timeout: Duration,
) -> BTreeMap<String, bool> {
    let probes: Vec<ToolProbe> = Language::ALL
        .iter()
        .flat_map(|&language| adapter_for(language, toolchains).probes())
        .collect();

    let checks = probes.iter().map(|probe| async move {
        (probe.name.clone(), probe_tool(probe, runner, timeout).await)
    });
    let report: BTreeMap<String, bool> = join_all(checks).await.into_iter().collect();

    let available = report.values().filter(|ok| **ok).count();
    info!(available, total = report.len(), "Environment probe finished");
    report
}

async fn probe_tool(probe: &ToolProbe, runner: &ProcessRunner, timeout: Duration) -> bool {
    let Some(program) = resolve_executable(&probe.candidates) else {
        debug!(tool = %probe.name, "Not found on PATH");
        return false;
    };

    let command = CommandSpec::new(program).arg(probe.version_arg);
    match runner.run(&command, "", timeout).await {
        Ok(output) => {
            debug!(tool = %probe.name, exit_code = ?output.exit_code, timed_out = output.timed_out, "Version query finished");
            output.success()
        }
        Err(e) => {
            debug!(tool = %probe.name, error = %e, "Version query failed");
            false
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ToolchainConfig;

    fn toolchain(compilers: &[&str], runtimes: &[&str]) -> ToolchainConfig {
        ToolchainConfig {
            compilers: compilers.iter().map(|s| s.to_string()).collect(),
            runtimes: runtimes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reports_every_tool() {
        // `true` ignores its argument and exits 0, `false` exits 1
        let toolchains = ToolchainsConfig {
            c: toolchain(&["true"], &[]),
            cpp: toolchain(&["false"], &[]),
            java: toolchain(&["codegrade-no-javac"], &["codegrade-no-java"]),
            python: toolchain(&[], &["true"]),
        };
        let report =
            check_environment(&toolchains, &ProcessRunner::new(1024), Duration::from_secs(5)).await;

        assert_eq!(report.len(), 4);
        assert_eq!(report.get("codegrade-no-javac"), Some(&false));
        assert_eq!(report.get("codegrade-no-java"), Some(&false));
        assert_eq!(report.get("false"), Some(&false));
        assert_eq!(report.get("true"), Some(&true));
    }

    #[tokio::test]
    async fn test_slow_tool_counts_as_missing() {
        let probe = ToolProbe {
            name: "sleep".to_string(),
            candidates: vec!["sleep".to_string()],
            version_arg: "5",
        };
        let ok = probe_tool(&probe, &ProcessRunner::new(1024), Duration::from_millis(100)).await;
        assert!(!ok);
    }
}
