// Engine configuration for codegrade
use anyhow::{bail, Context, Result};
use codegrade_common::types::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/engine.json";

/// Candidate executables and flags for one language
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler executables, first one found wins
    pub compilers: Vec<String>,
    /// Interpreter / VM executables, first one found wins
    pub runtimes: Vec<String>,
    pub compile_flags: Vec<String>,
    pub link_flags: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainsConfig {
    pub c: ToolchainConfig,
    pub cpp: ToolchainConfig,
    pub java: ToolchainConfig,
    pub python: ToolchainConfig,
}

impl Default for ToolchainsConfig {
    fn default() -> Self {
        Self {
            c: ToolchainConfig {
                compilers: strings(&["gcc", "cc", "clang"]),
                compile_flags: strings(&["-O2", "-std=c11"]),
                link_flags: strings(&["-lm"]),
                ..Default::default()
            },
            cpp: ToolchainConfig {
                compilers: strings(&["g++", "c++", "clang++"]),
                compile_flags: strings(&["-O2", "-std=c++17"]),
                ..Default::default()
            },
            java: ToolchainConfig {
                compilers: strings(&["javac"]),
                runtimes: strings(&["java"]),
                compile_flags: strings(&["-encoding", "UTF-8"]),
                ..Default::default()
            },
            python: ToolchainConfig {
                runtimes: strings(&["python3", "python"]),
                ..Default::default()
            },
        }
    }
}

impl ToolchainsConfig {
    pub fn for_language(&self, language: Language) -> &ToolchainConfig {
        match language {
            Language::C => &self.c,
            Language::Cpp => &self.cpp,
            Language::Java => &self.java,
            Language::Python => &self.python,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_concurrent_executions: usize,
    /// How long a request may wait for a free slot before it is rejected
    pub queue_wait_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            max_concurrent_executions: parallelism,
            queue_wait_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub max_age_secs: u64,
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 3600,
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Points granted for a submission that compiles cleanly. Counted into
    /// the suite total whenever non-zero.
    pub compile_bonus_points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scratch_root: PathBuf,
    pub compile_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub max_time_limit_ms: u64,
    pub max_source_bytes: usize,
    pub max_stdin_bytes: usize,
    pub max_output_bytes: usize,
    pub pool: PoolConfig,
    pub reaper: ReaperConfig,
    pub scoring: ScoringConfig,
    pub toolchains: ToolchainsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("codegrade"),
            compile_timeout_ms: 10_000,
            probe_timeout_ms: 5_000,
            max_time_limit_ms: 60_000,
            max_source_bytes: 1024 * 1024,
            max_stdin_bytes: 10 * 1024 * 1024,
            max_output_bytes: 8 * 1024 * 1024,
            pool: PoolConfig::default(),
            reaper: ReaperConfig::default(),
            scoring: ScoringConfig::default(),
            toolchains: ToolchainsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    /// Resolve configuration the way the binaries do: explicit path, then
    /// `CODEGRADE_CONFIG`, then `config/engine.json` if present, then
    /// defaults. Environment overrides are applied last.
    pub fn from_env(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("CODEGRADE_CONFIG").ok().map(PathBuf::from);
        let default_path = Path::new(DEFAULT_CONFIG_PATH);

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load(&path)?,
            None if default_path.exists() => Self::load(default_path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CODEGRADE_*` overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("CODEGRADE_SCRATCH_ROOT") {
            self.scratch_root = PathBuf::from(root);
        }
        if let Some(max) = lookup("CODEGRADE_MAX_CONCURRENT") {
            self.pool.max_concurrent_executions = max
                .parse()
                .with_context(|| format!("CODEGRADE_MAX_CONCURRENT is not a number: {}", max))?;
        }
        if let Some(wait) = lookup("CODEGRADE_QUEUE_WAIT_MS") {
            self.pool.queue_wait_ms = wait
                .parse()
                .with_context(|| format!("CODEGRADE_QUEUE_WAIT_MS is not a number: {}", wait))?;
        }
        if let Some(timeout) = lookup("CODEGRADE_COMPILE_TIMEOUT_MS") {
            self.compile_timeout_ms = timeout
                .parse()
                .with_context(|| format!("CODEGRADE_COMPILE_TIMEOUT_MS is not a number: {}", timeout))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.max_concurrent_executions == 0 {
            bail!("pool.max_concurrent_executions must be at least 1");
        }
        if self.compile_timeout_ms == 0 || self.probe_timeout_ms == 0 || self.max_time_limit_ms == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.max_output_bytes == 0 {
            bail!("max_output_bytes must be greater than zero");
        }
        for language in Language::ALL {
            let toolchain = self.toolchains.for_language(language);
            if language.is_compiled() && toolchain.compilers.is_empty() {
                bail!("no compiler candidates configured for {}", language);
            }
            let needs_runtime = matches!(language, Language::Java | Language::Python);
            if needs_runtime && toolchain.runtimes.is_empty() {
                bail!("no runtime candidates configured for {}", language);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scoring.compile_bonus_points, 0);
        assert_eq!(config.toolchains.python.runtimes[0], "python3");
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(
            &path,
            r#"{"compile_timeout_ms": 2500, "pool": {"max_concurrent_executions": 2}, "toolchains": {"python": {"runtimes": ["pypy3"]}}}"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.compile_timeout_ms, 2500);
        assert_eq!(config.pool.max_concurrent_executions, 2);
        assert_eq!(config.pool.queue_wait_ms, 30_000);
        assert_eq!(config.toolchains.python.runtimes, vec!["pypy3".to_string()]);
        // untouched languages keep their defaults
        assert_eq!(config.toolchains.c.compilers[0], "gcc");
    }

    #[test]
    fn test_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/engine.example.json");
        let config = EngineConfig::load(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pool.max_concurrent_executions, 8);
        assert_eq!(config.toolchains, ToolchainsConfig::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = EngineConfig::load(Path::new("/nonexistent/codegrade/engine.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CODEGRADE_SCRATCH_ROOT", "/srv/scratch"),
            ("CODEGRADE_MAX_CONCURRENT", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.scratch_root, PathBuf::from("/srv/scratch"));
        assert_eq!(config.pool.max_concurrent_executions, 3);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = EngineConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "CODEGRADE_MAX_CONCURRENT").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_empty_pool_and_toolchains() {
        let mut config = EngineConfig::default();
        config.pool.max_concurrent_executions = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.toolchains.java.runtimes.clear();
        assert!(config.validate().is_err());
    }
}
