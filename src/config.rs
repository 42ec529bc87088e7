//! Worker configuration
//!
//! Read once from the environment at startup and passed to the executor
//! explicitly. Nothing here changes after construction.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Default search path handed to child processes
pub const DEFAULT_EXEC_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Grader configuration
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Redis URL for the job queue and submission records
    pub redis_url: String,
    /// Optional TOML file replacing the built-in toolchain table
    pub languages_config: Option<PathBuf>,
    /// Directory holding `<question_id>.json` files
    pub questions_dir: PathBuf,
    /// Parent directory for scratch workspaces
    pub workspace_root: PathBuf,
    /// Deadline for each run step (default: 5000ms)
    pub exec_timeout_ms: u64,
    /// Deadline for each build step (default: 30000ms)
    pub build_timeout_ms: u64,
    /// Cap on captured stdout/stderr per stream
    pub max_output_bytes: usize,
    /// RLIMIT_FSIZE for child processes
    pub max_file_size_bytes: u64,
    /// Number of test cases graded at once (1 = sequential)
    pub test_concurrency: usize,
    /// PATH value given to child processes
    pub exec_path: String,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".into(),
            languages_config: None,
            questions_dir: PathBuf::from("./questions"),
            workspace_root: std::env::temp_dir(),
            exec_timeout_ms: 5_000,
            build_timeout_ms: 30_000,
            max_output_bytes: 1024 * 1024,
            max_file_size_bytes: 64 * 1024 * 1024,
            test_concurrency: 1,
            exec_path: DEFAULT_EXEC_PATH.into(),
        }
    }
}

impl GraderConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let parse = |key: &str, default: u64| -> anyhow::Result<u64> {
            parse_var(&lookup, key, default)
        };

        let test_concurrency = parse("TEST_CONCURRENCY", defaults.test_concurrency as u64)?;
        if test_concurrency == 0 {
            anyhow::bail!("TEST_CONCURRENCY must be at least 1");
        }
        let exec_timeout_ms = parse("EXEC_TIMEOUT_MS", defaults.exec_timeout_ms)?;
        if exec_timeout_ms == 0 {
            anyhow::bail!("EXEC_TIMEOUT_MS must be positive");
        }

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            languages_config: lookup("LANGUAGES_CONFIG").map(PathBuf::from),
            questions_dir: lookup("QUESTIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.questions_dir),
            workspace_root: lookup("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            exec_timeout_ms,
            build_timeout_ms: parse("BUILD_TIMEOUT_MS", defaults.build_timeout_ms)?,
            max_output_bytes: parse("MAX_OUTPUT_BYTES", defaults.max_output_bytes as u64)?
                as usize,
            max_file_size_bytes: parse("MAX_FILE_SIZE_BYTES", defaults.max_file_size_bytes)?,
            test_concurrency: test_concurrency as usize,
            exec_path: lookup("EXEC_PATH").unwrap_or(defaults.exec_path),
        })
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GraderConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.exec_timeout(), Duration::from_secs(5));
        assert_eq!(config.build_timeout(), Duration::from_secs(30));
        assert_eq!(config.test_concurrency, 1);
        assert_eq!(config.exec_path, DEFAULT_EXEC_PATH);
        assert!(config.languages_config.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = GraderConfig::from_lookup(lookup_from(&[
            ("EXEC_TIMEOUT_MS", "250"),
            ("TEST_CONCURRENCY", "4"),
            ("LANGUAGES_CONFIG", "/etc/grader/languages.toml"),
            ("QUESTIONS_DIR", "/srv/questions"),
        ]))
        .unwrap();

        assert_eq!(config.exec_timeout(), Duration::from_millis(250));
        assert_eq!(config.test_concurrency, 4);
        assert_eq!(
            config.languages_config,
            Some(PathBuf::from("/etc/grader/languages.toml"))
        );
        assert_eq!(config.questions_dir, PathBuf::from("/srv/questions"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(GraderConfig::from_lookup(lookup_from(&[("EXEC_TIMEOUT_MS", "soon")])).is_err());
        assert!(GraderConfig::from_lookup(lookup_from(&[("EXEC_TIMEOUT_MS", "0")])).is_err());
        assert!(GraderConfig::from_lookup(lookup_from(&[("TEST_CONCURRENCY", "0")])).is_err());
    }
}
