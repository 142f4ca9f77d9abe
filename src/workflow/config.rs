// SPDX-License-Identifier: MIT

//! Runner configuration
//!
//! Loaded from YAML or from the environment:
//!
//! ```yaml
//! mode: sequential
//! max_concurrency: 4
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::FlowError;

pub const MODE_ENV: &str = "JOBFLOW_EXECUTION_MODE";
pub const MAX_CONCURRENCY_ENV: &str = "JOBFLOW_MAX_CONCURRENCY";

/// How the jobs of one level are dispatched
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// All jobs of a level run concurrently
    #[default]
    Parallel,
    /// Jobs of a level run one after another, in level order
    Sequential,
}

impl FromStr for ExecutionMode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallel" => Ok(ExecutionMode::Parallel),
            "sequential" => Ok(ExecutionMode::Sequential),
            other => Err(FlowError::config(format!(
                "unknown execution mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Parallel => write!(f, "parallel"),
            ExecutionMode::Sequential => write!(f, "sequential"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RunnerConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Upper bound on concurrently running jobs in parallel mode
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl RunnerConfig {
    pub fn parallel() -> Self {
        Self::default()
    }

    pub fn sequential() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            ..Self::default()
        }
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn from_yaml(content: &str) -> Result<Self, FlowError> {
        let config: RunnerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FlowError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Read `JOBFLOW_EXECUTION_MODE` and `JOBFLOW_MAX_CONCURRENCY`; unset keys keep defaults
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(mode) = lookup(MODE_ENV) {
            config.mode = mode.parse()?;
        }
        if let Some(limit) = lookup(MAX_CONCURRENCY_ENV) {
            let limit = limit.trim().parse::<usize>().map_err(|_| {
                FlowError::config(format!(
                    "{} must be a positive integer, got '{}'",
                    MAX_CONCURRENCY_ENV, limit
                ))
            })?;
            config.max_concurrency = Some(limit);
        }
        config.validate()?;
        log::debug!("Runner config from environment: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if self.max_concurrency == Some(0) {
            return Err(FlowError::config("max_concurrency must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "Sequential".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::Sequential
        );
        assert_eq!(
            "PARALLEL".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::Parallel
        );
        assert!(matches!(
            "batch".parse::<ExecutionMode>(),
            Err(FlowError::Config(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.mode, ExecutionMode::Parallel);
        assert_eq!(config.max_concurrency, None);
        assert_eq!(RunnerConfig::parallel(), config);
    }

    #[test]
    fn test_from_yaml() {
        let config = RunnerConfig::from_yaml("mode: sequential\nmax_concurrency: 3\n").unwrap();
        assert_eq!(config, RunnerConfig::sequential().with_max_concurrency(3));

        let config = RunnerConfig::from_yaml("max_concurrency: 2").unwrap();
        assert_eq!(config.mode, ExecutionMode::Parallel);

        assert!(matches!(
            RunnerConfig::from_yaml("max_concurrency: 0"),
            Err(FlowError::Config(_))
        ));
        assert!(matches!(
            RunnerConfig::from_yaml("mode: sideways"),
            Err(FlowError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: sequential").unwrap();

        let config = RunnerConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, ExecutionMode::Sequential);

        assert!(matches!(
            RunnerConfig::load("/nonexistent/jobflow.yaml"),
            Err(FlowError::Io(_))
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(MODE_ENV, "sequential"), (MAX_CONCURRENCY_ENV, " 8 ")]);
        let config = RunnerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config, RunnerConfig::sequential().with_max_concurrency(8));

        let config = RunnerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, RunnerConfig::default());

        let bad = RunnerConfig::from_lookup(|k| (k == MAX_CONCURRENCY_ENV).then(|| "lots".to_string()));
        assert!(matches!(bad, Err(FlowError::Config(_))));

        let zero = RunnerConfig::from_lookup(|k| (k == MAX_CONCURRENCY_ENV).then(|| "0".to_string()));
        assert!(matches!(zero, Err(FlowError::Config(_))));
    }
}
