//! Bridge configuration
//!
//! Options are read from TOML; every key is optional:
//!
//! ```toml
//! unload_retry_budget = 10
//! gc_threshold_bytes = 1048576
//! trace_invocations = false
//! log_filter = "info"
//! ```

use hive_runtime::gc::DEFAULT_GC_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Collection rounds attempted before an unload is reported incomplete
pub const DEFAULT_UNLOAD_RETRY_BUDGET: u32 = 10;

/// Runtime options of a [`Bridge`](crate::Bridge)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeOptions {
    /// Collect-and-finalize rounds an unload may run
    pub unload_retry_budget: u32,

    /// Heap size that triggers a collection at the next call boundary
    pub gc_threshold_bytes: usize,

    /// Log every invocation at trace level
    pub trace_invocations: bool,

    /// `tracing_subscriber::EnvFilter` directives for the boundary logger
    pub log_filter: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            unload_retry_budget: DEFAULT_UNLOAD_RETRY_BUDGET,
            gc_threshold_bytes: DEFAULT_GC_THRESHOLD,
            trace_invocations: false,
            log_filter: "info".to_string(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid bridge config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl BridgeOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_unload_retry_budget(mut self, budget: u32) -> Self {
        self.unload_retry_budget = budget;
        self
    }

    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold_bytes = bytes;
        self
    }

    pub fn with_trace_invocations(mut self, enabled: bool) -> Self {
        self.trace_invocations = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::from_toml_str("").unwrap();
        assert_eq!(options, BridgeOptions::default());
        assert_eq!(options.unload_retry_budget, 10);
        assert_eq!(options.gc_threshold_bytes, 1024 * 1024);
    }

    #[test]
    fn test_partial_override() {
        let options = BridgeOptions::from_toml_str("unload_retry_budget = 3\nlog_filter = \"debug\"").unwrap();
        assert_eq!(options.unload_retry_budget, 3);
        assert_eq!(options.log_filter, "debug");
        assert!(!options.trace_invocations);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            BridgeOptions::from_toml_str("retry = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "trace_invocations = true").unwrap();
        let options = BridgeOptions::from_file(file.path()).unwrap();
        assert!(options.trace_invocations);

        let missing = BridgeOptions::from_file(Path::new("/nonexistent/hive.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
