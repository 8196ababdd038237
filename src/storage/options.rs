use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cursor::{LockService, NoLockService};
use crate::types::{PenumbraError, Result};

use super::metrics::{default_metrics, ViewMetrics};

/// Default number of pooled cursor buffer sets.
pub const DEFAULT_CURSOR_POOL_SIZE: usize = 16;

/// Configuration options supplied when opening a [`crate::graph::Graph`].
#[derive(Clone)]
pub struct GraphOptions {
    /// Whether commits re-validate the transaction diff before applying it.
    pub validate_diffs: bool,
    /// Maximum number of released cursor buffer sets kept for reuse.
    pub cursor_pool_size: usize,
    /// Metrics collection implementation.
    pub metrics: Arc<dyn ViewMetrics>,
    /// Lock service handed to node views.
    pub lock_service: Arc<dyn LockService>,
}

impl GraphOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self {
            validate_diffs: true,
            cursor_pool_size: DEFAULT_CURSOR_POOL_SIZE,
            metrics: default_metrics(),
            lock_service: Arc::new(NoLockService),
        }
    }

    /// Enables or disables diff validation at commit.
    pub fn validate_diffs(mut self, enabled: bool) -> Self {
        self.validate_diffs = enabled;
        self
    }

    /// Sets the cursor pool capacity.
    pub fn cursor_pool_size(mut self, size: usize) -> Self {
        self.cursor_pool_size = size;
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn ViewMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the lock service.
    pub fn lock_service(mut self, locks: Arc<dyn LockService>) -> Self {
        self.lock_service = locks;
        self
    }

    /// Parses the serializable subset of the options from TOML.
    ///
    /// ```toml
    /// [graph]
    /// validate_diffs = true
    /// cursor_pool_size = 32
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawOptions = toml::from_str(contents)
            .map_err(|err| PenumbraError::Config(format!("failed to parse options: {err}")))?;
        Ok(raw.graph.apply(Self::new()))
    }

    /// Loads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            PenumbraError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Renders the serializable subset of the options as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        let raw = RawOptions {
            graph: GraphSection {
                validate_diffs: Some(self.validate_diffs),
                cursor_pool_size: Some(self.cursor_pool_size),
            },
        };
        toml::to_string_pretty(&raw)
            .map_err(|err| PenumbraError::Config(format!("failed to serialize options: {err}")))
    }
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawOptions {
    #[serde(default)]
    graph: GraphSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct GraphSection {
    validate_diffs: Option<bool>,
    cursor_pool_size: Option<usize>,
}

impl GraphSection {
    fn apply(self, mut opts: GraphOptions) -> GraphOptions {
        if let Some(validate) = self.validate_diffs {
            opts.validate_diffs = validate;
        }
        if let Some(size) = self.cursor_pool_size {
            opts.cursor_pool_size = size;
        }
        opts
    }
}
