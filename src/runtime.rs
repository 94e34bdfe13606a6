//! Process-wide runtime configuration.
//!
//! A [`Runtime`] is created once at process start and handed to every
//! context explicitly; there are no ambient globals. It owns the storage
//! engine shared by its contexts, the asset search paths, and the debug
//! level that callers feed to their `tracing` subscriber.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::engine::{JsonEngine, StorageEngine};
use crate::util::{Time, DEFAULT_TIME};

/// Verbosity of the interchange layer's diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum DebugLevel {
    Off,
    Error,
    #[default]
    Warning,
    Info,
    Verbose,
}

impl DebugLevel {
    /// The `tracing` filter directive for this level.
    pub fn tracing_filter(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Verbose => "trace",
        }
    }
}

/// Settings fixed for the life of a [`Runtime`].
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    pub debug_level: DebugLevel,
    /// Directories consulted when resolving relative asset paths.
    pub search_paths: Vec<PathBuf>,
}

/// Shared entry point: engine plus process configuration.
pub struct Runtime {
    config: RuntimeConfig,
    engine: Arc<dyn StorageEngine>,
}

impl Runtime {
    /// Runtime over the shipped JSON reference engine.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_engine(config, Arc::new(JsonEngine::new()))
    }

    /// Runtime over a caller-supplied storage engine.
    pub fn with_engine(config: RuntimeConfig, engine: Arc<dyn StorageEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// A fresh, unbound context over this runtime's engine.
    pub fn create_context(&self) -> Context {
        Context::with_engine(self.engine.clone())
    }

    /// Sentinel time for "static" reads of unanimated data.
    pub fn default_time(&self) -> Time {
        DEFAULT_TIME
    }

    /// Resolve an asset path against the configured search paths.
    /// Absolute paths and paths that exist as given pass through; the
    /// first search path containing the asset wins; otherwise the input
    /// is returned untouched.
    pub fn resolve_path(&self, asset: &str) -> PathBuf {
        let direct = Path::new(asset);
        if direct.is_absolute() || direct.exists() {
            return direct.to_path_buf();
        }
        for dir in &self.config.search_paths {
            let candidate = dir.join(asset);
            if candidate.exists() {
                debug!(asset, path = %candidate.display(), "resolved asset via search path");
                return candidate;
            }
        }
        direct.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_level_filters() {
        assert_eq!(DebugLevel::Off.tracing_filter(), "off");
        assert_eq!(DebugLevel::default().tracing_filter(), "warn");
        assert_eq!(DebugLevel::Verbose.tracing_filter(), "trace");
        assert!(DebugLevel::Verbose > DebugLevel::Info);
    }

    #[test]
    fn test_resolve_path_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("props.json"), b"{}").unwrap();

        let rt = Runtime::new(RuntimeConfig {
            search_paths: vec![dir.path().to_path_buf()],
            ..Default::default()
        });
        assert_eq!(rt.resolve_path("props.json"), dir.path().join("props.json"));
        // Misses pass through unchanged.
        assert_eq!(rt.resolve_path("absent.json"), PathBuf::from("absent.json"));
    }

    #[test]
    fn test_create_context_unbound() {
        let rt = Runtime::new(RuntimeConfig::default());
        let ctx = rt.create_context();
        assert!(ctx.root().is_none());
        assert_eq!(rt.default_time(), 0.0);
    }
}
