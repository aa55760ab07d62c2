//! Compute backend selection
//!
//! Vendor runtimes with a fixed device report it directly. Runtimes that
//! accelerate through a delegate plugin run on CPU unless a plugin is found
//! and loads; a plugin that is found but fails to load is not an error, the
//! case runs on CPU and the reason is recorded.

use crate::config::DelegateConfig;
use crate::engine::Runtime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Compute resource an inference ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Neural accelerator
    #[serde(rename = "npu")]
    Accelerator,
    /// Host CPU
    #[serde(rename = "cpu")]
    Cpu,
}

impl Backend {
    /// Report label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accelerator => "npu",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locates a delegate plugin on disk
///
/// Fixed candidate paths are checked in order; if none exists the search
/// root is walked recursively (sorted by file name, so the result is
/// stable) for the first entry with a matching file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateResolver {
    file_name: String,
    search_paths: Vec<PathBuf>,
    search_root: Option<PathBuf>,
}

impl DelegateResolver {
    /// Create a resolver for a plugin file name with no candidates
    #[must_use]
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            search_paths: Vec::new(),
            search_root: None,
        }
    }

    /// Build from delegate configuration; `None` when delegates are disabled
    #[must_use]
    pub fn from_config(config: &DelegateConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            file_name: config.file_name.clone(),
            search_paths: config.search_paths.clone(),
            search_root: config.search_root.clone(),
        })
    }

    /// Set the fixed candidate paths
    #[must_use]
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Set the recursive search root
    #[must_use]
    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    /// Find the plugin
    #[must_use]
    pub fn resolve(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|p| p.exists())
            .cloned()
            .or_else(|| self.search_tree())
    }

    fn search_tree(&self) -> Option<PathBuf> {
        let root = self.search_root.as_deref()?;
        debug!(root = %root.display(), file = %self.file_name, "searching for delegate");
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| !entry.file_type().is_dir())
            .find(|entry| entry.file_name() == self.file_name.as_str() && entry.path().exists())
            .map(walkdir::DirEntry::into_path)
    }
}

/// What happened to the delegate plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DelegateOutcome {
    /// Runtime has a fixed backend and takes no delegate
    Native,
    /// Delegate search is disabled
    Disabled,
    /// No plugin found
    NotFound,
    /// Plugin loaded
    Loaded {
        /// Plugin path
        path: PathBuf,
    },
    /// Plugin found but could not be loaded
    Failed {
        /// Plugin path
        path: PathBuf,
        /// Load error
        reason: String,
    },
}

/// Backend chosen for one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSelection {
    /// Backend inference will run on
    pub backend: Backend,
    /// Delegate resolution result
    pub delegate: DelegateOutcome,
}

impl BackendSelection {
    /// Plugin path, when one was found
    #[must_use]
    pub fn delegate_path(&self) -> Option<&Path> {
        match &self.delegate {
            DelegateOutcome::Loaded { path } | DelegateOutcome::Failed { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Why the accelerator path was abandoned, when a plugin failed to load
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.delegate {
            DelegateOutcome::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Backend selection plus the delegate to bind to the engine
#[derive(Debug)]
pub struct Resolution<D> {
    /// Selection to record in the verdict
    pub selection: BackendSelection,
    /// Loaded delegate, if any
    pub delegate: Option<D>,
}

/// Decide the backend for the next engine handle
#[must_use]
pub fn resolve_backend<R: Runtime>(
    runtime: &R,
    resolver: Option<&DelegateResolver>,
) -> Resolution<R::Delegate> {
    if let Some(backend) = runtime.native_backend() {
        return Resolution {
            selection: BackendSelection {
                backend,
                delegate: DelegateOutcome::Native,
            },
            delegate: None,
        };
    }

    let cpu = |delegate| Resolution {
        selection: BackendSelection {
            backend: Backend::Cpu,
            delegate,
        },
        delegate: None,
    };

    let Some(resolver) = resolver else {
        return cpu(DelegateOutcome::Disabled);
    };
    let Some(path) = resolver.resolve() else {
        info!(runtime = runtime.name(), "no delegate found, running on CPU");
        return cpu(DelegateOutcome::NotFound);
    };

    match runtime.load_delegate(&path) {
        Ok(delegate) => {
            info!(path = %path.display(), "delegate loaded");
            Resolution {
                selection: BackendSelection {
                    backend: Backend::Accelerator,
                    delegate: DelegateOutcome::Loaded { path },
                },
                delegate: Some(delegate),
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "delegate failed to load, falling back to CPU");
            cpu(DelegateOutcome::Failed {
                path,
                reason: e.to_string(),
            })
        }
    }
}
