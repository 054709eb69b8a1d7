//! The handler registry.
//!
//! [`HandlerRegistry`] owns every [`HandlerDescriptor`] in a stable,
//! insertion-ordered list, plus the separate [`CommonHandlers`] table. The
//! dispatcher scans the list front to back, so registration order is the only
//! tie-break between overlapping patterns.
//!
//! Descriptors come from two places:
//!
//! - programmatic [`register`](HandlerRegistry::register) calls (the
//!   meta-command, tests, embedding applications);
//! - a manifest directory, enumerated in lexical file-name order by
//!   [`load`](HandlerRegistry::load).
//!
//! A malformed manifest never aborts a load: it is logged at `warn`, recorded
//! in the [`LoadReport`] and skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::Figment;
use figment::providers::{Format, Toml};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::common::CommonHandlers;
use crate::descriptor::{HandlerDescriptor, HandlerSource, Origin};
use crate::error::{LoadError, LoadResult};
use crate::handler::HandlerCatalog;

/// File extension of handler manifests.
pub const MANIFEST_EXTENSION: &str = "toml";

/// The registry as shared between the runtime and the dispatcher.
pub type SharedRegistry = Arc<RwLock<HandlerRegistry>>;

/// A source that was skipped during a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    /// File path or in-memory name of the source.
    pub source: String,
    /// Why it was rejected.
    pub error: LoadError,
}

/// Outcome of a [`load`](HandlerRegistry::load).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Names of the descriptors that were registered, in order.
    pub loaded: Vec<String>,
    /// Sources that were rejected.
    pub skipped: Vec<SkippedSource>,
}

impl LoadReport {
    fn skip(&mut self, source: impl Into<String>, error: LoadError) {
        let source = source.into();
        warn!(source = %source, error = %error, "Skipping handler source");
        self.skipped.push(SkippedSource { source, error });
    }
}

/// Ordered descriptor list plus the common lifecycle handlers.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    descriptors: Vec<Arc<HandlerDescriptor>>,
    common: CommonHandlers,
}

impl HandlerRegistry {
    /// Creates an empty registry with no common handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with the given common handlers.
    pub fn with_common(common: CommonHandlers) -> Self {
        Self {
            descriptors: Vec::new(),
            common,
        }
    }

    /// Wraps the registry for sharing with a dispatcher.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn common(&self) -> &CommonHandlers {
        &self.common
    }

    pub fn common_mut(&mut self) -> &mut CommonHandlers {
        &mut self.common
    }

    /// Appends a descriptor. Names are unique.
    pub fn register(&mut self, descriptor: HandlerDescriptor) -> LoadResult<()> {
        if self.get(descriptor.name()).is_some() {
            return Err(LoadError::Duplicate(descriptor.name().to_string()));
        }
        debug!(
            handler = descriptor.name(),
            event = %descriptor.event(),
            pattern = descriptor.pattern_str(),
            "Registered handler"
        );
        self.descriptors.push(Arc::new(descriptor));
        Ok(())
    }

    /// Removes the descriptor named `name`. Absent names are a no-op.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<HandlerDescriptor>> {
        let index = self.descriptors.iter().position(|d| d.name() == name)?;
        debug!(handler = name, "Unregistered handler");
        Some(self.descriptors.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<HandlerDescriptor>> {
        self.descriptors.iter()
    }

    /// Descriptor names in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name()).collect()
    }

    /// A cheap copy of the ordered list, taken so handlers run without the
    /// registry lock held.
    pub fn snapshot(&self) -> Vec<Arc<HandlerDescriptor>> {
        self.descriptors.clone()
    }

    /// Loads every manifest in `dir`, in lexical file-name order.
    ///
    /// An unreadable directory is an error; problems with individual files
    /// are reported in the returned [`LoadReport`].
    pub fn load(&mut self, dir: &Path, catalog: &HandlerCatalog) -> LoadResult<LoadReport> {
        let mut paths = manifest_paths(dir)?;
        paths.sort();

        let mut report = LoadReport::default();
        for path in paths {
            let display = path.display().to_string();
            let fallback = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("handler")
                .to_string();

            let source = match read_manifest(&path) {
                Ok(source) => source,
                Err(e) => {
                    report.skip(display, e);
                    continue;
                }
            };

            match source
                .into_descriptor(&fallback, Origin::Manifest(path.clone()), catalog)
                .and_then(|d| {
                    let name = d.name().to_string();
                    self.register(d).map(|()| name)
                }) {
                Ok(name) => report.loaded.push(name),
                Err(e) => report.skip(display, e),
            }
        }

        info!(
            dir = %dir.display(),
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "Loaded handler manifests"
        );
        Ok(report)
    }

    /// Validates and registers in-memory manifests, in the order given.
    ///
    /// Each item pairs a fallback name with its manifest.
    pub fn load_sources<I, S>(&mut self, sources: I, catalog: &HandlerCatalog) -> LoadReport
    where
        I: IntoIterator<Item = (S, HandlerSource)>,
        S: Into<String>,
    {
        let mut report = LoadReport::default();
        for (name, source) in sources {
            let name = name.into();
            match source
                .into_descriptor(&name, Origin::Builtin, catalog)
                .and_then(|d| {
                    let registered = d.name().to_string();
                    self.register(d).map(|()| registered)
                }) {
                Ok(registered) => report.loaded.push(registered),
                Err(e) => report.skip(name, e),
            }
        }
        report
    }

    /// Drops every manifest-loaded descriptor and loads `dir` again.
    ///
    /// Programmatically registered descriptors stay, in their relative order,
    /// ahead of the reloaded ones.
    pub fn reload(&mut self, dir: &Path, catalog: &HandlerCatalog) -> LoadResult<LoadReport> {
        // A missing directory leaves the registry untouched.
        manifest_paths(dir)?;

        let before = self.descriptors.len();
        self.descriptors
            .retain(|d| matches!(d.origin(), Origin::Builtin));
        debug!(dropped = before - self.descriptors.len(), "Dropped manifest handlers");

        self.load(dir, catalog)
    }
}

fn manifest_paths(dir: &Path) -> LoadResult<Vec<PathBuf>> {
    let read_err = |e: std::io::Error| LoadError::Read {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == MANIFEST_EXTENSION) {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn read_manifest(path: &Path) -> LoadResult<HandlerSource> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Figment::from(Toml::string(&text))
        .extract()
        .map_err(|e| LoadError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}
