//! Module exports, evaluation and the host global namespace

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::{LoadSource, LoadedModule};

/// The exported surface of a loaded module.
pub trait ModuleExports: Send + Sync + fmt::Debug {
    /// Whether the module exports a callable named `name`.
    fn has_function(&self, name: &str) -> bool;

    /// Concrete module object, for callers that know its type.
    fn as_any(&self) -> &dyn Any;
}

/// Turns module source text into exports.
///
/// Provided by the embedder (a script engine, a plugin host, ...).
pub trait ModuleEvaluator: Send + Sync + fmt::Debug {
    /// Evaluate `source`, which was read or fetched from `origin`.
    fn evaluate(&self, source: &str, origin: &str) -> anyhow::Result<Arc<dyn ModuleExports>>;
}

/// Well-known global slots shared by every loader in a process.
///
/// The embedder injects modules it already has; loaders publish what they
/// install so later loaders can reuse it.
#[derive(Debug, Default)]
pub struct HostGlobals {
    injected: DashMap<String, Arc<dyn ModuleExports>>,
    loaded: DashMap<String, LoadedModule>,
}

impl HostGlobals {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate slot `name` with exports supplied by the host.
    pub fn inject(&self, name: &str, exports: Arc<dyn ModuleExports>) {
        self.injected.insert(name.to_string(), exports);
    }

    /// Host-supplied exports in slot `name`.
    pub fn injected(&self, name: &str) -> Option<Arc<dyn ModuleExports>> {
        self.injected.get(name).map(|entry| entry.value().clone())
    }

    /// Mark exports bundled with the host as already loaded.
    pub fn mark_loaded(&self, name: &str, exports: Arc<dyn ModuleExports>, location: &str) {
        self.publish(
            name,
            LoadedModule::new(exports, LoadSource::AlreadyLoaded, location),
        );
    }

    /// Forget the loaded module in slot `name`.
    pub fn unload(&self, name: &str) -> Option<LoadedModule> {
        self.loaded.remove(name).map(|(_, module)| module)
    }

    /// Record an installed module under `name` and return the module now in
    /// the slot. The first module wins.
    pub fn publish(&self, name: &str, module: LoadedModule) -> LoadedModule {
        self.loaded.entry(name.to_string()).or_insert(module).value().clone()
    }

    /// Module previously marked loaded under `name`.
    pub fn loaded(&self, name: &str) -> Option<LoadedModule> {
        self.loaded.get(name).map(|entry| entry.value().clone())
    }
}
