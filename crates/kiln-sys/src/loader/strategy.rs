//! Load strategies, tried in chain order by [`ModuleLoader`](super::ModuleLoader)

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use super::fetch::{is_http_url, BoxFuture, Fetch};
use super::globals::{HostGlobals, ModuleEvaluator, ModuleExports};
use super::{LoadSource, LoadedModule, LoaderError, ModuleSpec};
use crate::fs::FsAdapter;

/// Outcome of one strategy: `Ok(None)` when nothing was found, `Err` when a
/// candidate was found but could not be used.
pub type Attempt = Result<Option<LoadedModule>, LoaderError>;

/// One way of obtaining a module.
pub trait LoadStrategy: Send + Sync + fmt::Debug {
    /// Source tag given to modules this strategy produces.
    fn source(&self) -> LoadSource;

    /// Synchronous attempt. May block on I/O.
    fn attempt(&self, _spec: &ModuleSpec) -> Attempt {
        Ok(None)
    }

    /// Asynchronous attempt, for strategies that have one.
    fn attempt_async<'a>(&'a self, _spec: &'a ModuleSpec) -> Option<BoxFuture<'a, Attempt>> {
        None
    }
}

fn check_marker(
    spec: &ModuleSpec,
    exports: Arc<dyn ModuleExports>,
    source: LoadSource,
    location: &str,
) -> Attempt {
    if exports.has_function(&spec.marker) {
        Ok(Some(LoadedModule::new(exports, source, location)))
    } else {
        Err(LoaderError::MissingMarker {
            id: spec.id.clone(),
            marker: spec.marker.clone(),
            location: location.to_string(),
        })
    }
}

fn evaluate(
    evaluator: &dyn ModuleEvaluator,
    spec: &ModuleSpec,
    content: &str,
    source: LoadSource,
    location: &str,
) -> Attempt {
    let exports = evaluator
        .evaluate(content, location)
        .map_err(|e| LoaderError::Evaluate {
            location: location.to_string(),
            message: format!("{:#}", e),
        })?;
    check_marker(spec, exports, source, location)
}

/// Reuses a module already marked loaded in the host globals.
#[derive(Debug)]
pub struct AlreadyLoaded {
    globals: Arc<HostGlobals>,
}

impl AlreadyLoaded {
    /// Check slots in `globals`.
    pub fn new(globals: Arc<HostGlobals>) -> Self {
        Self { globals }
    }
}

impl LoadStrategy for AlreadyLoaded {
    fn source(&self) -> LoadSource {
        LoadSource::AlreadyLoaded
    }

    fn attempt(&self, spec: &ModuleSpec) -> Attempt {
        Ok(self
            .globals
            .loaded(&spec.global_name)
            .filter(|module| module.loaded && module.exports.has_function(&spec.marker)))
    }
}

/// Resolves the module from the local filesystem.
///
/// Uses the explicit path when one is given, otherwise looks for
/// `node_modules/<id>` in the working directory and each of its ancestors.
#[derive(Debug)]
pub struct LocalResolution {
    fs: FsAdapter,
    evaluator: Arc<dyn ModuleEvaluator>,
}

impl LocalResolution {
    /// Resolve through `fs` and evaluate with `evaluator`.
    pub fn new(fs: FsAdapter, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        Self { fs, evaluator }
    }

    fn entry_file(&self, spec: &ModuleSpec) -> Option<String> {
        match &spec.explicit_path {
            Some(path) if is_http_url(path) => None,
            Some(path) => self.entry_in(&self.fs.resolve(path), spec),
            None => {
                let paths = self.fs.paths();
                let mut dir = paths.cwd().to_string();
                loop {
                    let package_dir = paths.join(&[dir.as_str(), "node_modules", spec.id.as_str()]);
                    if let Some(entry) = self.entry_in(&package_dir, spec) {
                        return Some(entry);
                    }
                    let parent = paths.dirname(&dir);
                    if parent == dir {
                        return None;
                    }
                    dir = parent;
                }
            }
        }
    }

    /// Entry file for `path`, which is either the file itself or a package
    /// directory.
    fn entry_in(&self, path: &str, spec: &ModuleSpec) -> Option<String> {
        let stat = self.fs.stat(path)?;
        if stat.is_file {
            return Some(path.to_string());
        }
        if !stat.is_directory {
            return None;
        }

        let paths = self.fs.paths();
        let main = self
            .fs
            .read_file(&paths.join(&[path, "package.json"]))
            .and_then(|manifest| serde_json::from_str::<serde_json::Value>(&manifest).ok())
            .and_then(|manifest| manifest.get("main")?.as_str().map(str::to_string))
            .unwrap_or_else(|| spec.main.clone());

        let entry = paths.join(&[path, main.trim_start_matches('/')]);
        let candidates = [entry.clone(), format!("{}.js", entry), paths.join(&[entry.as_str(), "index.js"])];
        candidates
            .into_iter()
            .find(|candidate| self.fs.stat(candidate).is_some_and(|st| st.is_file))
    }
}

impl LoadStrategy for LocalResolution {
    fn source(&self) -> LoadSource {
        LoadSource::Local
    }

    fn attempt(&self, spec: &ModuleSpec) -> Attempt {
        let Some(entry) = self.entry_file(spec) else {
            return Ok(None);
        };
        let content = self
            .fs
            .read_file(&entry)
            .ok_or_else(|| LoaderError::Unreadable(entry.clone()))?;
        evaluate(self.evaluator.as_ref(), spec, &content, LoadSource::Local, &entry)
    }
}

/// Takes exports the embedder placed in the host globals.
#[derive(Debug)]
pub struct HostInjected {
    globals: Arc<HostGlobals>,
}

impl HostInjected {
    /// Read injected slots from `globals`.
    pub fn new(globals: Arc<HostGlobals>) -> Self {
        Self { globals }
    }
}

impl LoadStrategy for HostInjected {
    fn source(&self) -> LoadSource {
        LoadSource::HostInjected
    }

    fn attempt(&self, spec: &ModuleSpec) -> Attempt {
        match self.globals.injected(&spec.global_name) {
            Some(exports) => {
                let location = format!("globals.{}", spec.global_name);
                check_marker(spec, exports, LoadSource::HostInjected, &location)
            }
            None => Ok(None),
        }
    }
}

/// Blocking network import.
#[derive(Debug)]
pub struct SyncImport {
    fetcher: Arc<dyn Fetch>,
    evaluator: Arc<dyn ModuleEvaluator>,
    cdn_url: String,
}

impl SyncImport {
    /// Fetch from `cdn_url` with `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetch>, evaluator: Arc<dyn ModuleEvaluator>, cdn_url: &str) -> Self {
        Self {
            fetcher,
            evaluator,
            cdn_url: cdn_url.to_string(),
        }
    }
}

impl LoadStrategy for SyncImport {
    fn source(&self) -> LoadSource {
        LoadSource::SyncImport
    }

    fn attempt(&self, spec: &ModuleSpec) -> Attempt {
        let url = spec.url(&self.cdn_url)?;
        let content = self.fetcher.fetch_blocking(&url)?;
        evaluate(self.evaluator.as_ref(), spec, &content, LoadSource::SyncImport, &url)
    }
}

type SharedOutcome = Arc<OnceCell<Result<LoadedModule, String>>>;

/// Non-blocking network load, shared by concurrent callers.
///
/// Every caller asking for the same URL awaits the same in-flight request,
/// and later callers get its outcome without another request.
#[derive(Debug)]
pub struct AsyncFetch {
    fetcher: Arc<dyn Fetch>,
    evaluator: Arc<dyn ModuleEvaluator>,
    cdn_url: String,
    inflight: Mutex<HashMap<String, SharedOutcome>>,
}

impl AsyncFetch {
    /// Fetch from `cdn_url` with `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetch>, evaluator: Arc<dyn ModuleEvaluator>, cdn_url: &str) -> Self {
        Self {
            fetcher,
            evaluator,
            cdn_url: cdn_url.to_string(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    async fn load(&self, spec: &ModuleSpec) -> Attempt {
        let url = spec.url(&self.cdn_url)?;
        let cell = self.inflight.lock().entry(url.clone()).or_default().clone();

        let outcome = cell
            .get_or_init(|| async {
                debug!(url = %url, "fetching module");
                let content = self.fetcher.fetch(&url).await.map_err(|e| e.to_string())?;
                match evaluate(self.evaluator.as_ref(), spec, &content, LoadSource::Fetch, &url) {
                    Ok(Some(module)) => Ok(module),
                    Ok(None) => Err(format!("{} produced no module", url)),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;

        match outcome {
            Ok(module) => Ok(Some(module.clone())),
            Err(message) => Err(LoaderError::Remote {
                url,
                message: message.clone(),
            }),
        }
    }
}

impl LoadStrategy for AsyncFetch {
    fn source(&self) -> LoadSource {
        LoadSource::Fetch
    }

    fn attempt_async<'a>(&'a self, spec: &'a ModuleSpec) -> Option<BoxFuture<'a, Attempt>> {
        Some(Box::pin(self.load(spec)))
    }
}
