//! Module Loader
//!
//! Obtains third-party runtimes (the TypeScript compiler, bundlers, ...) by
//! trying an ordered chain of [`LoadStrategy`] objects:
//!
//! 1. [`AlreadyLoaded`]: a module already installed in the host globals
//! 2. [`LocalResolution`]: an explicit path or `node_modules/<id>`
//! 3. [`HostInjected`]: exports the embedder placed in the host globals
//! 4. [`SyncImport`]: a blocking network import
//! 5. [`AsyncFetch`]: a single-flight network fetch
//!
//! Which strategies take part depends on the [`HostKind`]. The first module
//! exporting the marker function is installed; later loads reuse it. When
//! every strategy fails a diagnostic is pushed and `None` is returned.

mod fetch;
mod globals;
mod strategy;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub use fetch::{
    is_http_url, remote_url, BoxFuture, Fetch, FetchError, HttpFetcher, MAX_CONTENT_SIZE,
    REQUEST_TIMEOUT,
};
pub use globals::{HostGlobals, ModuleEvaluator, ModuleExports};
pub use strategy::{
    AlreadyLoaded, AsyncFetch, Attempt, HostInjected, LoadStrategy, LocalResolution, SyncImport,
};

use crate::config::DependencyConfig;
use crate::diagnostics::Diagnostic;
use crate::fs::FsAdapter;
use crate::host::HostKind;

/// Errors from a single load strategy
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Fetching the module failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A shared network load failed
    #[error("{url}: {message}")]
    Remote {
        /// Requested URL
        url: String,
        /// Failure description
        message: String,
    },

    /// The module source could not be evaluated
    #[error("failed to evaluate {location}: {message}")]
    Evaluate {
        /// File path or URL
        location: String,
        /// Evaluator error
        message: String,
    },

    /// The module does not export the marker function
    #[error("{location} does not look like {id}: missing {marker}()")]
    MissingMarker {
        /// Module id
        id: String,
        /// Required export
        marker: String,
        /// File path, URL or global slot
        location: String,
    },

    /// A resolved entry file could not be read
    #[error("failed to read {0}")]
    Unreadable(String),
}

/// Where an installed module came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadSource {
    /// Bundled with the host and marked loaded before any lookup
    AlreadyLoaded,
    /// Local filesystem
    Local,
    /// Injected by the embedder
    HostInjected,
    /// Blocking network import
    SyncImport,
    /// Asynchronous network fetch
    Fetch,
}

impl LoadSource {
    /// Stable name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            LoadSource::AlreadyLoaded => "already-loaded",
            LoadSource::Local => "local",
            LoadSource::HostInjected => "host-injected",
            LoadSource::SyncImport => "sync-import",
            LoadSource::Fetch => "fetch",
        }
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A module handle tagged with how it was obtained.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Module exports
    pub exports: Arc<dyn ModuleExports>,
    /// Strategy that produced it
    pub source: LoadSource,
    /// File path, URL or global slot it was loaded from
    pub location: String,
    /// Always true for installed modules
    pub loaded: bool,
}

impl LoadedModule {
    /// Tag `exports` as loaded from `location`.
    pub fn new(exports: Arc<dyn ModuleExports>, source: LoadSource, location: &str) -> Self {
        Self {
            exports,
            source,
            location: location.to_string(),
            loaded: true,
        }
    }

    /// Whether both handles point at the same module object.
    pub fn same_as(&self, other: &LoadedModule) -> bool {
        Arc::ptr_eq(&self.exports, &other.exports)
    }
}

/// A dependency the compiler knows how to load.
#[derive(Debug, Clone, Copy)]
pub struct KnownDependency {
    /// Package name
    pub name: &'static str,
    /// Pinned version
    pub version: &'static str,
    /// Entry file inside the package
    pub main: &'static str,
    /// Export that identifies a usable module
    pub marker: &'static str,
    /// Host global slot
    pub global_name: &'static str,
    /// Extra files the compiler fetches alongside the entry
    pub resources: &'static [&'static str],
}

const TYPESCRIPT: KnownDependency = KnownDependency {
    name: "typescript",
    version: "5.5.4",
    main: "lib/typescript.js",
    marker: "transpileModule",
    global_name: "ts",
    resources: &["lib/lib.dom.d.ts", "lib/lib.es5.d.ts", "lib/lib.es2015.d.ts", "package.json"],
};

/// Dependencies with pinned versions and entry points.
pub const KNOWN_DEPENDENCIES: &[KnownDependency] = &[
    KnownDependency {
        name: "@kiln/core",
        version: env!("CARGO_PKG_VERSION"),
        main: "compiler/kiln.min.js",
        marker: "transpile",
        global_name: "kiln",
        resources: &["internal/package.json", "internal/client/index.js", "package.json"],
    },
    TYPESCRIPT,
    KnownDependency {
        name: "rollup",
        version: "4.18.0",
        main: "/dist/rollup.browser.es.js",
        marker: "rollup",
        global_name: "rollup",
        resources: &[],
    },
    KnownDependency {
        name: "terser",
        version: "5.31.1",
        main: "/dist/bundle.min.js",
        marker: "minify",
        global_name: "Terser",
        resources: &[],
    },
];

/// What to load and how to recognize it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    /// Package name
    pub id: String,
    /// Version used for remote URLs
    pub version: String,
    /// Entry file inside the package
    pub main: String,
    /// Export a candidate must have
    pub marker: String,
    /// Host global slot
    pub global_name: String,
    /// Local path or URL that overrides lookup
    pub explicit_path: Option<String>,
    /// Package files needed alongside the entry
    pub resources: Vec<String>,
}

impl ModuleSpec {
    /// Spec for an arbitrary module.
    pub fn new(id: &str, version: &str, main: &str, marker: &str, global_name: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            main: main.to_string(),
            marker: marker.to_string(),
            global_name: global_name.to_string(),
            explicit_path: None,
            resources: Vec::new(),
        }
    }

    fn from_known(dep: &KnownDependency) -> Self {
        Self::new(dep.name, dep.version, dep.main, dep.marker, dep.global_name)
            .with_resources(dep.resources.iter().copied())
    }

    /// Spec for a [`KNOWN_DEPENDENCIES`] entry.
    pub fn known(name: &str) -> Option<Self> {
        KNOWN_DEPENDENCIES
            .iter()
            .find(|dep| dep.name == name)
            .map(Self::from_known)
    }

    /// The TypeScript compiler.
    pub fn typescript() -> Self {
        Self::from_known(&TYPESCRIPT)
    }

    /// Replace the package files needed alongside the entry.
    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    /// Load from `path` (a local path or an HTTP URL) instead of looking it up.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Apply configured version and entry overrides.
    pub fn with_overrides(mut self, overrides: &DependencyConfig) -> Self {
        if let Some(version) = &overrides.version {
            self.version = version.clone();
        }
        if let Some(main) = &overrides.main {
            self.main = main.clone();
        }
        self
    }

    /// URL the network strategies fetch: the explicit path when it is a URL,
    /// otherwise the entry file on `cdn_url`.
    pub fn url(&self, cdn_url: &str) -> Result<String, LoaderError> {
        match &self.explicit_path {
            Some(path) if is_http_url(path) => Ok(path.clone()),
            _ => Ok(remote_url(cdn_url, &self.id, &self.version, &self.main)?),
        }
    }

    /// URL of another file in the same package on `cdn_url`.
    pub fn resource_url(&self, cdn_url: &str, path: &str) -> Result<String, LoaderError> {
        Ok(remote_url(cdn_url, &self.id, &self.version, path)?)
    }

    /// URLs of every entry in [`ModuleSpec::resources`], in order.
    pub fn resource_urls(&self, cdn_url: &str) -> Result<Vec<String>, LoaderError> {
        self.resources
            .iter()
            .map(|path| self.resource_url(cdn_url, path))
            .collect()
    }
}

/// Collaborators the strategies are built from.
#[derive(Debug, Clone)]
pub struct LoaderDeps {
    /// Filesystem for local resolution
    pub fs: Option<FsAdapter>,
    /// Turns source text into exports
    pub evaluator: Option<Arc<dyn ModuleEvaluator>>,
    /// Network access
    pub fetcher: Option<Arc<dyn Fetch>>,
    /// Shared global slots
    pub globals: Arc<HostGlobals>,
    /// CDN base URL
    pub cdn_url: String,
}

/// Runs the strategy chain and keeps installed modules.
#[derive(Debug)]
pub struct ModuleLoader {
    strategies: Vec<Box<dyn LoadStrategy>>,
    globals: Arc<HostGlobals>,
}

impl ModuleLoader {
    /// Loader over an explicit strategy chain.
    pub fn new(strategies: Vec<Box<dyn LoadStrategy>>, globals: Arc<HostGlobals>) -> Self {
        Self { strategies, globals }
    }

    /// The standard chain for `host`. Strategies whose collaborators are
    /// missing, or that the host cannot run, are left out.
    pub fn for_host(host: HostKind, deps: LoaderDeps) -> Self {
        let globals = deps.globals.clone();
        let mut chain: Vec<Box<dyn LoadStrategy>> = vec![Box::new(AlreadyLoaded::new(globals.clone()))];

        if let (Some(fs), Some(evaluator)) = (&deps.fs, &deps.evaluator) {
            if host.has_filesystem() {
                chain.push(Box::new(LocalResolution::new(fs.clone(), evaluator.clone())));
            }
        }
        chain.push(Box::new(HostInjected::new(globals.clone())));
        if let (Some(fetcher), Some(evaluator)) = (&deps.fetcher, &deps.evaluator) {
            if host.supports_sync_import() {
                chain.push(Box::new(SyncImport::new(fetcher.clone(), evaluator.clone(), &deps.cdn_url)));
            }
            if host.supports_fetch() {
                chain.push(Box::new(AsyncFetch::new(fetcher.clone(), evaluator.clone(), &deps.cdn_url)));
            }
        }

        debug!(
            host = %host,
            strategies = ?chain.iter().map(|s| s.source().as_str()).collect::<Vec<_>>(),
            "module loader ready"
        );
        Self::new(chain, globals)
    }

    /// Sources of the strategies in chain order.
    pub fn strategy_sources(&self) -> Vec<LoadSource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    /// Shared global slots.
    pub fn globals(&self) -> &Arc<HostGlobals> {
        &self.globals
    }

    /// Installed module for `spec`, if any.
    pub fn installed(&self, spec: &ModuleSpec) -> Option<LoadedModule> {
        self.globals.loaded(&spec.global_name)
    }

    /// Run only the synchronous strategies.
    pub fn load_sync(&self, spec: &ModuleSpec, diagnostics: &mut Vec<Diagnostic>) -> Option<LoadedModule> {
        if let Some(module) = self.installed(spec) {
            return Some(module);
        }
        let mut failures = Vec::new();
        match self.run_sync(spec, &mut failures) {
            Some(module) => Some(self.install(spec, module)),
            None => {
                diagnostics.push(unavailable(spec, &failures));
                None
            }
        }
    }

    /// Run the whole chain. Blocking strategies run on the blocking pool.
    pub async fn load(self: &Arc<Self>, spec: &ModuleSpec, diagnostics: &mut Vec<Diagnostic>) -> Option<LoadedModule> {
        if let Some(module) = self.installed(spec) {
            return Some(module);
        }

        let loader = Arc::clone(self);
        let owned = spec.clone();
        let blocking = tokio::task::spawn_blocking(move || {
            let mut failures = Vec::new();
            let module = loader.run_sync(&owned, &mut failures);
            (module, failures)
        });
        let (found, mut failures) = match blocking.await {
            Ok(outcome) => outcome,
            Err(err) => (None, vec![format!("local strategies did not complete: {}", err)]),
        };
        if let Some(module) = found {
            return Some(self.install(spec, module));
        }

        for strategy in &self.strategies {
            let Some(attempt) = strategy.attempt_async(spec) else {
                continue;
            };
            match attempt.await {
                Ok(Some(module)) => return Some(self.install(spec, module)),
                Ok(None) => {}
                Err(e) => {
                    debug!(id = %spec.id, strategy = %strategy.source(), error = %e, "strategy failed");
                    failures.push(format!("{}: {}", strategy.source(), e));
                }
            }
        }

        diagnostics.push(unavailable(spec, &failures));
        None
    }

    fn run_sync(&self, spec: &ModuleSpec, failures: &mut Vec<String>) -> Option<LoadedModule> {
        for strategy in &self.strategies {
            match strategy.attempt(spec) {
                Ok(Some(module)) => return Some(module),
                Ok(None) => {}
                Err(e) => {
                    debug!(id = %spec.id, strategy = %strategy.source(), error = %e, "strategy failed");
                    failures.push(format!("{}: {}", strategy.source(), e));
                }
            }
        }
        None
    }

    fn install(&self, spec: &ModuleSpec, module: LoadedModule) -> LoadedModule {
        let installed = self.globals.publish(&spec.global_name, module);
        info!(
            id = %spec.id,
            source = %installed.source,
            location = %installed.location,
            "module installed"
        );
        installed
    }
}

fn unavailable(spec: &ModuleSpec, failures: &[String]) -> Diagnostic {
    let mut message = format!("Unable to load {}@{}", spec.id, spec.version);
    if failures.is_empty() {
        message.push_str(": no strategy found it");
    } else {
        message.push_str(": ");
        message.push_str(&failures.join("; "));
    }
    Diagnostic::error(format!("{} unavailable", spec.id), message)
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use kiln_path::PathUtils;

    use super::*;
    use crate::fs::{FsBackend, MemoryFs};

    /// Exports parsed from `exports: a, b` source text.
    #[derive(Debug)]
    struct FakeModule {
        functions: BTreeSet<String>,
    }

    impl ModuleExports for FakeModule {
        fn has_function(&self, name: &str) -> bool {
            self.functions.contains(name)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn module(functions: &[&str]) -> Arc<dyn ModuleExports> {
        Arc::new(FakeModule {
            functions: functions.iter().map(|f| f.to_string()).collect(),
        })
    }

    #[derive(Debug)]
    struct FakeEvaluator;

    impl ModuleEvaluator for FakeEvaluator {
        fn evaluate(&self, source: &str, _origin: &str) -> anyhow::Result<Arc<dyn ModuleExports>> {
            let list = source
                .strip_prefix("exports:")
                .ok_or_else(|| anyhow::anyhow!("syntax error"))?;
            let functions: Vec<&str> = list.split(',').map(str::trim).filter(|f| !f.is_empty()).collect();
            Ok(module(&functions))
        }
    }

    #[derive(Debug)]
    struct CountingFetch {
        body: Result<String, u16>,
        calls: AtomicUsize,
    }

    impl CountingFetch {
        fn ok(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: Ok(body.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn status(status: u16) -> Arc<Self> {
            Arc::new(Self {
                body: Err(status),
                calls: AtomicUsize::new(0),
            })
        }

        fn respond(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body.clone().map_err(|status| FetchError::HttpStatus {
                status,
                url: url.to_string(),
            })
        }
    }

    impl Fetch for CountingFetch {
        fn fetch_blocking(&self, url: &str) -> Result<String, FetchError> {
            self.respond(url)
        }

        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.respond(url)
            })
        }
    }

    fn memory_fs(files: &[(&str, &str)]) -> FsAdapter {
        let backend = MemoryFs::new();
        for (path, content) in files {
            let paths = PathUtils::posix("/");
            let mut dir = paths.dirname(path);
            let mut missing = Vec::new();
            while backend.stat(&dir).is_err() {
                missing.push(dir.clone());
                dir = paths.dirname(&dir);
            }
            for dir in missing.iter().rev() {
                backend.create_dir(dir).unwrap();
            }
            backend.write(path, content.as_bytes()).unwrap();
        }
        FsAdapter::new(Arc::new(backend), PathUtils::posix("/project/app"))
    }

    fn deps(fs: Option<FsAdapter>, fetcher: Option<Arc<dyn Fetch>>) -> LoaderDeps {
        LoaderDeps {
            fs,
            evaluator: Some(Arc::new(FakeEvaluator)),
            fetcher,
            globals: Arc::new(HostGlobals::new()),
            cdn_url: "https://cdn.example.com/npm".to_string(),
        }
    }

    #[test]
    fn test_chain_depends_on_host() {
        let fetch: Arc<dyn Fetch> = CountingFetch::ok("");
        let fs = memory_fs(&[]);

        let native = ModuleLoader::for_host(HostKind::Native, deps(Some(fs.clone()), Some(fetch.clone())));
        assert_eq!(
            native.strategy_sources(),
            vec![LoadSource::AlreadyLoaded, LoadSource::Local, LoadSource::HostInjected]
        );

        let worker = ModuleLoader::for_host(HostKind::BackgroundThread, deps(None, Some(fetch.clone())));
        assert_eq!(
            worker.strategy_sources(),
            vec![LoadSource::AlreadyLoaded, LoadSource::HostInjected, LoadSource::SyncImport]
        );

        let isolate = ModuleLoader::for_host(HostKind::Isolate, deps(Some(fs), Some(fetch)));
        assert_eq!(
            isolate.strategy_sources(),
            vec![
                LoadSource::AlreadyLoaded,
                LoadSource::Local,
                LoadSource::HostInjected,
                LoadSource::Fetch
            ]
        );
    }

    #[test]
    fn test_local_resolution_reads_package_main() {
        let fs = memory_fs(&[
            ("/project/node_modules/typescript/package.json", r#"{"main": "./lib/tsc.js"}"#),
            ("/project/node_modules/typescript/lib/tsc.js", "exports: transpileModule, createProgram"),
        ]);
        let loader = ModuleLoader::for_host(HostKind::Native, deps(Some(fs), None));
        let mut diagnostics = Vec::new();

        let ts = loader.load_sync(&ModuleSpec::typescript(), &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(ts.source, LoadSource::Local);
        assert_eq!(ts.location, "/project/node_modules/typescript/lib/tsc.js");
        assert!(ts.loaded);
        assert!(ts.exports.has_function("createProgram"));
    }

    #[test]
    fn test_local_resolution_falls_back_to_spec_main() {
        let fs = memory_fs(&[("/project/app/node_modules/typescript/lib/typescript.js", "exports: transpileModule")]);
        let loader = ModuleLoader::for_host(HostKind::Native, deps(Some(fs), None));
        let ts = loader.load_sync(&ModuleSpec::typescript(), &mut Vec::new()).unwrap();
        assert_eq!(ts.location, "/project/app/node_modules/typescript/lib/typescript.js");
    }

    #[test]
    fn test_explicit_path_wins() {
        let fs = memory_fs(&[
            ("/project/node_modules/typescript/lib/typescript.js", "exports: transpileModule"),
            ("/vendor/ts.js", "exports: transpileModule, vendored"),
        ]);
        let loader = ModuleLoader::for_host(HostKind::Native, deps(Some(fs), None));
        let spec = ModuleSpec::typescript().with_path("/vendor/ts.js");
        let ts = loader.load_sync(&spec, &mut Vec::new()).unwrap();
        assert!(ts.exports.has_function("vendored"));
    }

    #[test]
    fn test_marker_required() {
        let fs = memory_fs(&[("/project/node_modules/typescript/lib/typescript.js", "exports: somethingElse")]);
        let loader = ModuleLoader::for_host(HostKind::Native, deps(Some(fs), None));
        loader.globals().inject("ts", module(&["transpileModule"]));

        let ts = loader.load_sync(&ModuleSpec::typescript(), &mut Vec::new()).unwrap();
        assert_eq!(ts.source, LoadSource::HostInjected);
        assert_eq!(ts.location, "globals.ts");
    }

    #[test]
    fn test_total_failure_pushes_diagnostic() {
        let fs = memory_fs(&[("/project/node_modules/typescript/lib/typescript.js", "not javascript")]);
        let loader = ModuleLoader::for_host(HostKind::Native, deps(Some(fs), None));
        let mut diagnostics = Vec::new();

        assert!(loader.load_sync(&ModuleSpec::typescript(), &mut diagnostics).is_none());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
        assert!(diagnostics[0].message_text.contains("syntax error"));
    }

    #[test]
    fn test_installed_module_is_reused() {
        let fs = memory_fs(&[("/project/node_modules/typescript/lib/typescript.js", "exports: transpileModule")]);
        let loader = ModuleLoader::for_host(HostKind::Native, deps(Some(fs), None));

        let first = loader.load_sync(&ModuleSpec::typescript(), &mut Vec::new()).unwrap();
        let second = loader.load_sync(&ModuleSpec::typescript(), &mut Vec::new()).unwrap();
        assert!(first.same_as(&second));
        assert!(loader.installed(&ModuleSpec::typescript()).unwrap().same_as(&first));
    }

    #[test]
    fn test_bundled_module_marked_loaded() {
        let loader = ModuleLoader::for_host(HostKind::FetchOnly, deps(None, None));
        loader.globals().mark_loaded("ts", module(&["transpileModule"]), "bundled");

        let ts = loader.load_sync(&ModuleSpec::typescript(), &mut Vec::new()).unwrap();
        assert_eq!(ts.source, LoadSource::AlreadyLoaded);
        assert_eq!(ts.location, "bundled");
    }

    #[test]
    fn test_sync_import() {
        let fetch = CountingFetch::ok("exports: transpileModule");
        let loader = ModuleLoader::for_host(HostKind::BackgroundThread, deps(None, Some(fetch.clone())));

        let ts = loader.load_sync(&ModuleSpec::typescript(), &mut Vec::new()).unwrap();
        assert_eq!(ts.source, LoadSource::SyncImport);
        assert_eq!(ts.location, "https://cdn.example.com/npm/typescript@5.5.4/lib/typescript.js");
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let fetch = CountingFetch::ok("exports: transpileModule");
        let loader = Arc::new(ModuleLoader::for_host(HostKind::FetchOnly, deps(None, Some(fetch.clone()))));
        let spec = ModuleSpec::typescript();

        let (a, b) = tokio::join!(
            {
                let loader = loader.clone();
                let spec = spec.clone();
                async move { loader.load(&spec, &mut Vec::new()).await }
            },
            {
                let loader = loader.clone();
                let spec = spec.clone();
                async move { loader.load(&spec, &mut Vec::new()).await }
            }
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.same_as(&b));
        assert_eq!(a.source, LoadSource::Fetch);
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);

        let c = loader.load(&spec, &mut Vec::new()).await.unwrap();
        assert!(c.same_as(&a));
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_retried() {
        let fetch = CountingFetch::status(404);
        let loader = Arc::new(ModuleLoader::for_host(HostKind::FetchOnly, deps(None, Some(fetch.clone()))));
        let spec = ModuleSpec::typescript();

        let mut diagnostics = Vec::new();
        assert!(loader.load(&spec, &mut diagnostics).await.is_none());
        assert!(loader.load(&spec, &mut diagnostics).await.is_none());
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics[0].message_text.contains("HTTP 404"));
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_only_load_does_not_fetch() {
        let fetch = CountingFetch::ok("exports: transpileModule");
        let loader = ModuleLoader::for_host(HostKind::FetchOnly, deps(None, Some(fetch.clone())));
        let mut diagnostics = Vec::new();
        assert!(loader.load_sync(&ModuleSpec::typescript(), &mut diagnostics).is_none());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(fetch.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_known_dependencies() {
        let ts = ModuleSpec::known("typescript").unwrap();
        assert_eq!(ts, ModuleSpec::typescript());

        let rollup = ModuleSpec::known("rollup").unwrap();
        assert_eq!(
            rollup.url("https://cdn.jsdelivr.net/npm").unwrap(),
            "https://cdn.jsdelivr.net/npm/rollup@4.18.0/dist/rollup.browser.es.js"
        );
        assert!(ModuleSpec::known("left-pad").is_none());
    }

    #[test]
    fn test_overrides_and_urls() {
        let overrides = DependencyConfig {
            version: Some("5.0.2".to_string()),
            main: None,
        };
        let ts = ModuleSpec::typescript().with_overrides(&overrides);
        assert_eq!(
            ts.url("https://cdn.jsdelivr.net/npm").unwrap(),
            "https://cdn.jsdelivr.net/npm/typescript@5.0.2/lib/typescript.js"
        );
        assert_eq!(
            ts.resource_url("https://cdn.jsdelivr.net/npm", "lib/lib.dom.d.ts").unwrap(),
            "https://cdn.jsdelivr.net/npm/typescript@5.0.2/lib/lib.dom.d.ts"
        );

        assert_eq!(
            ts.resource_urls("https://cdn.jsdelivr.net/npm").unwrap(),
            vec![
                "https://cdn.jsdelivr.net/npm/typescript@5.0.2/lib/lib.dom.d.ts",
                "https://cdn.jsdelivr.net/npm/typescript@5.0.2/lib/lib.es5.d.ts",
                "https://cdn.jsdelivr.net/npm/typescript@5.0.2/lib/lib.es2015.d.ts",
                "https://cdn.jsdelivr.net/npm/typescript@5.0.2/package.json",
            ]
        );

        let pinned = ts.with_path("https://mirror.example.com/ts.js");
        assert_eq!(pinned.url("https://cdn.jsdelivr.net/npm").unwrap(), "https://mirror.example.com/ts.js");
    }
}
