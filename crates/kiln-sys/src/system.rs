//! The compiler system facade
//!
//! [`CompilerSystem`] is the single object the compiler core talks to. It owns
//! the filesystem adapter, the event bus, the destroy registry and the module
//! loader for one session, and hands out watchers and worker pools that
//! register their teardown with it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiln_path::PathUtils;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::SystemConfig;
use crate::destroy::{self, DestroyCallback, DestroyRegistry, DestroyReport};
use crate::details::SystemDetails;
use crate::diagnostics::Diagnostic;
use crate::error::SysError;
use crate::events::{EventBus, FsEventKind};
use crate::fs::{
    path_to_string, CopyFileResult, FsAdapter, FsBackend, FsError, FsStat, MemoryFs,
    MkdirOptions, MkdirResult, NativeFs, RenameResult, RmdirOptions, RmdirResult, UnlinkResult,
    WriteFileResult,
};
use crate::hash;
use crate::host::HostKind;
use crate::loader::{
    Fetch, HostGlobals, HttpFetcher, LoadedModule, LoaderDeps, LoaderError, ModuleEvaluator,
    ModuleLoader, ModuleSpec,
};
use crate::watch::{FsWatcher, WatchCallback, WatchKind};
use crate::worker::{
    CompilerWorkerContext, ProcessSpawner, ThreadSpawner, UnconfiguredContext, WorkerError,
    WorkerPoolController, WorkerSpawner,
};

/// Builder for [`CompilerSystem`].
pub struct CompilerSystemBuilder {
    host: HostKind,
    config: SystemConfig,
    cwd: Option<String>,
    fs_backend: Option<Arc<dyn FsBackend>>,
    worker_context: Option<Arc<dyn CompilerWorkerContext>>,
    worker_spawner: Option<Arc<dyn WorkerSpawner>>,
    evaluator: Option<Arc<dyn ModuleEvaluator>>,
    fetcher: Option<Arc<dyn Fetch>>,
    globals: Option<Arc<HostGlobals>>,
}

impl CompilerSystemBuilder {
    /// Use `config`. Its `host` field is replaced by the builder's host.
    pub fn config(mut self, config: SystemConfig) -> Self {
        self.config = config;
        self
    }

    /// Working directory. Defaults to the process directory on hosts with a
    /// filesystem and `/` elsewhere.
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Filesystem backend. Defaults to [`NativeFs`] on hosts with a filesystem
    /// and a fresh [`MemoryFs`] elsewhere.
    pub fn fs_backend(mut self, backend: Arc<dyn FsBackend>) -> Self {
        self.fs_backend = Some(backend);
        self
    }

    /// Implementation run by thread workers. Without one, thread workers
    /// fail every task.
    pub fn worker_context(mut self, context: Arc<dyn CompilerWorkerContext>) -> Self {
        self.worker_context = Some(context);
        self
    }

    /// Custom worker backend for every pool this system creates.
    pub fn worker_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.worker_spawner = Some(spawner);
        self
    }

    /// Evaluator for locally resolved and fetched modules.
    pub fn evaluator(mut self, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Network fetcher. Defaults to [`HttpFetcher`] on hosts with network
    /// load strategies.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Global slots shared with other systems in this process.
    pub fn globals(mut self, globals: Arc<HostGlobals>) -> Self {
        self.globals = Some(globals);
        self
    }

    /// Validate the configuration and assemble the system.
    pub fn build(self) -> Result<Arc<CompilerSystem>, SysError> {
        let host = self.host;
        let mut config = self.config;
        config.host = host;
        config.validate()?;

        let cwd = match self.cwd {
            Some(cwd) => cwd,
            None if host.has_filesystem() => {
                let dir = std::env::current_dir().map_err(SysError::CurrentDir)?;
                path_to_string(&dir)
            }
            None => "/".to_string(),
        };
        let paths = PathUtils::new(cfg!(windows) && host.has_filesystem(), &cwd);

        let backend: Arc<dyn FsBackend> = match self.fs_backend {
            Some(backend) => backend,
            None if host.has_filesystem() => Arc::new(NativeFs::new()),
            None => Arc::new(MemoryFs::new()),
        };
        let fs = FsAdapter::new(backend, paths);

        let fetcher: Option<Arc<dyn Fetch>> = match self.fetcher {
            Some(fetcher) => Some(fetcher),
            None if host.supports_fetch() || host.supports_sync_import() => Some(Arc::new(HttpFetcher::new()?)),
            None => None,
        };
        let globals = self.globals.unwrap_or_default();
        let loader = ModuleLoader::for_host(
            host,
            LoaderDeps {
                fs: Some(fs.clone()),
                evaluator: self.evaluator,
                fetcher,
                globals,
                cdn_url: config.cdn_url.clone(),
            },
        );

        info!(host = %host, cwd = %fs.paths().cwd(), "compiler system ready");
        Ok(Arc::new(CompilerSystem {
            host,
            config,
            fs,
            bus: Arc::new(EventBus::new()),
            registry: Arc::new(DestroyRegistry::new()),
            loader: Arc::new(loader),
            worker_context: self.worker_context,
            worker_spawner: self.worker_spawner,
            tmp_dir: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }))
    }
}

/// Every environment capability the compiler core needs, for one session.
pub struct CompilerSystem {
    host: HostKind,
    config: SystemConfig,
    fs: FsAdapter,
    bus: Arc<EventBus>,
    registry: Arc<DestroyRegistry>,
    loader: Arc<ModuleLoader>,
    worker_context: Option<Arc<dyn CompilerWorkerContext>>,
    worker_spawner: Option<Arc<dyn WorkerSpawner>>,
    tmp_dir: Mutex<Option<String>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for CompilerSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerSystem")
            .field("host", &self.host)
            .field("cwd", &self.fs.paths().cwd())
            .field("destroy_callbacks", &self.registry.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl CompilerSystem {
    /// Start building a system for `host`.
    pub fn builder(host: HostKind) -> CompilerSystemBuilder {
        CompilerSystemBuilder {
            host,
            config: SystemConfig::default(),
            cwd: None,
            fs_backend: None,
            worker_context: None,
            worker_spawner: None,
            evaluator: None,
            fetcher: None,
            globals: None,
        }
    }

    /// Build with defaults for the host named in `config`.
    pub fn from_config(config: SystemConfig) -> Result<Arc<Self>, SysError> {
        Self::builder(config.host).config(config).build()
    }

    /// Host flavor.
    pub fn host(&self) -> HostKind {
        self.host
    }

    /// Effective configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Filesystem adapter.
    pub fn fs(&self) -> &FsAdapter {
        &self.fs
    }

    /// Bus receiving every watcher event.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Path utilities for this host.
    pub fn platform_path(&self) -> &PathUtils {
        self.fs.paths()
    }

    /// Working directory, absolute with forward slashes.
    pub fn get_current_directory(&self) -> String {
        self.fs.paths().cwd().to_string()
    }

    /// Resolve `path` against the working directory.
    pub fn resolve_path(&self, path: &str) -> String {
        self.fs.resolve(path)
    }

    /// Normalize `path` with forward slashes.
    pub fn normalize_path(&self, path: &str) -> String {
        kiln_path::normalize_path(path)
    }

    /// Content hash used for cache keys.
    pub fn generate_content_hash(&self, content: &str) -> String {
        hash::generate_content_hash(content)
    }

    /// Host OS and runtime details.
    pub fn details(&self) -> SystemDetails {
        SystemDetails::collect(self.host)
    }

    /// Terminate the process.
    pub fn exit(&self, code: i32) -> ! {
        info!(code, "exiting");
        std::process::exit(code)
    }

    // Queries

    /// Whether `path` exists.
    pub fn access_sync(&self, path: &str) -> bool {
        self.fs.access(path)
    }

    /// Whether `path` exists.
    pub async fn access(&self, path: &str) -> bool {
        let path = path.to_string();
        self.blocking(move |fs| fs.access(&path)).await.unwrap_or(false)
    }

    /// Status of `path`.
    pub fn stat_sync(&self, path: &str) -> Option<FsStat> {
        self.fs.stat(path)
    }

    /// Status of `path`.
    pub async fn stat(&self, path: &str) -> Option<FsStat> {
        let path = path.to_string();
        self.blocking(move |fs| fs.stat(&path)).await.flatten()
    }

    /// Whether `path` is a symbolic link.
    pub fn is_symbolic_link_sync(&self, path: &str) -> bool {
        self.fs.is_symbolic_link(path)
    }

    /// Whether `path` is a symbolic link.
    pub async fn is_symbolic_link(&self, path: &str) -> bool {
        let path = path.to_string();
        self.blocking(move |fs| fs.is_symbolic_link(&path)).await.unwrap_or(false)
    }

    /// UTF-8 contents of a file.
    pub fn read_file_sync(&self, path: &str) -> Option<String> {
        self.fs.read_file(path)
    }

    /// UTF-8 contents of a file.
    pub async fn read_file(&self, path: &str) -> Option<String> {
        let path = path.to_string();
        self.blocking(move |fs| fs.read_file(&path)).await.flatten()
    }

    /// Sorted full paths of the children of `path`.
    pub fn readdir_sync(&self, path: &str) -> Vec<String> {
        self.fs.readdir(path)
    }

    /// Sorted full paths of the children of `path`.
    pub async fn readdir(&self, path: &str) -> Vec<String> {
        let path = path.to_string();
        self.blocking(move |fs| fs.readdir(&path)).await.unwrap_or_default()
    }

    /// Canonical form of `path`.
    pub fn realpath_sync(&self, path: &str) -> Option<String> {
        self.fs.realpath(path)
    }

    /// Canonical form of `path`.
    pub async fn realpath(&self, path: &str) -> Option<String> {
        let path = path.to_string();
        self.blocking(move |fs| fs.realpath(&path)).await.flatten()
    }

    // Mutations

    /// Create a directory.
    pub fn mkdir_sync(&self, path: &str, opts: MkdirOptions) -> MkdirResult {
        self.fs.mkdir(path, opts)
    }

    /// Create a directory.
    pub async fn mkdir(&self, path: &str, opts: MkdirOptions) -> MkdirResult {
        let owned = path.to_string();
        match self.blocking(move |fs| fs.mkdir(&owned, opts)).await {
            Some(result) => result,
            None => MkdirResult {
                path: self.resolve_path(path),
                error: Some(FsError::background("mkdir", path)),
                ..MkdirResult::default()
            },
        }
    }

    /// Remove a directory.
    pub fn rmdir_sync(&self, path: &str, opts: RmdirOptions) -> RmdirResult {
        self.fs.rmdir(path, opts)
    }

    /// Remove a directory.
    pub async fn rmdir(&self, path: &str, opts: RmdirOptions) -> RmdirResult {
        let owned = path.to_string();
        match self.blocking(move |fs| fs.rmdir(&owned, opts)).await {
            Some(result) => result,
            None => RmdirResult {
                path: self.resolve_path(path),
                error: Some(FsError::background("rmdir", path)),
                ..RmdirResult::default()
            },
        }
    }

    /// Move a file or directory.
    pub fn rename_sync(&self, old_path: &str, new_path: &str) -> RenameResult {
        self.fs.rename(old_path, new_path)
    }

    /// Move a file or directory.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> RenameResult {
        let (from, to) = (old_path.to_string(), new_path.to_string());
        match self.blocking(move |fs| fs.rename(&from, &to)).await {
            Some(result) => result,
            None => RenameResult {
                old_path: self.resolve_path(old_path),
                new_path: self.resolve_path(new_path),
                error: Some(FsError::background("rename", old_path)),
                ..RenameResult::default()
            },
        }
    }

    /// Delete a file.
    pub fn unlink_sync(&self, path: &str) -> UnlinkResult {
        self.fs.unlink(path)
    }

    /// Delete a file.
    pub async fn unlink(&self, path: &str) -> UnlinkResult {
        let owned = path.to_string();
        match self.blocking(move |fs| fs.unlink(&owned)).await {
            Some(result) => result,
            None => UnlinkResult {
                path: self.resolve_path(path),
                error: Some(FsError::background("unlink", path)),
                ..UnlinkResult::default()
            },
        }
    }

    /// Write a file, replacing existing contents.
    pub fn write_file_sync(&self, path: &str, content: &str) -> WriteFileResult {
        self.fs.write_file(path, content)
    }

    /// Write a file, replacing existing contents.
    pub async fn write_file(&self, path: &str, content: &str) -> WriteFileResult {
        let (owned, content) = (path.to_string(), content.to_string());
        match self.blocking(move |fs| fs.write_file(&owned, &content)).await {
            Some(result) => result,
            None => WriteFileResult {
                path: self.resolve_path(path),
                error: Some(FsError::background("writeFile", path)),
            },
        }
    }

    /// Copy a file.
    pub fn copy_file_sync(&self, src: &str, dst: &str) -> CopyFileResult {
        self.fs.copy_file(src, dst)
    }

    /// Copy a file.
    pub async fn copy_file(&self, src: &str, dst: &str) -> CopyFileResult {
        let (from, to) = (src.to_string(), dst.to_string());
        match self.blocking(move |fs| fs.copy_file(&from, &to)).await {
            Some(result) => result,
            None => CopyFileResult {
                src: self.resolve_path(src),
                dst: self.resolve_path(dst),
                error: Some(FsError::background("copyFile", src)),
            },
        }
    }

    /// Run `op` on the blocking pool. `None` if the task panicked or was
    /// cancelled.
    fn blocking<T, F>(&self, op: F) -> impl Future<Output = Option<T>>
    where
        T: Send + 'static,
        F: FnOnce(&FsAdapter) -> T + Send + 'static,
    {
        let fs = self.fs.clone();
        let task = tokio::task::spawn_blocking(move || op(&fs));
        async move {
            match task.await {
                Ok(value) => Some(value),
                Err(err) => {
                    debug!(error = %err, "filesystem task did not complete");
                    None
                }
            }
        }
    }

    /// Lazily created scratch directory, removed by [`CompilerSystem::destroy`].
    pub fn tmpdir(&self) -> Result<String, FsError> {
        let mut slot = self.tmp_dir.lock();
        if let Some(dir) = slot.as_ref() {
            return Ok(dir.clone());
        }

        let dir = self
            .fs
            .backend()
            .create_temp_dir("kiln-")
            .map_err(|err| FsError::new("tmpdir", "", &err))?;
        let fs = self.fs.clone();
        let target = dir.clone();
        self.registry.add(destroy::callback(move || {
            match fs.rmdir(&target, RmdirOptions { recursive: true }).error {
                Some(err) if err.kind != std::io::ErrorKind::NotFound => Err(err.into()),
                _ => Ok(()),
            }
        }));

        debug!(dir = %dir, "temp directory created");
        *slot = Some(dir.clone());
        Ok(dir)
    }

    // Watching

    /// Watch a single file.
    pub fn watch_file<F>(&self, path: &str, callback: F) -> Result<FsWatcher, FsError>
    where
        F: Fn(&str, FsEventKind) + Send + Sync + 'static,
    {
        self.watch(path, WatchKind::File, false, Arc::new(callback))
    }

    /// Watch a directory, optionally including every subdirectory.
    pub fn watch_directory<F>(&self, path: &str, callback: F, recursive: bool) -> Result<FsWatcher, FsError>
    where
        F: Fn(&str, FsEventKind) + Send + Sync + 'static,
    {
        self.watch(path, WatchKind::Directory, recursive, Arc::new(callback))
    }

    fn watch(&self, path: &str, kind: WatchKind, recursive: bool, callback: WatchCallback) -> Result<FsWatcher, FsError> {
        FsWatcher::start(
            self.fs.backend(),
            self.resolve_path(path),
            kind,
            recursive,
            callback,
            self.bus.clone(),
            &self.registry,
        )
    }

    // Workers

    /// A worker pool capped at `max_concurrent_workers`, shut down by
    /// [`CompilerSystem::destroy`].
    pub fn create_worker_controller(&self, max_concurrent_workers: usize) -> Result<WorkerPoolController, WorkerError> {
        let spawner: Arc<dyn WorkerSpawner> = match (&self.worker_spawner, &self.config.worker_program) {
            (Some(spawner), _) => spawner.clone(),
            (None, Some(program)) if self.host.supports_process_workers() => {
                Arc::new(ProcessSpawner::new(program.clone(), self.config.worker_args.clone()))
            }
            (None, _) => {
                let context = self
                    .worker_context
                    .clone()
                    .unwrap_or_else(|| Arc::new(UnconfiguredContext));
                Arc::new(ThreadSpawner::new(context))
            }
        };

        let pool = WorkerPoolController::new(max_concurrent_workers, spawner)?;
        self.registry.add(pool.destroy_callback());
        Ok(pool)
    }

    /// A worker pool sized from the configuration.
    pub fn create_default_worker_controller(&self) -> Result<WorkerPoolController, WorkerError> {
        self.create_worker_controller(self.config.effective_max_workers())
    }

    // Modules

    fn configured(&self, spec: &ModuleSpec) -> ModuleSpec {
        match self.config.dependencies.get(&spec.id) {
            Some(overrides) => spec.clone().with_overrides(overrides),
            None => spec.clone(),
        }
    }

    /// Load `spec` through every strategy this host supports.
    pub async fn load_module(&self, spec: &ModuleSpec, diagnostics: &mut Vec<Diagnostic>) -> Option<LoadedModule> {
        let spec = self.configured(spec);
        self.loader.load(&spec, diagnostics).await
    }

    /// Load `spec` using only the synchronous strategies.
    pub fn load_module_sync(&self, spec: &ModuleSpec, diagnostics: &mut Vec<Diagnostic>) -> Option<LoadedModule> {
        let spec = self.configured(spec);
        self.loader.load_sync(&spec, diagnostics)
    }

    /// CDN URLs of the package files `spec` needs alongside its entry, with
    /// configured overrides applied.
    pub fn module_resource_urls(&self, spec: &ModuleSpec) -> Result<Vec<String>, LoaderError> {
        self.configured(spec).resource_urls(&self.config.cdn_url)
    }

    /// The module loader.
    pub fn module_loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    // Teardown

    /// Register a cleanup callback. Returns false if it was already present.
    pub fn add_destroy(&self, callback: DestroyCallback) -> bool {
        self.registry.add(callback)
    }

    /// Unregister a cleanup callback.
    pub fn remove_destroy(&self, callback: &DestroyCallback) -> bool {
        self.registry.remove(callback)
    }

    /// Whether [`CompilerSystem::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Run every cleanup callback and wait for them to settle. Closes all
    /// watchers, shuts down all worker pools and removes the temp directory.
    /// Later calls do nothing.
    pub async fn destroy(&self) -> DestroyReport {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return DestroyReport::default();
        }
        let report = self.registry.destroy_all().await;
        self.bus.clear();
        self.tmp_dir.lock().take();
        info!(ran = report.ran, failed = report.failed, "compiler system destroyed");
        report
    }
}
