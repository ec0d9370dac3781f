//! Kiln System
//!
//! The host abstraction the Kiln compiler core runs on. A [`CompilerSystem`]
//! bundles every environment capability the compiler needs:
//!
//! - filesystem access with sentinel-returning reads and result-carrying
//!   mutations ([`fs`])
//! - change notification normalized to a fixed event vocabulary ([`watch`],
//!   [`events`])
//! - a bounded worker pool for CPU-heavy transforms ([`worker`])
//! - a strategy-chain module loader for third-party runtimes ([`loader`])
//! - deterministic teardown through one [`DestroyRegistry`]
//!
//! The host flavor ([`HostKind`]) is chosen once and passed to every
//! component, so the same compiler core runs against a native filesystem with
//! child-process workers or an in-memory filesystem with thread workers.

#![warn(missing_docs)]

pub mod config;
pub mod destroy;
pub mod details;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fs;
pub mod handles;
pub mod hash;
pub mod host;
pub mod loader;
pub mod system;
pub mod watch;
pub mod worker;

pub use config::{ConfigError, SystemConfig};
pub use destroy::{DestroyCallback, DestroyRegistry, DestroyReport};
pub use details::SystemDetails;
pub use diagnostics::{Diagnostic, DiagnosticLevel};
pub use error::SysError;
pub use events::{EventBus, FsEvent, FsEventKind};
pub use fs::{
    CopyFileResult, FsAdapter, FsBackend, FsError, FsStat, MemoryFs, MkdirOptions, MkdirResult,
    NativeFs, RenameResult, RmdirOptions, RmdirResult, UnlinkResult, WriteFileResult,
};
pub use hash::generate_content_hash;
pub use host::HostKind;
pub use kiln_path::{normalize_path, PathUtils};
pub use loader::{
    Fetch, HostGlobals, HttpFetcher, LoadSource, LoadedModule, LoaderError, ModuleEvaluator,
    ModuleExports, ModuleLoader, ModuleSpec,
};
pub use system::{CompilerSystem, CompilerSystemBuilder};
pub use watch::{FsWatcher, WatchKind};
pub use worker::{
    CompilerWorkerContext, PendingTask, PoolStats, WorkerError, WorkerFunction,
    WorkerPoolController,
};
