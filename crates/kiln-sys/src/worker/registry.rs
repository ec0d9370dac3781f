//! Fixed registry of functions a worker may run

use std::fmt;

use serde_json::Value;

use super::protocol::{ErrorDescriptor, TaskMessage, TaskResponse};

/// Every function a worker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerFunction {
    /// Source transpilation
    Transpile,
    /// CSS to ES module conversion
    TransformCssToEsm,
    /// Module preparation for bundling
    PrepareModule,
    /// CSS optimization
    OptimizeCss,
    /// ES5 downleveling
    TranspileToEs5,
    /// Prerendering
    PrerenderWorker,
}

impl WorkerFunction {
    /// All registered functions.
    pub const ALL: [WorkerFunction; 6] = [
        WorkerFunction::Transpile,
        WorkerFunction::TransformCssToEsm,
        WorkerFunction::PrepareModule,
        WorkerFunction::OptimizeCss,
        WorkerFunction::TranspileToEs5,
        WorkerFunction::PrerenderWorker,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            WorkerFunction::Transpile => "transpile",
            WorkerFunction::TransformCssToEsm => "transformCssToEsm",
            WorkerFunction::PrepareModule => "prepareModule",
            WorkerFunction::OptimizeCss => "optimizeCss",
            WorkerFunction::TranspileToEs5 => "transpileToEs5",
            WorkerFunction::PrerenderWorker => "prerenderWorker",
        }
    }

    /// Look up a function by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for WorkerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The transformation functions a worker executes.
///
/// Implementations live outside this crate. Each method receives the task's
/// positional arguments and returns a JSON value or an error descriptor.
/// A panic is treated as a worker crash.
pub trait CompilerWorkerContext: Send + Sync {
    /// Transpile source text
    fn transpile(&self, args: &[Value]) -> TaskResponse;
    /// Convert CSS to an ES module
    fn transform_css_to_esm(&self, args: &[Value]) -> TaskResponse;
    /// Prepare a module for bundling
    fn prepare_module(&self, args: &[Value]) -> TaskResponse;
    /// Optimize CSS
    fn optimize_css(&self, args: &[Value]) -> TaskResponse;
    /// Downlevel to ES5
    fn transpile_to_es5(&self, args: &[Value]) -> TaskResponse;
    /// Prerender
    fn prerender_worker(&self, args: &[Value]) -> TaskResponse;
}

/// Run one task against `context`. Unknown names fail the task.
pub fn handle_task(context: &dyn CompilerWorkerContext, task: &TaskMessage) -> TaskResponse {
    let Some(function) = WorkerFunction::from_name(&task.function_name) else {
        return Err(ErrorDescriptor::new(format!(
            "unknown worker function: {}",
            task.function_name
        )));
    };
    let args = task.args.as_slice();
    match function {
        WorkerFunction::Transpile => context.transpile(args),
        WorkerFunction::TransformCssToEsm => context.transform_css_to_esm(args),
        WorkerFunction::PrepareModule => context.prepare_module(args),
        WorkerFunction::OptimizeCss => context.optimize_css(args),
        WorkerFunction::TranspileToEs5 => context.transpile_to_es5(args),
        WorkerFunction::PrerenderWorker => context.prerender_worker(args),
    }
}

/// Context for pools nobody wired a real implementation into.
///
/// Every function fails its task.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredContext;

impl UnconfiguredContext {
    fn unavailable(function: WorkerFunction) -> TaskResponse {
        Err(ErrorDescriptor::new(format!(
            "no worker context configured for {function}"
        )))
    }
}

impl CompilerWorkerContext for UnconfiguredContext {
    fn transpile(&self, _args: &[Value]) -> TaskResponse {
        Self::unavailable(WorkerFunction::Transpile)
    }

    fn transform_css_to_esm(&self, _args: &[Value]) -> TaskResponse {
        Self::unavailable(WorkerFunction::TransformCssToEsm)
    }

    fn prepare_module(&self, _args: &[Value]) -> TaskResponse {
        Self::unavailable(WorkerFunction::PrepareModule)
    }

    fn optimize_css(&self, _args: &[Value]) -> TaskResponse {
        Self::unavailable(WorkerFunction::OptimizeCss)
    }

    fn transpile_to_es5(&self, _args: &[Value]) -> TaskResponse {
        Self::unavailable(WorkerFunction::TranspileToEs5)
    }

    fn prerender_worker(&self, _args: &[Value]) -> TaskResponse {
        Self::unavailable(WorkerFunction::PrerenderWorker)
    }
}
