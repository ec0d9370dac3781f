//! Process-backed workers
//!
//! Each worker is a child process speaking the line protocol from
//! [`protocol`](super::protocol) over stdin/stdout. A writer thread feeds
//! requests; a reader thread turns reply lines into pool events and reports
//! the exit when stdout closes. [`serve_stdio`] is the child side.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;

use crossbeam::channel::{unbounded, Sender};
use tracing::{debug, warn};

use super::pool::{WorkerEvents, WorkerHandle, WorkerSpawner};
use super::protocol::{TaskMessage, WorkerReply, WorkerRequest};
use super::registry::{handle_task, CompilerWorkerContext};
use super::WorkerError;

/// Spawns one child process per worker.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessSpawner {
    /// Workers run `program` with `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self, events: WorkerEvents) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        let worker_id = events.worker_id();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| WorkerError::Spawn(format!("{}: {}", self.program.display(), e)))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WorkerError::Spawn("worker pipes unavailable".to_string()));
            }
        };

        let (tx, rx) = unbounded::<WorkerRequest>();
        let writer = thread::Builder::new()
            .name(format!("kiln-worker-{}-in", worker_id))
            .spawn(move || {
                let mut stdin = BufWriter::new(stdin);
                for request in rx {
                    let line = match serde_json::to_string(&request) {
                        Ok(line) => line,
                        Err(err) => {
                            warn!(worker_id, error = %err, "failed to encode task");
                            continue;
                        }
                    };
                    if writeln!(stdin, "{}", line).and_then(|_| stdin.flush()).is_err() {
                        break;
                    }
                }
            });

        let reader = thread::Builder::new()
            .name(format!("kiln-worker-{}-out", worker_id))
            .spawn(move || {
                let _guard = events.exit_guard();
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WorkerReply>(&line) {
                        Ok(reply) => {
                            let id = reply.id;
                            events.completed(id, reply.into_response());
                        }
                        Err(err) => warn!(worker_id, error = %err, "malformed worker reply"),
                    }
                }
                debug!(worker_id, "worker process output closed");
            });

        if let Err(err) = writer.and(reader) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WorkerError::Spawn(err.to_string()));
        }

        Ok(Box::new(ProcessWorker {
            child,
            tx: Some(tx),
        }))
    }
}

struct ProcessWorker {
    child: Child,
    tx: Option<Sender<WorkerRequest>>,
}

impl WorkerHandle for ProcessWorker {
    fn send(&mut self, task_id: u64, task: TaskMessage) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker terminated"))?;
        tx.send(WorkerRequest { id: task_id, task })
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "worker input closed"))
    }

    fn terminate(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Serve tasks from stdin until it closes, writing replies to stdout.
///
/// Lines that do not parse as a request are logged and skipped.
pub fn serve_stdio(context: &dyn CompilerWorkerContext) -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "malformed task line");
                continue;
            }
        };
        let reply = WorkerReply::new(request.id, handle_task(context, &request.task));
        let encoded = serde_json::to_string(&reply).map_err(io::Error::other)?;
        writeln!(out, "{}", encoded)?;
        out.flush()?;
    }
    Ok(())
}
