// src/exec/isolated.rs

//! Fixed-size pool of worker processes.
//!
//! Each slot is a small driver task owning at most one worker process and
//! running one attempt at a time over the line protocol in
//! [`protocol`](super::protocol). Workers are spawned on first use and
//! replaced after a crash, a timeout or a cancellation; a dead worker only
//! ever affects the attempt it was running.

use std::collections::HashMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{ScheduledTask, TaskId};
use crate::engine::{TaskCompletion, TaskOutcome};
use crate::errors::{DagrunError, Result, TaskError};
use crate::exec::backend::{CompletionFuture, ExecutorBackend};
use crate::exec::protocol::{WorkerReply, WorkerRequest, decode_line, encode_line};

/// Hidden CLI flag that turns the `dagrun` binary into a worker.
pub const WORKER_FLAG: &str = "--worker";

/// Grace period for a worker to exit after its stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How to start a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The running executable with `--worker`.
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe).arg(WORKER_FLAG))
    }
}

/// A live worker process.
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl WorkerProcess {
    fn spawn(command: &WorkerCommand, slot: usize) -> anyhow::Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning worker {}", command.program.display()))?;

        let stdin = child.stdin.take().context("worker stdin not captured")?;
        let stdout = child.stdout.take().context("worker stdout not captured")?;

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(slot, "worker stderr: {}", line);
                }
            });
        }

        info!(slot, pid = child.id(), "worker started");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Send one request and wait for its reply.
    async fn call(&mut self, request: &WorkerRequest) -> anyhow::Result<WorkerReply> {
        let line = encode_line(request)?;
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("writing request to worker")?;
        self.stdin.flush().await.context("flushing worker stdin")?;

        let Some(reply) = self
            .stdout
            .next_line()
            .await
            .context("reading worker reply")?
        else {
            bail!("worker closed its stdout");
        };
        let reply = decode_line(&reply).with_context(|| format!("malformed worker reply: {reply:?}"))?;
        Ok(reply)
    }

    /// Kill the process (if still alive) and reap it.
    async fn terminate(mut self) -> Option<ExitStatus> {
        let _ = self.child.start_kill();
        self.child.wait().await.ok()
    }

    /// Close stdin and give the worker a moment to exit on its own.
    async fn shutdown(self) {
        let WorkerProcess {
            mut child, stdin, ..
        } = self;
        drop(stdin);
        if tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

struct SlotJob {
    task: ScheduledTask,
    deadline: Option<(Instant, Duration)>,
    cancel: CancellationToken,
}

struct SlotDone {
    slot: usize,
    completion: TaskCompletion,
}

struct Slot {
    jobs: mpsc::Sender<SlotJob>,
    handle: JoinHandle<()>,
    busy: bool,
}

pub struct IsolatedBackend {
    command: Arc<WorkerCommand>,
    size: usize,
    slots: Vec<Slot>,
    running: HashMap<TaskId, CancellationToken>,
    done_tx: mpsc::UnboundedSender<SlotDone>,
    done_rx: mpsc::UnboundedReceiver<SlotDone>,
}

impl std::fmt::Debug for IsolatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedBackend")
            .field("command", &self.command)
            .field("size", &self.size)
            .field("spawned", &self.slots.len())
            .field("in_flight", &self.running.len())
            .finish()
    }
}

impl IsolatedBackend {
    /// A pool of at most `size` workers (minimum one). No process is started
    /// until the first isolated dispatch.
    pub fn new(command: WorkerCommand, size: usize) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            command: Arc::new(command),
            size: size.max(1),
            slots: Vec::new(),
            running: HashMap::new(),
            done_tx,
            done_rx,
        }
    }

    fn idle_slot(&mut self) -> Option<usize> {
        if let Some(idx) = self.slots.iter().position(|s| !s.busy) {
            return Some(idx);
        }
        if self.slots.len() >= self.size {
            return None;
        }

        let idx = self.slots.len();
        let (jobs, rx) = mpsc::channel(1);
        let handle = tokio::spawn(slot_loop(
            idx,
            Arc::clone(&self.command),
            rx,
            self.done_tx.clone(),
        ));
        self.slots.push(Slot {
            jobs,
            handle,
            busy: false,
        });
        Some(idx)
    }
}

impl ExecutorBackend for IsolatedBackend {
    fn dispatch(&mut self, task: ScheduledTask) -> Result<()> {
        let idx = self
            .idle_slot()
            .ok_or_else(|| DagrunError::Backend("isolated pool is saturated".to_string()))?;

        let cancel = CancellationToken::new();
        let task_id = task.task_id.clone();
        let job = SlotJob {
            deadline: task.timeout.map(|t| (Instant::now() + t, t)),
            task,
            cancel: cancel.clone(),
        };

        self.slots[idx]
            .jobs
            .try_send(job)
            .map_err(|e| DagrunError::Backend(format!("worker slot {idx} unavailable: {e}")))?;
        self.slots[idx].busy = true;
        self.running.insert(task_id, cancel);
        Ok(())
    }

    fn cancel(&mut self, task_id: &str) {
        if let Some(token) = self.running.get(task_id) {
            token.cancel();
        }
    }

    fn in_flight(&self) -> usize {
        self.running.len()
    }

    fn next_completion(&mut self) -> CompletionFuture<'_> {
        Box::pin(async move {
            if self.running.is_empty() {
                return None;
            }
            let done = self.done_rx.recv().await?;
            if let Some(slot) = self.slots.get_mut(done.slot) {
                slot.busy = false;
            }
            self.running.remove(&done.completion.task_id);
            Some(done.completion)
        })
    }

    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            for token in self.running.values() {
                token.cancel();
            }
            for slot in self.slots.drain(..) {
                drop(slot.jobs);
                if let Err(e) = slot.handle.await {
                    warn!(error = %e, "worker slot task failed");
                }
            }
        })
    }
}

async fn slot_loop(
    slot: usize,
    command: Arc<WorkerCommand>,
    mut jobs: mpsc::Receiver<SlotJob>,
    done: mpsc::UnboundedSender<SlotDone>,
) {
    let mut worker: Option<WorkerProcess> = None;

    while let Some(job) = jobs.recv().await {
        let task_id = job.task.task_id.clone();
        let attempt = job.task.attempt;
        let outcome = run_job(slot, &command, &mut worker, job).await;

        let completion = TaskCompletion {
            task_id,
            attempt,
            outcome,
        };
        if done.send(SlotDone { slot, completion }).is_err() {
            break;
        }
    }

    if let Some(process) = worker.take() {
        process.shutdown().await;
    }
    debug!(slot, "worker slot stopped");
}

enum Exchange {
    Reply(anyhow::Result<WorkerReply>),
    TimedOut(Duration),
    Cancelled,
}

async fn run_job(
    slot: usize,
    command: &WorkerCommand,
    worker: &mut Option<WorkerProcess>,
    job: SlotJob,
) -> TaskOutcome {
    let SlotJob {
        task,
        deadline,
        cancel,
    } = job;

    let mut process = match worker.take() {
        Some(process) => process,
        None => match WorkerProcess::spawn(command, slot) {
            Ok(process) => process,
            Err(e) => {
                warn!(slot, error = %format!("{e:#}"), "failed to start worker");
                return Err(TaskError::crash(format!("{e:#}")));
            }
        },
    };

    let request = WorkerRequest {
        task_id: task.task_id.clone(),
        attempt: task.attempt,
        action: task.action,
    };
    debug!(slot, task = %request.task_id, attempt = request.attempt, "sending attempt to worker");

    let exchange = tokio::select! {
        biased;
        _ = cancel.cancelled() => Exchange::Cancelled,
        limit = expire(deadline) => Exchange::TimedOut(limit),
        reply = process.call(&request) => Exchange::Reply(reply),
    };

    match exchange {
        Exchange::Reply(Ok(reply)) if reply.answers(&request) => {
            *worker = Some(process);
            reply.body.into_outcome()
        }
        Exchange::Reply(Ok(reply)) => {
            process.terminate().await;
            Err(TaskError::crash(format!(
                "reply for {}#{} while running {}#{}",
                reply.task_id, reply.attempt, request.task_id, request.attempt
            )))
        }
        Exchange::Reply(Err(e)) => {
            let status = process.terminate().await;
            let message = match status {
                Some(status) => format!("{e:#} ({status})"),
                None => format!("{e:#}"),
            };
            warn!(slot, task = %request.task_id, %message, "worker crashed");
            Err(TaskError::crash(message))
        }
        Exchange::TimedOut(limit) => {
            info!(slot, task = %request.task_id, "attempt timed out; killing worker");
            process.terminate().await;
            Err(TaskError::timed_out(limit))
        }
        Exchange::Cancelled => {
            info!(slot, task = %request.task_id, "attempt cancelled; killing worker");
            process.terminate().await;
            Err(TaskError::Cancelled)
        }
    }
}

async fn expire(deadline: Option<(Instant, Duration)>) -> Duration {
    match deadline {
        Some((at, limit)) => {
            tokio::time::sleep_until(at).await;
            limit
        }
        None => std::future::pending().await,
    }
}
