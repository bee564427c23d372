//! Process-isolated conversion worker pool.
//!
//! The pool owns a fixed set of worker processes (the service binary
//! re-invoked with the hidden `worker` subcommand) and hands out one per
//! in-flight conversion. Idle workers sit in a bounded channel whose
//! capacity equals the pool capacity, which gives three properties for
//! free: at most `capacity` conversions run at once, callers beyond
//! capacity queue FIFO on the channel, and an idle worker is reused
//! rather than respawned.
//!
//! Failure policy: a worker that times out or dies mid-request is killed
//! and replaced *before* the error returns, so pool capacity never
//! degrades over time. The conversion itself runs in the child process,
//! so a crash or runaway allocation there cannot touch this process.
//!
//! Lifecycle is `NotStarted → Started → ShuttingDown → Stopped`, with
//! transitions serialized behind a mutex. `convert` is valid only in
//! `Started` and fails fast otherwise — it never hangs on a pool that
//! was not started or was shut down.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use super::proto::{self, WorkerResponse};
use crate::error::{ConvertError, Result};
use crate::types::{ConversionRequest, RawConversion};

/// How the pool spawns its worker processes.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker processes; fixed after `start`.
    pub capacity: usize,
    /// Program to execute for each worker.
    pub worker_program: PathBuf,
    /// Arguments passed to the worker program.
    pub worker_args: Vec<String>,
}

impl PoolConfig {
    /// Spawn workers by re-invoking the current executable with the
    /// `worker` subcommand. This is the production configuration.
    pub fn from_current_exe(capacity: usize) -> std::io::Result<Self> {
        Ok(Self {
            capacity: capacity.max(1),
            worker_program: std::env::current_exe()?,
            worker_args: vec!["worker".to_string()],
        })
    }

    /// Spawn workers with an explicit command. Used by tests to stand in
    /// misbehaving workers.
    pub fn with_command(
        capacity: usize,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            worker_program: program.into(),
            worker_args: args,
        }
    }
}

/// One live worker process plus its pipes.
struct WorkerHandle {
    id: u32,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerHandle {
    /// One framed request/response exchange. Any I/O error here means
    /// the worker is unusable and must be replaced.
    async fn roundtrip(&mut self, frame: &[u8]) -> std::io::Result<WorkerResponse> {
        proto::write_frame_async(&mut self.stdin, frame).await?;
        let body = proto::read_frame_async(&mut self.stdout).await?;
        serde_json::from_slice(&body)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(worker = self.id, error = %e, "failed to kill worker process");
        }
    }
}

enum PoolState {
    NotStarted,
    Started {
        idle_tx: mpsc::Sender<WorkerHandle>,
        idle_rx: Arc<Mutex<mpsc::Receiver<WorkerHandle>>>,
    },
    ShuttingDown,
    Stopped,
}

/// Fixed-capacity pool of isolated conversion worker processes.
pub struct WorkerPool {
    config: PoolConfig,
    state: StdMutex<PoolState>,
    next_id: AtomicU32,
}

impl WorkerPool {
    /// Create a pool in the `NotStarted` state. No processes exist until
    /// [`start`](Self::start) is called.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: StdMutex::new(PoolState::NotStarted),
            next_id: AtomicU32::new(0),
        }
    }

    /// Pool capacity as configured.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Provision all worker processes. Idempotent while started; a pool
    /// that has been shut down cannot be restarted.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().expect("pool state lock poisoned");
        match &*state {
            PoolState::NotStarted => {}
            PoolState::Started { .. } => return Ok(()),
            PoolState::ShuttingDown => {
                return Err(ConvertError::PoolNotRunning("pool is shutting down"))
            }
            PoolState::Stopped => {
                return Err(ConvertError::PoolNotRunning("pool was shut down"))
            }
        }

        let (idle_tx, idle_rx) = mpsc::channel(self.config.capacity);
        for _ in 0..self.config.capacity {
            let worker = self.spawn_worker()?;
            idle_tx
                .try_send(worker)
                .map_err(|_| ConvertError::PoolNotRunning("idle channel sized below capacity"))?;
        }

        tracing::info!(capacity = self.config.capacity, "worker pool started");
        *state = PoolState::Started {
            idle_tx,
            idle_rx: Arc::new(Mutex::new(idle_rx)),
        };
        Ok(())
    }

    /// Static capacity report: configured capacity while started, 0
    /// otherwise. Not a live queue-depth measurement.
    pub fn available_workers(&self) -> usize {
        let state = self.state.lock().expect("pool state lock poisoned");
        match &*state {
            PoolState::Started { .. } => self.config.capacity,
            _ => 0,
        }
    }

    /// Dispatch one conversion to an idle worker under a deadline.
    ///
    /// Suspends the calling task until a worker is free (FIFO beyond
    /// capacity), then performs one framed round trip. On timeout the
    /// worker is killed and replaced and [`ConvertError::Timeout`] is
    /// returned; on a worker crash the worker is replaced and
    /// [`ConvertError::Failed`] is returned. The pool remains usable
    /// after either.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        deadline: Duration,
    ) -> Result<RawConversion> {
        let (idle_tx, idle_rx) = {
            let state = self.state.lock().expect("pool state lock poisoned");
            match &*state {
                PoolState::Started { idle_tx, idle_rx } => (idle_tx.clone(), idle_rx.clone()),
                PoolState::NotStarted => {
                    return Err(ConvertError::PoolNotRunning("pool not started"))
                }
                PoolState::ShuttingDown => {
                    return Err(ConvertError::PoolNotRunning("pool is shutting down"))
                }
                PoolState::Stopped => {
                    return Err(ConvertError::PoolNotRunning("pool was shut down"))
                }
            }
        };

        let frame = serde_json::to_vec(request)
            .map_err(|e| ConvertError::Failed(format!("request serialization failed: {e}")))?;

        let mut worker = {
            let mut rx = idle_rx.lock().await;
            rx.recv()
                .await
                .ok_or(ConvertError::PoolNotRunning("pool is shutting down"))?
        };

        match timeout(deadline, worker.roundtrip(&frame)).await {
            Ok(Ok(WorkerResponse::Success { result })) => {
                let _ = idle_tx.send(worker).await;
                Ok(result)
            }
            Ok(Ok(WorkerResponse::Failure { message })) => {
                // Worker-side logic failed but the process is healthy
                let _ = idle_tx.send(worker).await;
                Err(ConvertError::Failed(message))
            }
            Ok(Err(io_err)) => {
                tracing::warn!(worker = worker.id, error = %io_err, "worker died mid-request, replacing");
                self.replace_worker(worker, &idle_tx).await;
                Err(ConvertError::Failed(format!(
                    "worker process failed: {io_err}"
                )))
            }
            Err(_) => {
                tracing::warn!(
                    worker = worker.id,
                    deadline_secs = deadline.as_secs(),
                    "conversion deadline elapsed, replacing worker"
                );
                self.replace_worker(worker, &idle_tx).await;
                Err(ConvertError::Timeout(deadline.as_secs()))
            }
        }
    }

    /// Drain in-flight work under a grace period, then terminate all
    /// worker processes. Idempotent; a no-op before start.
    pub async fn shutdown(&self, grace: Duration) {
        let channels = {
            let mut state = self.state.lock().expect("pool state lock poisoned");
            match std::mem::replace(&mut *state, PoolState::ShuttingDown) {
                PoolState::Started { idle_tx, idle_rx } => Some((idle_tx, idle_rx)),
                PoolState::NotStarted => {
                    *state = PoolState::NotStarted;
                    None
                }
                PoolState::ShuttingDown => None,
                PoolState::Stopped => {
                    *state = PoolState::Stopped;
                    None
                }
            }
        };
        let Some((idle_tx, idle_rx)) = channels else {
            return;
        };
        drop(idle_tx);

        // Each worker comes back through the idle channel when its
        // current request finishes; reap as they arrive. The grace period
        // covers acquiring the receiver lock as well — a queued convert
        // can hold it in `recv` until its own deadline, and shutdown must
        // not wait that long. Stragglers past the grace period are killed
        // on drop.
        let drained = timeout(grace, async {
            let mut rx = idle_rx.lock().await;
            let mut reaped = 0;
            while reaped < self.config.capacity {
                match rx.recv().await {
                    Some(worker) => {
                        worker.kill().await;
                        reaped += 1;
                    }
                    None => break,
                }
            }
            rx.close();
            reaped
        })
        .await;

        match drained {
            Ok(reaped) => {
                tracing::info!(reaped, capacity = self.config.capacity, "worker pool shut down");
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "shutdown grace expired before all workers drained"
                );
            }
        }
        *self.state.lock().expect("pool state lock poisoned") = PoolState::Stopped;
    }

    fn spawn_worker(&self) -> Result<WorkerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut child = Command::new(&self.config.worker_program)
            .args(&self.config.worker_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(ConvertError::SpawnFailed)?;

        // Pipes are always present with Stdio::piped
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConvertError::PoolNotRunning("worker spawned without stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConvertError::PoolNotRunning("worker spawned without stdout"))?;

        tracing::debug!(worker = id, program = %self.config.worker_program.display(), "spawned worker");
        Ok(WorkerHandle {
            id,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Kill a broken worker and put a fresh one in its slot so capacity
    /// is restored before the failing call returns.
    async fn replace_worker(&self, broken: WorkerHandle, idle_tx: &mpsc::Sender<WorkerHandle>) {
        broken.kill().await;
        match self.spawn_worker() {
            Ok(fresh) => {
                let _ = idle_tx.send(fresh).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "worker respawn failed; pool capacity degraded");
            }
        }
    }
}
