//! Registry of asynchronously spawned shell commands.
//!
//! Commands are fired with [`TaskRegistry::spawn`] and observed with
//! [`TaskRegistry::poll`] (non-blocking) or [`TaskRegistry::await_completion`]
//! (blocking on a fixed interval). The first poll that sees a process exit
//! captures its output and caches the rendered result; every later poll returns
//! that cached string unchanged.

mod output;

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AgentCfg;
use crate::types::{TaskStatus, TaskView, INTERRUPTED_RESULT};
use output::{Captured, Completion, SharedCapture};

const NAME_PREFIX: &str = "task_";
/// How long readers may keep draining after the command exits. A backgrounded
/// child can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

// ── Error type ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("empty command received, no action taken")]
    EmptyCommand,
    #[error("unknown task '{0}'")]
    UnknownTask(String),
    #[error("failed to start command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("await cancelled: agent is shutting down")]
    Cancelled,
}

/// Outcome of a single non-blocking poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Running,
    Done(String),
}

/// Knobs the registry takes from [`AgentCfg`].
#[derive(Debug, Clone)]
pub struct RegistryLimits {
    pub timeout: Option<Duration>,
    pub max_output_bytes: usize,
    pub await_poll: Duration,
}

impl From<&AgentCfg> for RegistryLimits {
    fn from(cfg: &AgentCfg) -> Self {
        Self {
            timeout: cfg.command_timeout(),
            max_output_bytes: cfg.max_output_bytes,
            await_poll: cfg.await_poll(),
        }
    }
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self::from(&AgentCfg::default())
    }
}

// ── Live process ───────────────────────────────────────────────

/// The transient half of a task. Never persisted.
struct LiveProcess {
    pid: Option<u32>,
    waiter: JoinHandle<Completion>,
    spawned_at: Instant,
}

impl LiveProcess {
    /// SIGKILL the whole process group, then drop the waiter (and with it the child).
    /// A finished waiter has reaped the leader, so its group id may be reused.
    fn kill(self) {
        if !self.waiter.is_finished() {
            kill_group(self.pid);
        }
        self.waiter.abort();
    }
}

fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // negative pid addresses the group created by setpgid in spawn
        unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
    }
}

/// Stream readers of one child, filling shared capture buffers.
struct Readers {
    stdout: SharedCapture,
    stderr: SharedCapture,
    handles: Vec<JoinHandle<()>>,
}

impl Readers {
    fn start(child: &mut Child, max: usize) -> Self {
        let (stdout, stderr) = (Captured::shared(), Captured::shared());
        let mut handles = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            handles.push(tokio::spawn(output::capture(pipe, stdout.clone(), max)));
        }
        if let Some(pipe) = child.stderr.take() {
            handles.push(tokio::spawn(output::capture(pipe, stderr.clone(), max)));
        }
        Self { stdout, stderr, handles }
    }

    /// Wait up to `grace` for EOF, then stop reading and hand over what arrived.
    async fn finish(mut self, grace: Duration) -> (Captured, Captured) {
        let drained = tokio::time::timeout(grace, async {
            for handle in self.handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::debug!("output pipes still open after exit, capture cut off");
        }
        (Captured::take(&self.stdout), Captured::take(&self.stderr))
    }
}

impl Drop for Readers {
    // also reached when the waiter itself is aborted by kill
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Wait for the command itself to exit (not for its pipes to close).
async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    readers: Readers,
    timeout: Option<Duration>,
) -> Completion {
    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(waited) => waited,
            Err(_) => {
                kill_group(pid);
                let _ = child.kill().await;
                return Completion::TimedOut(limit);
            }
        },
        None => child.wait().await,
    };
    match waited {
        Ok(status) => {
            let (stdout, stderr) = readers.finish(DRAIN_GRACE).await;
            Completion::Exited { status, stdout, stderr }
        }
        Err(e) => Completion::WaitFailed(e.to_string()),
    }
}

struct TaskEntry {
    view: TaskView,
    process: Option<LiveProcess>,
}

// ── TaskRegistry ───────────────────────────────────────────────

pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskEntry>>,
    next_id: AtomicU64,
    limits: RegistryLimits,
    shutdown: CancellationToken,
}

impl TaskRegistry {
    pub fn new(limits: RegistryLimits, shutdown: CancellationToken) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            limits,
            shutdown,
        }
    }

    /// Rebuild from persisted views. Running views are reclassified as
    /// interrupted, and fresh names continue past the highest restored one.
    pub fn restore(
        views: impl IntoIterator<Item = (String, TaskView)>,
        limits: RegistryLimits,
        shutdown: CancellationToken,
    ) -> Self {
        let mut max_id = 0;
        let tasks: HashMap<String, TaskEntry> = views
            .into_iter()
            .map(|(name, view)| {
                if let Some(n) = name_number(&name) {
                    max_id = max_id.max(n);
                }
                let entry = TaskEntry {
                    view: view.reconcile_after_restart(),
                    process: None,
                };
                (name, entry)
            })
            .collect();
        tracing::debug!(count = tasks.len(), next_id = max_id + 1, "task registry restored");
        Self {
            tasks: Mutex::new(tasks),
            next_id: AtomicU64::new(max_id + 1),
            limits,
            shutdown,
        }
    }

    pub fn limits(&self) -> &RegistryLimits {
        &self.limits
    }

    /// Start `command` under `bash -c` in its own process group and register it.
    /// Returns the new task name without waiting for the command.
    pub async fn spawn(&self, command: &str) -> Result<String, TaskError> {
        if command.trim().is_empty() {
            return Err(TaskError::EmptyCommand);
        }

        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Unix: own process group, so kill reaches everything the command started
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(TaskError::Spawn)?;
        let pid = child.id();
        let readers = Readers::start(&mut child, self.limits.max_output_bytes);
        let waiter = tokio::spawn(supervise(child, pid, readers, self.limits.timeout));

        let name = format!("{NAME_PREFIX}{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let entry = TaskEntry {
            view: TaskView {
                command: command.to_owned(),
                status: TaskStatus::Running,
                result: None,
            },
            process: Some(LiveProcess {
                pid,
                waiter,
                spawned_at: Instant::now(),
            }),
        };
        self.tasks.lock().await.insert(name.clone(), entry);

        tracing::info!(task = %name, pid = ?pid, command = %command, "task spawned");
        Ok(name)
    }

    /// Non-blocking status check. Terminal tasks return their cached result;
    /// the first poll after exit captures and caches it.
    pub async fn poll(&self, name: &str) -> Result<PollStatus, TaskError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks
            .get_mut(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_owned()))?;

        if entry.view.status.is_terminal() {
            return Ok(PollStatus::Done(entry.view.result.clone().unwrap_or_default()));
        }

        match &entry.process {
            Some(process) if !process.waiter.is_finished() => return Ok(PollStatus::Running),
            _ => {}
        }

        let result = match entry.process.take() {
            Some(process) => {
                let elapsed = process.spawned_at.elapsed();
                // finished, so this resolves immediately
                let completion = process
                    .waiter
                    .await
                    .unwrap_or_else(|e| Completion::WaitFailed(e.to_string()));
                let result = output::render(&completion);
                entry.view.status = TaskStatus::Finished;
                tracing::info!(task = %name, elapsed_ms = elapsed.as_millis() as u64, "task finished");
                result
            }
            None => {
                entry.view.status = TaskStatus::Interrupted;
                tracing::warn!(task = %name, "running task had no process handle");
                INTERRUPTED_RESULT.to_owned()
            }
        };
        entry.view.result = Some(result.clone());
        Ok(PollStatus::Done(result))
    }

    /// Poll every `await_poll` until the task reaches a terminal state.
    pub async fn await_completion(&self, name: &str) -> Result<String, TaskError> {
        loop {
            if let PollStatus::Done(result) = self.poll(name).await? {
                return Ok(result);
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep(self.limits.await_poll) => {}
            }
        }
    }

    /// Force-kill a task's process group and forget the task. The signal is
    /// best-effort; the process may already have exited.
    pub async fn kill(&self, name: &str) -> Result<(), TaskError> {
        let entry = self
            .tasks
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_owned()))?;
        if let Some(process) = entry.process {
            process.kill();
        }
        tracing::info!(task = %name, "task killed");
        Ok(())
    }

    /// Kill every live process group. Entries are kept so a final snapshot
    /// still records them as running.
    pub async fn terminate_all(&self) {
        let mut tasks = self.tasks.lock().await;
        let mut count = 0;
        for entry in tasks.values_mut() {
            if let Some(process) = entry.process.take() {
                process.kill();
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!(count, "terminated running tasks");
        }
    }

    /// Value-only view of every task, ordered by name.
    pub async fn snapshot(&self) -> BTreeMap<String, TaskView> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.view.clone()))
            .collect()
    }

    /// Tasks in spawn order.
    pub async fn list(&self) -> Vec<(String, TaskView)> {
        let mut all: Vec<(String, TaskView)> = self.snapshot().await.into_iter().collect();
        all.sort_by_key(|(name, _)| name_number(name).unwrap_or(u64::MAX));
        all
    }

    pub async fn running_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|e| e.view.status == TaskStatus::Running)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

fn name_number(name: &str) -> Option<u64> {
    name.strip_prefix(NAME_PREFIX)?.parse().ok()
}

// ── Tests ──────────────────────────────────────────────────────
