//! Supervised `tail` process for a log file.
//!
//! The watcher spawns `tail` against the log file, treats every output line
//! as a change notification, and respawns the process if it dies while the
//! watcher is still running.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::WatcherError;
use crate::config::MIN_LOOP_INTERVAL;
use crate::shell::{ProcessEvent, RunOptions, Shell, SpawnedProcess};
use crate::timer::sleep_or_cancel;

/// Default wait before respawning a dead tail process.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(250);

/// Reacts to a change notification from the tail process.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_change(&self) -> Result<(), WatcherError>;
}

/// Lifecycle state of a [`TailWatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TailState {
    #[default]
    Stopped,
    Tailing,
    Restarting,
}

/// At-most-one-in-flight flag for change processing.
///
/// Notifications that arrive while a pass holds the permit are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProcessingGuard {
    busy: Arc<AtomicBool>,
}

impl ProcessingGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the permit, or `None` if a pass is already running.
    #[must_use]
    pub fn try_acquire(&self) -> Option<ProcessingPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Whether a pass currently holds the permit.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the [`ProcessingGuard`] on drop, including on panic.
#[derive(Debug)]
pub struct ProcessingPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for ProcessingPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Command line used to tail `path`.
#[must_use]
pub fn tail_args(path: &Path) -> Vec<String> {
    vec![
        "-n".to_string(),
        "0".to_string(),
        "-f".to_string(),
        path.to_string_lossy().into_owned(),
    ]
}

/// `pkill -f` pattern matching any tail started by [`tail_args`] under `dir`.
#[must_use]
pub fn stale_tail_pattern(dir: &Path) -> String {
    format!("tail -n 0 -f {}", dir.to_string_lossy())
}

type HandlerSlot = Arc<RwLock<Option<Arc<dyn ChangeHandler>>>>;

/// Everything the supervision task needs, shared with the owning watcher.
struct TailContext {
    shell: Arc<dyn Shell>,
    path: PathBuf,
    stale_pattern: String,
    restart_delay: Duration,
    state: Arc<Mutex<TailState>>,
    handler: HandlerSlot,
    guard: ProcessingGuard,
    cancel: CancellationToken,
}

impl TailContext {
    fn set_state(&self, new_state: TailState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?new_state, "Tail state transition");
        *state = new_state;
    }

    async fn kill_stale(&self) {
        let result = self
            .shell
            .run(
                "pkill",
                &["-f", &self.stale_pattern],
                RunOptions::default().skip_stderr(),
            )
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Stale tail cleanup failed");
        }
    }

    fn spawn_tail(&self) -> Result<SpawnedProcess, WatcherError> {
        let args = tail_args(&self.path);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let process = self.shell.spawn("tail", &args)?;
        tracing::info!(pid = ?process.pid(), id = %process.id(), "Logs watcher started");
        Ok(process)
    }

    /// Dispatch a change notification unless a pass is already running.
    fn notify(&self) {
        let Some(permit) = self.guard.try_acquire() else {
            tracing::trace!("Change dropped, processing already in flight");
            return;
        };
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(handler) = handler else {
            return;
        };

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = handler.on_change().await {
                tracing::warn!(error = %e, "Error processing log file");
            }
        });
    }

    /// Forward notifications until the process exits or the watcher stops.
    ///
    /// Returns `true` if the process died on its own.
    async fn pump(&self, process: &mut SpawnedProcess) -> bool {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    process.kill();
                    return false;
                }
                event = process.next_event() => match event {
                    Some(ProcessEvent::Output(_)) => self.notify(),
                    Some(ProcessEvent::Exit { code }) => {
                        tracing::warn!(code = ?code, "Logs watcher exited");
                        return true;
                    }
                    None => {
                        tracing::warn!("Logs watcher channel closed");
                        return true;
                    }
                },
            }
        }
    }

    async fn supervise(self, mut process: SpawnedProcess) {
        loop {
            if !self.pump(&mut process).await {
                break;
            }

            self.set_state(TailState::Restarting);
            // Terminate the old handle before a replacement can exist.
            process.kill();
            drop(process);

            if !sleep_or_cancel(self.restart_delay, &self.cancel).await {
                break;
            }

            tracing::info!(path = %self.path.display(), "Restarting logs watcher");
            self.kill_stale().await;
            if self.cancel.is_cancelled() {
                break;
            }
            match self.spawn_tail() {
                Ok(next) => {
                    process = next;
                    self.set_state(TailState::Tailing);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to respawn logs watcher, retrying");
                    process = match self.respawn_until_ok().await {
                        Some(p) => p,
                        None => break,
                    };
                    self.set_state(TailState::Tailing);
                }
            }
        }

        self.set_state(TailState::Stopped);
    }

    async fn respawn_until_ok(&self) -> Option<SpawnedProcess> {
        loop {
            if !sleep_or_cancel(self.restart_delay, &self.cancel).await {
                return None;
            }
            match self.spawn_tail() {
                Ok(p) => return Some(p),
                Err(e) => tracing::warn!(error = %e, "Failed to respawn logs watcher, retrying"),
            }
        }
    }
}

/// Supervises one `tail` process and turns its output into change callbacks.
pub struct TailWatcher {
    shell: Arc<dyn Shell>,
    restart_delay: Duration,
    state: Arc<Mutex<TailState>>,
    handler: HandlerSlot,
    guard: ProcessingGuard,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl TailWatcher {
    /// Create a stopped watcher.
    #[must_use]
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self {
            shell,
            restart_delay: DEFAULT_RESTART_DELAY,
            state: Arc::new(Mutex::new(TailState::Stopped)),
            handler: Arc::new(RwLock::new(None)),
            guard: ProcessingGuard::new(),
            cancel: None,
            task: None,
        }
    }

    /// Set the wait before respawning a dead tail process.
    ///
    /// Clamped to [`MIN_LOOP_INTERVAL`] so a failing spawn cannot spin.
    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay.max(MIN_LOOP_INTERVAL);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TailState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The guard serialising change processing.
    #[must_use]
    pub fn guard(&self) -> &ProcessingGuard {
        &self.guard
    }

    /// Start tailing `path`, calling `handler` on every change.
    ///
    /// Any leftover tail watching `path`'s directory is killed first.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::AlreadyTailing` if the watcher is running, or
    /// a shell error if the first tail process cannot be spawned.
    pub async fn start(
        &mut self,
        path: &Path,
        handler: Arc<dyn ChangeHandler>,
    ) -> Result<(), WatcherError> {
        if self.state() != TailState::Stopped || self.task.is_some() {
            return Err(WatcherError::AlreadyTailing);
        }

        // Fresh shared state per run, so a previous task winding down cannot
        // overwrite it.
        self.state = Arc::new(Mutex::new(TailState::Stopped));
        self.handler = Arc::new(RwLock::new(None));
        self.guard = ProcessingGuard::new();

        let dir = path.parent().unwrap_or(path);
        let cancel = CancellationToken::new();
        let ctx = TailContext {
            shell: Arc::clone(&self.shell),
            path: path.to_path_buf(),
            stale_pattern: stale_tail_pattern(dir),
            restart_delay: self.restart_delay,
            state: Arc::clone(&self.state),
            handler: Arc::clone(&self.handler),
            guard: self.guard.clone(),
            cancel: cancel.clone(),
        };

        ctx.kill_stale().await;
        let process = ctx.spawn_tail()?;

        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
        ctx.set_state(TailState::Tailing);
        self.cancel = Some(cancel);
        self.task = Some(tokio::spawn(ctx.supervise(process)));
        Ok(())
    }

    /// Stop receiving change callbacks while leaving the process running.
    pub fn detach_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Stop the watcher and kill the tail process. Never fails.
    pub fn stop(&mut self) {
        self.detach_handler();
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        // The task finishes on its own once it sees the cancellation.
        self.task.take();
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = TailState::Stopped;
    }
}

impl Drop for TailWatcher {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for TailWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailWatcher")
            .field("state", &self.state())
            .field("restart_delay", &self.restart_delay)
            .finish_non_exhaustive()
    }
}
