//! Client instance monitor.
//!
//! Launches the client, finds its player process and log file, tails the log
//! and publishes classified events until the process exits.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::discovery::find_player_pid;
use super::error::MonitorError;
use super::events::{EventBus, EventKind, HandlerId, MonitorEvent};
use crate::config::MonitorConfig;
use crate::shell::{
    get_value, DelegateToggle, MemorySettings, NoopDelegate, ProcessProbe, RunOptions,
    SettingsStore, Shell, SystemProbe, SystemShell, DELEGATE_SETTING_KEY,
};
use crate::timer::sleep_or_cancel;
use crate::watcher::{
    ChangeHandler, IncrementalReader, LineClassifier, LocateError, LogFileLocator, TailWatcher,
    WatcherError,
};

/// Classify `lines` and emit one `gameEvent` per match.
fn publish(classifier: &LineClassifier, bus: &EventBus, lines: &[String]) {
    for info in classifier.classify(lines) {
        bus.emit(&MonitorEvent::GameEvent(info));
    }
}

/// External collaborators the monitor drives.
#[derive(Clone)]
pub struct Collaborators {
    pub shell: Arc<dyn Shell>,
    pub probe: Arc<dyn ProcessProbe>,
    pub settings: Arc<dyn SettingsStore>,
    pub delegate: Arc<dyn DelegateToggle>,
}

impl Collaborators {
    /// Operating-system backed collaborators with the given settings.
    #[must_use]
    pub fn system(settings: MemorySettings) -> Self {
        Self {
            shell: Arc::new(SystemShell::new()),
            probe: Arc::new(SystemProbe),
            settings: Arc::new(settings),
            delegate: Arc::new(NoopDelegate),
        }
    }
}

/// Reads new log lines and publishes their classification.
struct LogProcessor {
    reader: tokio::sync::Mutex<IncrementalReader>,
    classifier: Arc<LineClassifier>,
    bus: EventBus,
    watching: Arc<AtomicBool>,
}

#[async_trait]
impl ChangeHandler for LogProcessor {
    async fn on_change(&self) -> Result<(), WatcherError> {
        if !self.watching.load(Ordering::Acquire) {
            return Ok(());
        }
        let new_lines = self.reader.lock().await.read_new_lines().await?;
        if !new_lines.is_empty() {
            tracing::trace!(count = new_lines.len(), "Processing new log lines");
            publish(&self.classifier, &self.bus, &new_lines);
        }
        Ok(())
    }
}

/// Live monitoring context for one launched client.
#[derive(Debug)]
struct Session {
    client_pid: Option<u32>,
    log_path: PathBuf,
    watching: Arc<AtomicBool>,
    stopped: bool,
    tail: TailWatcher,
    poller: CancellationToken,
}

impl Session {
    /// Stop watching the log. Safe to repeat.
    fn stop_watching(&mut self) {
        self.stopped = true;
        self.watching.store(false, Ordering::Release);
        self.tail.stop();
    }
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Starting {
        cancel: CancellationToken,
        pid: Option<u32>,
    },
    Running(Session),
}

struct Inner {
    config: MonitorConfig,
    collab: Collaborators,
    classifier: Arc<LineClassifier>,
    bus: EventBus,
    phase: Mutex<Phase>,
}

impl Inner {
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whether `phase` runs the unstopped session owning `watching`.
fn owns_live_session(phase: &Phase, watching: &Arc<AtomicBool>) -> bool {
    matches!(phase, Phase::Running(session) if Arc::ptr_eq(&session.watching, watching) && !session.stopped)
}

/// Resets a half-finished start back to idle, including when the start
/// future is dropped.
struct StartReset<'a>(&'a Inner);

impl Drop for StartReset<'_> {
    fn drop(&mut self) {
        let mut phase = self.0.phase();
        if matches!(*phase, Phase::Starting { .. }) {
            *phase = Phase::Idle;
        }
    }
}

/// Monitors one client instance at a time and publishes its events.
///
/// Cloning is cheap; clones share the same session and subscribers.
#[derive(Clone)]
pub struct InstanceMonitor {
    inner: Arc<Inner>,
}

impl InstanceMonitor {
    /// Create a monitor with explicit collaborators.
    #[must_use]
    pub fn new(config: MonitorConfig, collab: Collaborators) -> Self {
        Self::with_classifier(config, collab, LineClassifier::with_builtin_rules())
    }

    /// Create a monitor backed by the operating system.
    #[must_use]
    pub fn from_config(config: MonitorConfig) -> Self {
        let settings = MemorySettings::new(config.settings.clone());
        Self::new(config, Collaborators::system(settings))
    }

    /// Create a monitor with a custom rule set.
    #[must_use]
    pub fn with_classifier(
        config: MonitorConfig,
        collab: Collaborators,
        classifier: LineClassifier,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                collab,
                classifier: Arc::new(classifier),
                bus: EventBus::new(),
                phase: Mutex::new(Phase::Idle),
            }),
        }
    }

    /// Register an event handler.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, handler)
    }

    /// Remove an event handler.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.inner.bus.off(kind, id)
    }

    /// Publish an event to subscribers.
    pub fn emit(&self, event: &MonitorEvent) {
        self.inner.bus.emit(event);
    }

    /// PID of the monitored player process, if a session tracks one.
    #[must_use]
    pub fn client_pid(&self) -> Option<u32> {
        match &*self.inner.phase() {
            Phase::Running(session) => session.client_pid,
            Phase::Starting { pid, .. } => *pid,
            Phase::Idle => None,
        }
    }

    /// Log file of the active session.
    #[must_use]
    pub fn log_path(&self) -> Option<PathBuf> {
        match &*self.inner.phase() {
            Phase::Running(session) => Some(session.log_path.clone()),
            _ => None,
        }
    }

    /// Whether log lines are currently being classified.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        match &*self.inner.phase() {
            Phase::Running(session) => session.watching.load(Ordering::Acquire),
            _ => false,
        }
    }

    /// Whether a session is starting or running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(*self.inner.phase(), Phase::Idle)
    }

    /// Launch the client and start monitoring it.
    ///
    /// With `url`, the launch delegate is disabled and the URL is opened;
    /// otherwise the configured client app is opened. The log's existing
    /// content is classified once as the initial batch.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a session is starting or running.
    /// - `ProcessNotFound` if the player process cannot be found.
    /// - `LogFileNotFound` if no fresh log file appears in time.
    /// - `Cancelled` if [`quit`](Self::quit) or [`abort_start`](Self::abort_start)
    ///   interrupts the start.
    ///
    /// On any error no session is left behind and `start` may be retried.
    pub async fn start(&self, url: Option<&str>) -> Result<(), MonitorError> {
        let cancel = {
            let mut phase = self.inner.phase();
            if !matches!(*phase, Phase::Idle) {
                return Err(MonitorError::AlreadyRunning);
            }
            let cancel = CancellationToken::new();
            *phase = Phase::Starting {
                cancel: cancel.clone(),
                pid: None,
            };
            cancel
        };
        let _reset = StartReset(&self.inner);

        let (mut session, initial) = self.open_session(url, &cancel).await?;
        let watching = Arc::clone(&session.watching);

        let mut phase = self.inner.phase();
        if cancel.is_cancelled() {
            session.stop_watching();
            return Err(MonitorError::Cancelled);
        }
        let pid = session.client_pid;
        let poller = session.poller.clone();
        *phase = Phase::Running(session);
        drop(phase);

        if let Some(pid) = pid {
            self.spawn_poller(pid, poller);
        }

        // The initial batch goes out only once the session is live.
        if owns_live_session(&self.inner.phase(), &watching) {
            publish(&self.inner.classifier, &self.inner.bus, &initial);
        }
        let phase = self.inner.phase();
        if owns_live_session(&phase, &watching) {
            watching.store(true, Ordering::Release);
        }
        Ok(())
    }

    async fn open_session(
        &self,
        url: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(Session, Vec<String>), MonitorError> {
        let inner = &self.inner;
        let client = &inner.config.client;
        let shell = &inner.collab.shell;

        tracing::info!("Opening Roblox instance");
        if let Some(url) = url {
            url::Url::parse(url)?;
            inner.collab.delegate.toggle(false).await?;
            shell
                .run(&client.launch_command, &[url], RunOptions::default())
                .await?;
        } else {
            let app = client.app_path.to_string_lossy();
            shell
                .run(&client.launch_command, &[app.as_ref()], RunOptions::default())
                .await?;
        }

        if !sleep_or_cancel(client.warmup(), cancel).await {
            return Err(MonitorError::Cancelled);
        }

        // Only an explicit boolean true re-enables the delegate.
        if get_value::<bool>(inner.collab.settings.as_ref(), DELEGATE_SETTING_KEY) == Some(true) {
            inner.collab.delegate.toggle(true).await?;
        }

        let pid = find_player_pid(shell.as_ref(), client)
            .await?
            .ok_or_else(|| MonitorError::ProcessNotFound(client.player_process.clone()))?;
        tracing::info!(pid, "Found player process");
        if let Phase::Starting { pid: slot, .. } = &mut *inner.phase() {
            *slot = Some(pid);
        }

        let logs_dir = client.logs_dir();
        let locator = LogFileLocator::new(inner.config.locator.clone());
        let log_path = locator
            .locate(&logs_dir, cancel)
            .await
            .map_err(|e| match e {
                LocateError::NoFreshLogFound {
                    directory,
                    window_secs,
                    ..
                } => MonitorError::LogFileNotFound {
                    directory,
                    window_secs,
                },
                LocateError::Cancelled => MonitorError::Cancelled,
            })?;

        let mut reader = IncrementalReader::new(log_path.clone());
        let initial = reader.seed().await?;

        let watching = Arc::new(AtomicBool::new(false));
        let processor = Arc::new(LogProcessor {
            reader: tokio::sync::Mutex::new(reader),
            classifier: Arc::clone(&inner.classifier),
            bus: inner.bus.clone(),
            watching: Arc::clone(&watching),
        });

        let mut tail = TailWatcher::new(Arc::clone(shell))
            .with_restart_delay(inner.config.monitor.tail_restart_delay());
        tail.start(&log_path, processor.clone()).await?;

        tracing::info!(path = %log_path.display(), "Watching log file");

        let session = Session {
            client_pid: Some(pid),
            log_path,
            watching,
            stopped: false,
            tail,
            poller: CancellationToken::new(),
        };
        Ok((session, initial))
    }

    fn spawn_poller(&self, pid: u32, cancel: CancellationToken) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.monitor.poll_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let probe = Arc::clone(&inner.collab.probe);
                        if !probe.is_alive(pid).await {
                            InstanceMonitor { inner }.handle_exit(pid);
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Tear down the session after the player process died.
    fn handle_exit(&self, pid: u32) {
        let mut session = {
            let mut phase = self.inner.phase();
            match &*phase {
                Phase::Running(session) if session.client_pid == Some(pid) => {}
                _ => return,
            }
            let Phase::Running(mut session) = std::mem::take(&mut *phase) else {
                return;
            };
            session.client_pid = None;
            session.tail.detach_handler();
            session
        };

        self.inner.bus.emit(&MonitorEvent::Exit);
        session.stop_watching();
        session.poller.cancel();
        tracing::info!(pid, "Instance exited, stopping");
    }

    /// Stop watching the log. Idempotent and never fails.
    ///
    /// The client PID stays tracked, so [`quit`](Self::quit) still works and
    /// `exit` still fires when the process dies.
    pub fn cleanup(&self) {
        if let Phase::Running(session) = &mut *self.inner.phase() {
            session.stop_watching();
        }
    }

    /// Cancel an in-flight [`start`](Self::start). Returns whether one was running.
    pub fn abort_start(&self) -> bool {
        match &*self.inner.phase() {
            Phase::Starting { cancel, .. } => {
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel a pending start or stop watching, returning the PID to kill.
    fn wind_down(&self) -> Option<u32> {
        let mut phase = self.inner.phase();
        match &mut *phase {
            Phase::Idle => None,
            Phase::Starting { cancel, pid } => {
                cancel.cancel();
                *pid
            }
            Phase::Running(session) => {
                session.stop_watching();
                session.client_pid
            }
        }
    }

    /// Clean up and force-kill the client process.
    ///
    /// An in-flight start is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if no client PID is known, or a shell error if
    /// the kill command fails.
    pub async fn quit(&self) -> Result<(), MonitorError> {
        let pid = self.wind_down().ok_or(MonitorError::NotStarted)?;

        tracing::info!(pid, "Quitting Roblox");
        let pid_arg = pid.to_string();
        self.inner
            .collab
            .shell
            .run("kill", &["-9", &pid_arg], RunOptions::default())
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for InstanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceMonitor")
            .field("phase", &*self.inner.phase())
            .field("bus", &self.inner.bus)
            .finish_non_exhaustive()
    }
}
