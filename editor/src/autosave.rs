use std::time::Duration;

use carebridge_common::{DraftKey, DraftSnapshot};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::error::RemoteError;
use crate::local::LocalDraftStore;
use crate::reconcile::DraftReconciler;
use crate::remote::{DurablePostStore, SavedPost};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(3);

/// Observable state of the auto-save of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveState {
    Idle,
    /// A save runs at `deadline` unless another edit arrives first
    Armed { deadline: Instant },
    Saving,
    /// The last save failed. Nothing is retried until the next edit.
    Error(String),
}

type SaveReply = oneshot::Sender<Result<SavedPost, RemoteError>>;

enum Command {
    Schedule(DraftSnapshot),
    Cancel,
    SaveNow(DraftSnapshot, SaveReply),
    Close,
}

/// Debounced, cancellable auto-save of one open document.
///
/// A single task owns the countdown, the in-flight save and the local draft
/// writes of the document. Bursts of edits collapse into one save of the
/// latest snapshot, and at most one save is in flight at any time.
/// Dropping the handle stops the task like [`close`](Self::close) does.
#[derive(Debug)]
pub struct RemoteAutoSaveScheduler {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AutoSaveState>,
    key: watch::Receiver<DraftKey>,
    task: JoinHandle<()>,
}

impl RemoteAutoSaveScheduler {
    pub fn spawn<D, S>(
        key: DraftKey,
        remote: D,
        drafts: DraftReconciler<S>,
        quiet_period: Duration,
    ) -> Self
    where
        D: DurablePostStore,
        S: LocalDraftStore,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(AutoSaveState::Idle);
        let (key_tx, key_rx) = watch::channel(key);

        let worker = AutoSaveWorker {
            remote,
            drafts,
            quiet_period,
            state: state_tx,
            key: key_tx,
            pending: None,
            deadline: None,
            queued_manual: None,
            generation: 0,
            closing: false,
        };
        let task = tokio::spawn(worker.run(receiver));

        Self {
            commands,
            state,
            key: key_rx,
            task,
        }
    }

    /// Records an edit and restarts the quiet period from now
    pub fn schedule(&self, snapshot: DraftSnapshot) -> Result<(), RemoteError> {
        self.send(Command::Schedule(snapshot))
    }

    /// Drops the pending countdown. An in-flight save completes but is not followed by another.
    pub fn cancel(&self) -> Result<(), RemoteError> {
        self.send(Command::Cancel)
    }

    /// Saves right away, after any in-flight save, and replaces the pending countdown
    pub async fn save_now(&self, snapshot: DraftSnapshot) -> Result<SavedPost, RemoteError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::SaveNow(snapshot, reply))?;
        result.await.map_err(|_| RemoteError::Closed)?
    }

    /// Cancels and waits until an in-flight save finished and the task stopped
    pub async fn close(self) {
        // the task may already be gone
        let _ = self.commands.send(Command::Close);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "auto-save task failed");
        }
    }

    pub fn state(&self) -> AutoSaveState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutoSaveState> {
        self.state.clone()
    }

    /// Current identity of the document. Moves from `NewPost` to `Post(id)` after the first save.
    pub fn key(&self) -> DraftKey {
        *self.key.borrow()
    }

    fn send(&self, command: Command) -> Result<(), RemoteError> {
        self.commands.send(command).map_err(|_| RemoteError::Closed)
    }
}

struct InFlight {
    task: JoinHandle<Result<SavedPost, RemoteError>>,
    key: DraftKey,
    generation: u64,
    reply: Option<SaveReply>,
}

struct AutoSaveWorker<D: DurablePostStore, S: LocalDraftStore> {
    remote: D,
    drafts: DraftReconciler<S>,
    quiet_period: Duration,
    state: watch::Sender<AutoSaveState>,
    key: watch::Sender<DraftKey>,
    /// Latest edit not yet handed to a save
    pending: Option<DraftSnapshot>,
    deadline: Option<Instant>,
    queued_manual: Option<(DraftSnapshot, SaveReply)>,
    /// Bumped on every edit
    generation: u64,
    closing: bool,
}

impl<D: DurablePostStore, S: LocalDraftStore> AutoSaveWorker<D, S> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut in_flight: Option<InFlight> = None;

        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = commands.recv(), if !self.closing => {
                    match command {
                        Some(command) => self.handle(command, &mut in_flight).await,
                        None => self.close(),
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() && in_flight.is_none() => {
                    self.deadline = None;
                    if let Some(snapshot) = self.pending.take() {
                        in_flight = Some(self.start_save(snapshot, None));
                    }
                },
                result = wait(&mut in_flight), if in_flight.is_some() => {
                    if let Some(finished) = in_flight.take() {
                        self.finish(finished, result).await;
                    }
                    if let Some((snapshot, reply)) = self.queued_manual.take() {
                        in_flight = Some(self.start_save(snapshot, Some(reply)));
                    }
                },
                else => break,
            }

            if in_flight.is_none() {
                if self.closing {
                    break;
                }
                self.publish_idle_state();
            }
        }

        self.state.send_replace(AutoSaveState::Idle);
        tracing::debug!(key = %self.current_key().storage_key(), "auto-save stopped");
    }

    async fn handle(&mut self, command: Command, in_flight: &mut Option<InFlight>) {
        match command {
            Command::Schedule(snapshot) => {
                self.generation += 1;
                self.keep_local(&self.current_key(), &snapshot).await;
                self.pending = Some(snapshot);
                if in_flight.is_none() {
                    self.arm();
                }
            }
            Command::Cancel => self.cancel(),
            Command::SaveNow(snapshot, reply) => {
                self.generation += 1;
                self.keep_local(&self.current_key(), &snapshot).await;
                self.cancel();
                if in_flight.is_some() {
                    // a newer manual save replaces the queued one
                    if let Some((_, superseded)) = self.queued_manual.replace((snapshot, reply)) {
                        let _ = superseded.send(Err(RemoteError::Closed));
                    }
                } else {
                    *in_flight = Some(self.start_save(snapshot, Some(reply)));
                }
            }
            Command::Close => self.close(),
        }
    }

    fn arm(&mut self) {
        let deadline = Instant::now() + self.quiet_period;
        self.deadline = Some(deadline);
        self.state.send_replace(AutoSaveState::Armed { deadline });
    }

    fn cancel(&mut self) {
        self.deadline = None;
        self.pending = None;
    }

    fn close(&mut self) {
        self.cancel();
        self.closing = true;
        if let Some((_, reply)) = self.queued_manual.take() {
            let _ = reply.send(Err(RemoteError::Closed));
        }
    }

    fn start_save(&mut self, snapshot: DraftSnapshot, reply: Option<SaveReply>) -> InFlight {
        let key = self.current_key();
        let remote = self.remote.clone();
        tracing::debug!(key = %key.storage_key(), "saving post");
        self.state.send_replace(AutoSaveState::Saving);

        InFlight {
            task: tokio::spawn(async move { remote.save(key.post_id(), snapshot).await }),
            key,
            generation: self.generation,
            reply,
        }
    }

    async fn finish(&mut self, finished: InFlight, result: Result<SavedPost, RemoteError>) {
        match &result {
            Ok(saved) => {
                let saved_key = DraftKey::Post(saved.id);
                if finished.key != saved_key {
                    self.key.send_replace(saved_key);
                }

                let newer_edits = self.generation != finished.generation;
                if !newer_edits || finished.key != saved_key {
                    self.forget_local(&finished.key).await;
                }
                if newer_edits && finished.key != saved_key {
                    // later edits were stored under the old key
                    if let Some(snapshot) = self.pending.clone() {
                        self.keep_local(&saved_key, &snapshot).await;
                    }
                }
                tracing::info!(post_id = %saved.id, "post saved");
            }
            Err(e) => {
                tracing::warn!(key = %finished.key.storage_key(), error = %e, "post save failed");
                self.state.send_replace(AutoSaveState::Error(e.to_string()));
            }
        }

        if let Some(reply) = finished.reply {
            let _ = reply.send(result);
        }
        if self.pending.is_some() && self.queued_manual.is_none() {
            self.arm();
        }
    }

    /// Idle unless armed or failed
    fn publish_idle_state(&self) {
        if self.deadline.is_none() {
            self.state.send_if_modified(|state| {
                if matches!(state, AutoSaveState::Armed { .. } | AutoSaveState::Saving) {
                    *state = AutoSaveState::Idle;
                    true
                } else {
                    false
                }
            });
        }
    }

    fn current_key(&self) -> DraftKey {
        *self.key.borrow()
    }

    async fn keep_local(&self, key: &DraftKey, snapshot: &DraftSnapshot) {
        if let Err(e) = self.drafts.remember(key, snapshot).await {
            tracing::warn!(key = %key.storage_key(), error = %e, "failed to store local draft");
        }
    }

    async fn forget_local(&self, key: &DraftKey) {
        if let Err(e) = self.drafts.forget(key).await {
            tracing::warn!(key = %key.storage_key(), error = %e, "failed to clear local draft");
        }
    }
}

async fn wait(in_flight: &mut Option<InFlight>) -> Result<SavedPost, RemoteError> {
    match in_flight {
        Some(flight) => match (&mut flight.task).await {
            Ok(result) => result,
            Err(e) => Err(RemoteError::Transport(format!("save task failed: {}", e))),
        },
        None => std::future::pending().await,
    }
}
