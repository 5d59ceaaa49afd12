use std::time::Duration;

use carebridge_common::draft::DEFAULT_MIN_SIGNIFICANT_CHARS;
use carebridge_common::{DraftKey, DraftSnapshot};
use tokio::sync::watch;

use crate::autosave::{AutoSaveState, DEFAULT_QUIET_PERIOD, RemoteAutoSaveScheduler};
use crate::error::{EditorError, LocalStoreError, RemoteError};
use crate::local::LocalDraftStore;
use crate::reconcile::{DraftReconciler, OpenOutcome, RecoveryPrompt};
use crate::remote::{DurablePostStore, SavedPost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorOptions {
    pub quiet_period: Duration,
    pub min_significant_chars: usize,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            min_significant_chars: DEFAULT_MIN_SIGNIFICANT_CHARS,
        }
    }
}

/// One open document: recovery on open, local drafts and auto-save while editing.
#[derive(Debug)]
pub struct EditorSession<S: LocalDraftStore> {
    reconciler: DraftReconciler<S>,
    autosave: RemoteAutoSaveScheduler,
}

impl<S: LocalDraftStore> EditorSession<S> {
    /// Loads the durable state of `key` and decides what the editor starts from
    pub async fn open<D: DurablePostStore>(
        key: DraftKey,
        remote: D,
        drafts: S,
        options: EditorOptions,
    ) -> Result<(Self, OpenOutcome), EditorError> {
        let durable = match key.post_id() {
            Some(id) => Some(remote.load(id).await?),
            None => None,
        };

        let reconciler =
            DraftReconciler::new(drafts).with_min_significant_chars(options.min_significant_chars);
        let outcome = reconciler.open(key, durable).await?;

        let autosave = RemoteAutoSaveScheduler::spawn(key, remote, reconciler.clone(), options.quiet_period);
        Ok((
            Self {
                reconciler,
                autosave,
            },
            outcome,
        ))
    }

    pub fn accept(&self, prompt: RecoveryPrompt) -> DraftSnapshot {
        self.reconciler.accept(prompt)
    }

    pub async fn discard(&self, prompt: RecoveryPrompt) -> Result<DraftSnapshot, LocalStoreError> {
        self.reconciler.discard(prompt).await
    }

    /// Keeps the edit as local draft, when significant, and restarts the auto-save countdown
    pub fn edit(&self, snapshot: DraftSnapshot) -> Result<(), RemoteError> {
        self.autosave.schedule(snapshot)
    }

    /// Manual save
    pub async fn save(&self, snapshot: DraftSnapshot) -> Result<SavedPost, RemoteError> {
        self.autosave.save_now(snapshot).await
    }

    pub fn key(&self) -> DraftKey {
        self.autosave.key()
    }

    pub fn state(&self) -> AutoSaveState {
        self.autosave.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutoSaveState> {
        self.autosave.subscribe()
    }

    pub async fn close(self) {
        self.autosave.close().await;
    }
}
