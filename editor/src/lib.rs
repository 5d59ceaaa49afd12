//! Client side of post editing: local drafts, debounced remote auto-save and
//! recovery of unsaved work when a post is opened again.

pub mod autosave;
pub mod error;
pub mod local;
pub mod reconcile;
pub mod remote;
pub mod session;
#[cfg(test)]
mod testing;

pub use autosave::{AutoSaveState, DEFAULT_QUIET_PERIOD, RemoteAutoSaveScheduler};
pub use error::{EditorError, LocalStoreError, RemoteError};
pub use local::{FileDraftStore, InMemoryDraftStore, LocalDraftStore};
pub use reconcile::{DraftReconciler, OpenOutcome, RecoveryPrompt};
pub use remote::{DurablePostStore, HttpPostStore, HttpPostStoreConfig, SavedPost};
pub use session::{EditorOptions, EditorSession};
