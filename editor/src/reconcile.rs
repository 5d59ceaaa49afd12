use carebridge_common::draft::DEFAULT_MIN_SIGNIFICANT_CHARS;
use carebridge_common::{DraftKey, DraftSnapshot};
use chrono::Utc;

use crate::error::LocalStoreError;
use crate::local::LocalDraftStore;

/// Unsaved local work found when a document was opened
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPrompt {
    pub key: DraftKey,
    pub local: DraftSnapshot,
    pub durable: Option<DraftSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    /// The caller must choose between the local draft and the durable state
    Recover(RecoveryPrompt),
    Ready(DraftSnapshot),
}

/// Decides what an opened document starts from and owns the rules for
/// writing local drafts.
///
/// Local and durable snapshots are never merged: the user either accepts the
/// local draft or discards it.
#[derive(Debug, Clone)]
pub struct DraftReconciler<S: LocalDraftStore> {
    store: S,
    min_significant_chars: usize,
}

impl<S: LocalDraftStore> DraftReconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            min_significant_chars: DEFAULT_MIN_SIGNIFICANT_CHARS,
        }
    }

    pub fn with_min_significant_chars(mut self, min_significant_chars: usize) -> Self {
        self.min_significant_chars = min_significant_chars;
        self
    }

    pub async fn open(
        &self,
        key: DraftKey,
        durable: Option<DraftSnapshot>,
    ) -> Result<OpenOutcome, LocalStoreError> {
        let local = match self.store.get(&key).await {
            Ok(local) => local,
            Err(LocalStoreError::Corrupt(e)) => {
                tracing::warn!(key = %key.storage_key(), error = %e, "discarding unreadable local draft");
                self.store.clear(&key).await?;
                None
            }
            Err(e) => return Err(e),
        };

        match (local, durable) {
            // left behind by a save whose cleanup did not run
            (Some(local), Some(durable)) if local.has_same_content(&durable) => {
                tracing::debug!(key = %key.storage_key(), "clearing local draft already saved");
                self.store.clear(&key).await?;
                Ok(OpenOutcome::Ready(durable))
            }
            (Some(local), durable) => Ok(OpenOutcome::Recover(RecoveryPrompt { key, local, durable })),
            (None, durable) => Ok(OpenOutcome::Ready(
                durable.unwrap_or_else(|| DraftSnapshot::blank(Utc::now())),
            )),
        }
    }

    /// Continue from the local draft. Both stores stay untouched until the next save.
    pub fn accept(&self, prompt: RecoveryPrompt) -> DraftSnapshot {
        prompt.local
    }

    /// Drop the local draft and continue from the durable state, or a blank post
    pub async fn discard(&self, prompt: RecoveryPrompt) -> Result<DraftSnapshot, LocalStoreError> {
        self.store.clear(&prompt.key).await?;
        Ok(prompt
            .durable
            .unwrap_or_else(|| DraftSnapshot::blank(Utc::now())))
    }

    /// Writes the local draft when it is significant and clears it otherwise.
    /// The stored copy is stamped with the time of the write.
    /// Returns whether a draft is now stored.
    pub async fn remember(&self, key: &DraftKey, snapshot: &DraftSnapshot) -> Result<bool, LocalStoreError> {
        if snapshot.is_significant(self.min_significant_chars) {
            let draft = DraftSnapshot {
                saved_at: Utc::now(),
                ..snapshot.clone()
            };
            self.store.set(key, &draft).await?;
            Ok(true)
        } else {
            self.store.clear(key).await?;
            Ok(false)
        }
    }

    pub async fn forget(&self, key: &DraftKey) -> Result<(), LocalStoreError> {
        self.store.clear(key).await
    }
}

#[cfg(test)]
mod tests {
    use carebridge_common::PostId;
    use chrono::Duration;

    use super::*;
    use crate::local::InMemoryDraftStore;

    fn snapshot(title: &str, content: &str) -> DraftSnapshot {
        let mut snapshot = DraftSnapshot::blank(Utc::now());
        snapshot.title = title.to_string();
        snapshot.content = content.to_string();
        snapshot
    }

    fn reconciler() -> (InMemoryDraftStore, DraftReconciler<InMemoryDraftStore>) {
        let store = InMemoryDraftStore::default();
        (store.clone(), DraftReconciler::new(store))
    }

    #[tokio::test]
    async fn nothing_local_opens_durable_or_blank() {
        let (_, reconciler) = reconciler();
        let durable = snapshot("Saved", "body");

        let outcome = reconciler
            .open(DraftKey::Post(PostId::generate()), Some(durable.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, OpenOutcome::Ready(durable));

        let OpenOutcome::Ready(blank) = reconciler.open(DraftKey::NewPost, None).await.unwrap() else {
            panic!("expected a blank post");
        };
        assert_eq!(blank.text_len(), 0);
    }

    #[tokio::test]
    async fn newer_local_draft_prompts_recovery() {
        let (store, reconciler) = reconciler();
        let key = DraftKey::Post(PostId::generate());
        let mut durable = snapshot("Saved", "old body");
        durable.saved_at = Utc::now() - Duration::minutes(5);
        let local = snapshot("Saved", "new body that was never saved");
        store.set(&key, &local).await.unwrap();

        let OpenOutcome::Recover(prompt) = reconciler.open(key, Some(durable.clone())).await.unwrap() else {
            panic!("expected a recovery prompt");
        };
        assert_eq!(prompt.durable, Some(durable));
        assert_eq!(reconciler.accept(prompt), local);
        assert!(store.contains(&key).await);
    }

    #[tokio::test]
    async fn local_draft_of_a_new_post_prompts_recovery() {
        let (store, reconciler) = reconciler();
        store
            .set(&DraftKey::NewPost, &snapshot("Unsaved idea", "notes"))
            .await
            .unwrap();

        let outcome = reconciler.open(DraftKey::NewPost, None).await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Recover(_)));
    }

    #[tokio::test]
    async fn discard_clears_local_and_returns_durable() {
        let (store, reconciler) = reconciler();
        let key = DraftKey::Post(PostId::generate());
        let mut durable = snapshot("Saved", "body");
        durable.saved_at = Utc::now() - Duration::minutes(5);
        store.set(&key, &snapshot("Local", "changes")).await.unwrap();

        let OpenOutcome::Recover(prompt) = reconciler.open(key, Some(durable.clone())).await.unwrap() else {
            panic!("expected a recovery prompt");
        };
        assert_eq!(reconciler.discard(prompt).await.unwrap(), durable);
        assert!(!store.contains(&key).await);

        let outcome = reconciler.open(key, Some(durable.clone())).await.unwrap();
        assert_eq!(outcome, OpenOutcome::Ready(durable));
    }

    #[tokio::test]
    async fn already_saved_local_draft_is_cleared_silently() {
        let (store, reconciler) = reconciler();
        let key = DraftKey::Post(PostId::generate());
        let durable = snapshot("Saved", "same body");
        let mut local = durable.clone();
        local.saved_at = Utc::now() + Duration::minutes(1);
        store.set(&key, &local).await.unwrap();

        let outcome = reconciler.open(key, Some(durable.clone())).await.unwrap();

        assert_eq!(outcome, OpenOutcome::Ready(durable));
        assert!(!store.contains(&key).await);
    }

    #[tokio::test]
    async fn differing_local_draft_prompts_whatever_its_timestamp() {
        let (store, reconciler) = reconciler();
        let key = DraftKey::Post(PostId::generate());
        let mut local = snapshot("Old", "draft written on a slow clock");
        local.saved_at = Utc::now() - Duration::hours(1);
        store.set(&key, &local).await.unwrap();
        let durable = snapshot("Saved", "later");

        let outcome = reconciler.open(key, Some(durable)).await.unwrap();

        assert!(matches!(outcome, OpenOutcome::Recover(prompt) if prompt.local == local));
        assert!(store.contains(&key).await);
    }

    #[tokio::test]
    async fn remembered_draft_is_stamped_at_write_time() {
        let (store, reconciler) = reconciler();
        let key = DraftKey::Post(PostId::generate());
        let mut edited = snapshot("Saved", "edited body");
        edited.saved_at = Utc::now() - Duration::days(3);

        let before = Utc::now();
        assert!(reconciler.remember(&key, &edited).await.unwrap());

        let stored = store.get(&key).await.unwrap().unwrap();
        assert!(stored.saved_at >= before);
        assert!(stored.has_same_content(&edited));
    }

    #[tokio::test]
    async fn unreadable_local_draft_is_treated_as_absent() {
        let (store, reconciler) = reconciler();
        store.put_raw(&DraftKey::NewPost, "{\"title\":").await;

        let outcome = reconciler.open(DraftKey::NewPost, None).await.unwrap();

        assert!(matches!(outcome, OpenOutcome::Ready(_)));
        assert!(!store.contains(&DraftKey::NewPost).await);
    }

    #[tokio::test]
    async fn trivial_content_is_never_stored() {
        let (store, reconciler) = reconciler();

        let stored = reconciler
            .remember(&DraftKey::NewPost, &snapshot("Hi", ""))
            .await
            .unwrap();

        assert!(!stored);
        assert!(!store.contains(&DraftKey::NewPost).await);
        let outcome = reconciler.open(DraftKey::NewPost, None).await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn shrinking_below_threshold_clears_the_draft() {
        let (store, reconciler) = reconciler();
        let key = DraftKey::NewPost;

        assert!(reconciler.remember(&key, &snapshot("A real title", "")).await.unwrap());
        assert!(store.contains(&key).await);
        assert!(!reconciler.remember(&key, &snapshot("A", "")).await.unwrap());
        assert!(!store.contains(&key).await);
    }
}
