//! Durable store double used by the scheduler and session tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use carebridge_common::{DraftSnapshot, PostId};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::RemoteError;
use crate::remote::{DurablePostStore, SavedPost};

#[derive(Debug, Clone)]
pub struct SaveCall {
    pub id: Option<PostId>,
    pub snapshot: DraftSnapshot,
    pub at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingPostStore {
    calls: Arc<Mutex<Vec<SaveCall>>>,
    posts: Arc<Mutex<HashMap<PostId, DraftSnapshot>>>,
    failure: Arc<Mutex<Option<RemoteError>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Duration,
}

impl RecordingPostStore {
    /// Every save takes `latency` of (virtual) time
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub async fn fail_with(&self, error: Option<RemoteError>) {
        *self.failure.lock().await = error;
    }

    pub async fn insert(&self, snapshot: DraftSnapshot) -> PostId {
        let id = PostId::generate();
        self.posts.lock().await.insert(id, snapshot);
        id
    }

    pub async fn calls(&self) -> Vec<SaveCall> {
        self.calls.lock().await.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl DurablePostStore for RecordingPostStore {
    async fn load(&self, id: PostId) -> Result<DraftSnapshot, RemoteError> {
        self.posts
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn save(&self, id: Option<PostId>, mut snapshot: DraftSnapshot) -> Result<SavedPost, RemoteError> {
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(active, Ordering::SeqCst);
        self.calls.lock().await.push(SaveCall {
            id,
            snapshot: snapshot.clone(),
            at: Instant::now(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failure.lock().await.clone() {
            return Err(error);
        }

        let id = id.unwrap_or_else(PostId::generate);
        snapshot.saved_at = Utc::now();
        let saved_at = snapshot.saved_at;
        self.posts.lock().await.insert(id, snapshot);
        Ok(SavedPost { id, saved_at })
    }
}
