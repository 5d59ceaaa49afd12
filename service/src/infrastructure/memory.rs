//! In-memory adapters used by the unit and HTTP tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use carebridge_common::{
    DraftSnapshot, InstitutionLink, LinkId, LinkPairing, LinkRequest, LinkRequestId,
    NewInstitutionLink, PostId, PostStatus, TenantId,
};
use chrono::Utc;
use itertools::Itertools;
use tokio::sync::{Mutex, RwLock};

use crate::domain::RepositoryError;
use crate::domain::notifications::{JobInvoker, JobOutcome};
use crate::domain::posts::{Post, PostRepository, validate_snapshot};
use crate::domain::requests::links::InstitutionLinkRepository;
use crate::domain::requests::{LinkRequestFilter, LinkRequestPatch, LinkRequestRepository};
use crate::infrastructure::AppStateImpl;
use crate::infrastructure::settings::ReviewSettings;

#[derive(Debug, Clone, Default)]
pub struct InMemoryLinkRequests {
    rows: Arc<RwLock<HashMap<LinkRequestId, LinkRequest>>>,
    failing_updates: Arc<RwLock<HashSet<LinkRequestId>>>,
}

impl InMemoryLinkRequests {
    pub async fn insert(&self, request: LinkRequest) -> LinkRequest {
        self.rows.write().await.insert(request.id, request.clone());
        request
    }

    /// Make every following update of `id` fail with a database error
    pub async fn fail_updates_for(&self, id: LinkRequestId) {
        self.failing_updates.write().await.insert(id);
    }

    pub async fn clear_failures(&self) {
        self.failing_updates.write().await.clear();
    }
}

impl LinkRequestRepository for InMemoryLinkRequests {
    async fn find(&self, filter: &LinkRequestFilter) -> Result<Vec<LinkRequest>, RepositoryError> {
        let rows = self.rows.read().await;
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |limit| limit as usize);

        Ok(rows
            .values()
            .filter(|request| filter.matches(request))
            .sorted_by(|a, b| b.created_at.cmp(&a.created_at))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: LinkRequestId) -> Result<LinkRequest, RepositoryError> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update(&self, id: LinkRequestId, patch: LinkRequestPatch) -> Result<LinkRequest, RepositoryError> {
        patch.validate()?;
        if self.failing_updates.read().await.contains(&id) {
            return Err(RepositoryError::DatabaseError("injected failure".to_string()));
        }

        let mut rows = self.rows.write().await;
        let request = rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !request.status.can_transition_to(patch.status) {
            return Err(RepositoryError::Conflict(format!(
                "link request is already {}",
                request.status
            )));
        }

        request.status = patch.status;
        request.review_notes = patch.review_notes;
        request.reviewed_by = patch.reviewed_by;
        request.reviewed_at = Some(patch.reviewed_at.unwrap_or_else(Utc::now));
        Ok(request.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryInstitutionLinks {
    rows: Arc<RwLock<Vec<InstitutionLink>>>,
}

impl InMemoryInstitutionLinks {
    pub async fn insert(&self, link: InstitutionLink) -> InstitutionLink {
        self.rows.write().await.push(link.clone());
        link
    }

    pub async fn all(&self) -> Vec<InstitutionLink> {
        self.rows.read().await.clone()
    }

    async fn modify(
        &self,
        id: LinkId,
        change: impl FnOnce(&mut InstitutionLink),
    ) -> Result<InstitutionLink, RepositoryError> {
        let mut rows = self.rows.write().await;
        let link = rows
            .iter_mut()
            .find(|link| link.id == id)
            .ok_or(RepositoryError::NotFound)?;
        change(link);
        link.updated_at = Utc::now();
        Ok(link.clone())
    }
}

impl InstitutionLinkRepository for InMemoryInstitutionLinks {
    async fn find_for_pairing(&self, pairing: &LinkPairing) -> Result<Vec<InstitutionLink>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|link| link.pairing() == *pairing)
            .sorted_by(|a, b| b.updated_at.cmp(&a.updated_at))
            .cloned()
            .collect())
    }

    async fn find_active(&self, pairing: &LinkPairing) -> Result<Vec<InstitutionLink>, RepositoryError> {
        let links = self.find_for_pairing(pairing).await?;
        Ok(links.into_iter().filter(|link| link.active).collect())
    }

    async fn find_active_by_sources(
        &self,
        request_ids: &[LinkRequestId],
    ) -> Result<Vec<InstitutionLink>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|link| {
                link.active
                    && link
                        .source_request_id
                        .is_some_and(|source| request_ids.contains(&source))
            })
            .cloned()
            .collect())
    }

    async fn create(&self, link: NewInstitutionLink) -> Result<InstitutionLink, RepositoryError> {
        let now = Utc::now();
        let link = InstitutionLink {
            id: LinkId::generate(),
            user_id: link.user_id,
            institution_id: link.institution_id,
            tenant_id: link.tenant_id,
            role: link.role,
            active: true,
            source_request_id: link.source_request_id,
            created_at: now,
            updated_at: now,
        };
        Ok(self.insert(link).await)
    }

    async fn activate(&self, id: LinkId, source_request_id: LinkRequestId) -> Result<InstitutionLink, RepositoryError> {
        self.modify(id, |link| {
            link.active = true;
            link.source_request_id = Some(source_request_id);
        })
        .await
    }

    async fn deactivate(&self, id: LinkId) -> Result<InstitutionLink, RepositoryError> {
        self.modify(id, |link| link.active = false).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPosts {
    rows: Arc<RwLock<HashMap<PostId, Post>>>,
}

impl PostRepository for InMemoryPosts {
    async fn find_by_id(&self, id: PostId) -> Result<Post, RepositoryError> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create(&self, tenant_id: Option<TenantId>, mut snapshot: DraftSnapshot) -> Result<Post, RepositoryError> {
        if let Some(slug) = validate_snapshot(&snapshot)? {
            snapshot.slug = slug.into_inner();
        }
        let now = Utc::now();
        snapshot.saved_at = now;
        let post = Post {
            id: PostId::generate(),
            tenant_id,
            published_at: (snapshot.status == PostStatus::Published).then_some(now),
            snapshot,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update(&self, id: PostId, mut snapshot: DraftSnapshot) -> Result<Post, RepositoryError> {
        if let Some(slug) = validate_snapshot(&snapshot)? {
            snapshot.slug = slug.into_inner();
        }
        let mut rows = self.rows.write().await;
        let post = rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let now = Utc::now();
        snapshot.saved_at = now;
        if snapshot.status == PostStatus::Published && post.published_at.is_none() {
            post.published_at = Some(now);
        }
        post.snapshot = snapshot;
        post.updated_at = now;
        Ok(post.clone())
    }
}

/// Records every invocation and answers with a fixed outcome
#[derive(Debug, Clone)]
pub struct RecordingJobInvoker {
    calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    failure: Option<String>,
}

impl RecordingJobInvoker {
    pub fn succeeding() -> Self {
        Self {
            calls: Arc::default(),
            failure: None,
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            calls: Arc::default(),
            failure: Some(error.to_string()),
        }
    }

    pub async fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().await.clone()
    }
}

impl JobInvoker for RecordingJobInvoker {
    async fn invoke(&self, job_name: &str, payload: serde_json::Value) -> JobOutcome {
        self.calls.lock().await.push((job_name.to_string(), payload));
        match &self.failure {
            Some(error) => JobOutcome::failed(error.clone()),
            None => JobOutcome::succeeded(),
        }
    }
}

/// Application state wired to the in-memory adapters, with handles kept for seeding
#[derive(Clone)]
pub struct TestState {
    pub app: AppStateImpl<InMemoryLinkRequests, InMemoryInstitutionLinks, RecordingJobInvoker, InMemoryPosts>,
    pub requests: InMemoryLinkRequests,
    pub links: InMemoryInstitutionLinks,
    pub posts: InMemoryPosts,
    pub jobs: RecordingJobInvoker,
}

pub fn test_state() -> TestState {
    let requests = InMemoryLinkRequests::default();
    let links = InMemoryInstitutionLinks::default();
    let posts = InMemoryPosts::default();
    let jobs = RecordingJobInvoker::succeeding();
    let app = AppStateImpl::new(
        requests.clone(),
        links.clone(),
        jobs.clone(),
        posts.clone(),
        &ReviewSettings::default(),
    );
    TestState {
        app,
        requests,
        links,
        posts,
        jobs,
    }
}

#[cfg(test)]
mod tests {
    use carebridge_common::test_utils::LinkRequestBuilder;
    use carebridge_common::{RequestStatus, UserId};

    use super::*;

    #[tokio::test]
    async fn update_stamps_review_and_reads_back() {
        let store = InMemoryLinkRequests::default();
        let request = store.insert(LinkRequestBuilder::new().build()).await;
        let reviewer = UserId::generate();

        let updated = store
            .update(
                request.id,
                LinkRequestPatch::review(RequestStatus::Approved, Some("ok".to_string()), Some(reviewer)),
            )
            .await
            .unwrap();

        assert!(updated.reviewed_at.is_some());
        assert_eq!(store.find_by_id(request.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn find_returns_newest_first_and_paginates() {
        let store = InMemoryLinkRequests::default();
        let now = Utc::now();
        for hours in [3, 1, 2] {
            store
                .insert(LinkRequestBuilder::new().created_at(now - chrono::Duration::hours(hours)).build())
                .await;
        }

        let page = store
            .find(&LinkRequestFilter::new().paginate(Some(2), Some(1)))
            .await
            .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].created_at, now - chrono::Duration::hours(2));
        assert_eq!(page[1].created_at, now - chrono::Duration::hours(3));
    }
}
