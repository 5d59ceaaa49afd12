use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use carebridge_common::{InstitutionLink, LinkRequest, LinkRequestId, RequestStatus, ReviewDecision};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use nutype::nutype;

use crate::domain::notifications::{JobInvoker, LinkNotification, NotificationDispatcher};
use crate::domain::requests::duplicates::DuplicateDetector;
use crate::domain::requests::links::InstitutionLinkRepository;
use crate::domain::requests::{LinkRequestFilter, LinkRequestPatch, LinkRequestRepository};
use crate::domain::{RepositoryError, RequestContext};

/// Largest number of requests one batch review may touch
pub const MAX_BATCH_SIZE: usize = 200;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Age a link attributed to a pending request must reach before the request
/// is treated as an interrupted approval. Younger links belong to approvals
/// that may still be running.
pub const DEFAULT_REPAIR_GRACE: Duration = Duration::from_secs(60);

#[nutype(
    sanitize(trim),
    validate(len_char_max = 2000),
    derive(Clone, Debug, AsRef, PartialEq)
)]
pub struct ReviewNotes(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("link request {0} not found")]
    NotFound(LinkRequestId),
    #[error("link request {id} was already {status}")]
    Conflict {
        id: LinkRequestId,
        status: RequestStatus,
    },
    #[error("invalid review: {0}")]
    Invalid(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Fresh state after a single review
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResult {
    pub request: LinkRequest,
    /// Link created, reactivated or reused by an approval
    pub link: Option<InstitutionLink>,
    /// The pairing was already actively linked when the approval started
    pub duplicate_detected: bool,
    /// Set when the approval succeeded but the notification job did not
    pub notification_warning: Option<String>,
}

/// Per-request outcome of a batch. Failures of single items never abort the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReviewResult {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: BTreeMap<LinkRequestId, Result<ReviewResult, ReviewError>>,
}

impl BatchReviewResult {
    fn from_outcomes(outcomes: Vec<(LinkRequestId, Result<ReviewResult, ReviewError>)>) -> Self {
        let succeeded = outcomes.iter().filter(|(_, outcome)| outcome.is_ok()).count();
        let failed = outcomes.len() - succeeded;
        Self {
            succeeded,
            failed,
            outcomes: outcomes.into_iter().collect(),
        }
    }

    pub fn is_partial_failure(&self) -> bool {
        self.succeeded > 0 && self.failed > 0
    }
}

struct AttachedLink {
    link: InstitutionLink,
    duplicate: bool,
    /// The link was not active before this approval
    newly_activated: bool,
}

/// Sole writer of request status transitions and sole creator of institution links.
///
/// Approval writes the link first and the request status second. A crash in
/// between leaves a pending request with an active link attributed to it;
/// `load` and `reconcile_pending` complete such approvals once the link is
/// older than the repair grace period.
#[derive(Debug, Clone)]
pub struct ReviewCoordinator<R, L, J>
where
    R: LinkRequestRepository,
    L: InstitutionLinkRepository,
    J: JobInvoker,
{
    requests: R,
    links: L,
    duplicates: DuplicateDetector<L>,
    notifications: NotificationDispatcher<J>,
    batch_concurrency: usize,
    repair_grace: Duration,
}

impl<R, L, J> ReviewCoordinator<R, L, J>
where
    R: LinkRequestRepository,
    L: InstitutionLinkRepository,
    J: JobInvoker,
{
    pub fn new(requests: R, links: L, invoker: J) -> Self {
        Self {
            requests,
            duplicates: DuplicateDetector::new(links.clone()),
            links,
            notifications: NotificationDispatcher::new(invoker),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            repair_grace: DEFAULT_REPAIR_GRACE,
        }
    }

    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency.max(1);
        self
    }

    pub fn with_repair_grace(mut self, repair_grace: Duration) -> Self {
        self.repair_grace = repair_grace;
        self
    }

    /// Read one request, completing an interrupted approval if one is detected
    pub async fn load(&self, ctx: &RequestContext, id: LinkRequestId) -> Result<LinkRequest, ReviewError> {
        let request = self
            .requests
            .find_by_id(id)
            .await
            .map_err(for_request(id))?;

        if !ctx.can_see(request.tenant_id) {
            return Err(ReviewError::NotFound(id));
        }
        if !request.is_pending() {
            return Ok(request);
        }

        let attributed = self.links.find_active_by_sources(&[id]).await?;
        match attributed.into_iter().next() {
            Some(link) if self.is_abandoned(&link) => self.complete_interrupted_approval(request, link).await,
            _ => Ok(request),
        }
    }

    pub async fn review_one(
        &self,
        ctx: &RequestContext,
        id: LinkRequestId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<ReviewResult, ReviewError> {
        let notes = normalize_notes(notes)?;
        let request = self.load(ctx, id).await?;
        if !request.is_pending() {
            return Err(ReviewError::Conflict {
                id,
                status: request.status,
            });
        }

        match decision {
            ReviewDecision::Approve => self.approve(ctx, request, notes).await,
            ReviewDecision::Reject => self.reject(ctx, request, notes).await,
        }
    }

    /// Review every distinct id independently, at most `batch_concurrency` at a time
    pub async fn review_batch(
        &self,
        ctx: &RequestContext,
        ids: impl IntoIterator<Item = LinkRequestId>,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<BatchReviewResult, ReviewError> {
        let ids = ids.into_iter().unique().collect_vec();
        if ids.is_empty() {
            return Err(ReviewError::Invalid("no link requests selected".to_string()));
        }
        if ids.len() > MAX_BATCH_SIZE {
            return Err(ReviewError::Invalid(format!(
                "at most {} link requests can be reviewed at once, got {}",
                MAX_BATCH_SIZE,
                ids.len()
            )));
        }
        let notes = normalize_notes(notes)?;

        let outcomes = stream::iter(ids)
            .map(|id| {
                let notes = notes.clone();
                async move { (id, self.review_one(ctx, id, decision, notes).await) }
            })
            .buffer_unordered(self.batch_concurrency)
            .collect::<Vec<_>>()
            .await;

        let result = BatchReviewResult::from_outcomes(outcomes);
        tracing::info!(
            ?decision,
            succeeded = result.succeeded,
            failed = result.failed,
            "batch review finished"
        );
        Ok(result)
    }

    /// Complete every pending request of the caller's tenant that already has
    /// an active link attributed to it. Returns the repaired requests.
    pub async fn reconcile_pending(&self, ctx: &RequestContext) -> Result<Vec<LinkRequest>, ReviewError> {
        let filter = LinkRequestFilter::new()
            .with_status(RequestStatus::Pending)
            .with_tenant(ctx.tenant_id);
        let pending = self.requests.find(&filter).await?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let ids = pending.iter().map(|request| request.id).collect_vec();
        let mut by_source: HashMap<LinkRequestId, InstitutionLink> = self
            .links
            .find_active_by_sources(&ids)
            .await?
            .into_iter()
            .filter_map(|link| link.source_request_id.map(|source| (source, link)))
            .collect();

        let mut repaired = Vec::new();
        let mut failed = 0;
        for request in pending {
            let Some(link) = by_source.remove(&request.id) else {
                continue;
            };
            if !self.is_abandoned(&link) {
                tracing::debug!(request_id = %request.id, link_id = %link.id, "approval may still be running");
                continue;
            }

            let id = request.id;
            match self.complete_interrupted_approval(request, link).await {
                Ok(request) if request.status == RequestStatus::Approved => repaired.push(request),
                Ok(_) => {}
                Err(err) => {
                    failed += 1;
                    tracing::error!(request_id = %id, error = %err, "failed to complete interrupted approval");
                }
            }
        }

        tracing::info!(repaired = repaired.len(), failed, "reconciliation pass finished");
        Ok(repaired)
    }

    async fn approve(
        &self,
        ctx: &RequestContext,
        request: LinkRequest,
        notes: Option<String>,
    ) -> Result<ReviewResult, ReviewError> {
        let id = request.id;
        let attached = self.attach_link(&request).await.map_err(for_request(id))?;

        let patch = LinkRequestPatch::review(RequestStatus::Approved, notes, ctx.actor_id);
        let approved = match self.requests.update(id, patch).await {
            Ok(approved) => approved,
            Err(RepositoryError::Conflict(_)) => {
                let current = match self.requests.find_by_id(id).await {
                    Ok(current) => current,
                    Err(err) => {
                        self.release_link(&request, &attached).await;
                        return Err(for_request(id)(err));
                    }
                };
                if attached.newly_activated && completed_by_reconciliation(&current, &attached.link) {
                    // the repair already notified the user
                    tracing::info!(request_id = %id, link_id = %attached.link.id, "approval completed by reconciliation");
                    return Ok(ReviewResult {
                        request: current,
                        link: Some(attached.link),
                        duplicate_detected: attached.duplicate,
                        notification_warning: None,
                    });
                }
                self.release_link(&request, &attached).await;
                return Err(ReviewError::Conflict {
                    id,
                    status: current.status,
                });
            }
            Err(err) => {
                self.release_link(&request, &attached).await;
                return Err(for_request(id)(err));
            }
        };

        let notification_warning = self.notify(&approved, &attached.link).await;

        tracing::info!(
            request_id = %id,
            link_id = %attached.link.id,
            duplicate = attached.duplicate,
            "link request approved"
        );

        Ok(ReviewResult {
            request: approved,
            link: Some(attached.link),
            duplicate_detected: attached.duplicate,
            notification_warning,
        })
    }

    async fn reject(
        &self,
        ctx: &RequestContext,
        request: LinkRequest,
        notes: Option<String>,
    ) -> Result<ReviewResult, ReviewError> {
        let id = request.id;
        let patch = LinkRequestPatch::review(RequestStatus::Rejected, notes, ctx.actor_id);
        let rejected = match self.requests.update(id, patch).await {
            Ok(rejected) => rejected,
            Err(RepositoryError::Conflict(_)) => return Err(self.conflict(id).await),
            Err(err) => return Err(for_request(id)(err)),
        };

        tracing::info!(request_id = %id, "link request rejected");

        Ok(ReviewResult {
            request: rejected,
            link: None,
            duplicate_detected: false,
            notification_warning: None,
        })
    }

    /// Reuse an active link, reactivate an inactive one or create a new one.
    /// Duplicates never block the approval.
    async fn attach_link(&self, request: &LinkRequest) -> Result<AttachedLink, RepositoryError> {
        let pairing = request.pairing();

        if let Some(existing) = self.duplicates.active_for(&pairing).await?.into_iter().next() {
            return Ok(reuse_link(request, existing));
        }

        let inactive = self
            .links
            .find_for_pairing(&pairing)
            .await?
            .into_iter()
            .find(|link| !link.active);

        let link = match inactive {
            Some(previous) => self.links.activate(previous.id, request.id).await?,
            None => match self.links.create(pairing.new_link(Some(request.id))).await {
                Ok(link) => link,
                Err(RepositoryError::UniqueViolation(_)) => {
                    // storage enforces uniqueness and a concurrent approval won
                    let existing = self
                        .links
                        .find_active(&pairing)
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| RepositoryError::Conflict("active link vanished".to_string()))?;
                    return Ok(reuse_link(request, existing));
                }
                Err(err) => return Err(err),
            },
        };

        Ok(AttachedLink {
            link,
            duplicate: false,
            newly_activated: true,
        })
    }

    /// Undo the link write of an approval whose status update failed.
    /// A link another approval also relies on stays active.
    async fn release_link(&self, request: &LinkRequest, attached: &AttachedLink) {
        if !attached.newly_activated {
            return;
        }

        let still_needed = match self.requests.find_by_id(request.id).await {
            Ok(current) if current.status == RequestStatus::Approved => {
                match self.duplicates.active_for(&request.pairing()).await {
                    Ok(active) => active.len() == 1,
                    Err(_) => true,
                }
            }
            _ => false,
        };
        if still_needed {
            return;
        }

        if let Err(err) = self.links.deactivate(attached.link.id).await {
            tracing::error!(
                request_id = %request.id,
                link_id = %attached.link.id,
                error = %err,
                "failed to release link, reconciliation will complete the approval"
            );
        }
    }

    async fn complete_interrupted_approval(
        &self,
        request: LinkRequest,
        link: InstitutionLink,
    ) -> Result<LinkRequest, ReviewError> {
        let id = request.id;
        let patch = LinkRequestPatch::review(RequestStatus::Approved, request.review_notes.clone(), None)
            .reviewed_at(link.updated_at);

        match self.requests.update(id, patch).await {
            Ok(repaired) => {
                tracing::warn!(request_id = %id, link_id = %link.id, "completed interrupted approval");
                self.notify(&repaired, &link).await;
                Ok(repaired)
            }
            Err(RepositoryError::Conflict(_)) => self
                .requests
                .find_by_id(id)
                .await
                .map_err(for_request(id)),
            Err(err) => Err(for_request(id)(err)),
        }
    }

    fn is_abandoned(&self, link: &InstitutionLink) -> bool {
        (Utc::now() - link.updated_at)
            .to_std()
            .is_ok_and(|age| age >= self.repair_grace)
    }

    async fn notify(&self, request: &LinkRequest, link: &InstitutionLink) -> Option<String> {
        let notification = LinkNotification::approved(request, link);
        match self.notifications.notify_link(&notification).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(request_id = %request.id, error = %err, "link notification failed");
                Some(err.to_string())
            }
        }
    }

    async fn conflict(&self, id: LinkRequestId) -> ReviewError {
        match self.requests.find_by_id(id).await {
            Ok(current) => ReviewError::Conflict {
                id,
                status: current.status,
            },
            Err(err) => for_request(id)(err),
        }
    }
}

/// An existing active link is used as is. It stays attributed to the request
/// that created or reactivated it.
fn reuse_link(request: &LinkRequest, existing: InstitutionLink) -> AttachedLink {
    tracing::warn!(
        request_id = %request.id,
        link_id = %existing.id,
        "approving a request for an already linked pairing"
    );
    AttachedLink {
        link: existing,
        duplicate: true,
        newly_activated: false,
    }
}

/// Reconciliation approves without a reviewer and stamps the link's update time
fn completed_by_reconciliation(current: &LinkRequest, link: &InstitutionLink) -> bool {
    current.status == RequestStatus::Approved
        && current.reviewed_by.is_none()
        && current.reviewed_at == Some(link.updated_at)
}

fn for_request(id: LinkRequestId) -> impl Fn(RepositoryError) -> ReviewError {
    move |err| match err {
        RepositoryError::NotFound => ReviewError::NotFound(id),
        RepositoryError::ValidationFailed(reason) => ReviewError::Invalid(reason),
        other => ReviewError::Repository(other),
    }
}

/// Trimmed notes, `None` when blank
fn normalize_notes(notes: Option<String>) -> Result<Option<String>, ReviewError> {
    let Some(notes) = notes else {
        return Ok(None);
    };
    let notes = ReviewNotes::try_new(notes).map_err(|err| ReviewError::Invalid(err.to_string()))?;
    let notes: &str = notes.as_ref();
    Ok((!notes.is_empty()).then(|| notes.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use carebridge_common::test_utils::{LinkRequestBuilder, link_for};
    use carebridge_common::{TenantId, UserId};
    use tokio::sync::Notify;

    use super::*;
    use crate::domain::notifications::NOTIFY_INSTITUTION_LINK_JOB;
    use crate::infrastructure::memory::{InMemoryInstitutionLinks, InMemoryLinkRequests, RecordingJobInvoker};

    struct Fixture {
        requests: InMemoryLinkRequests,
        links: InMemoryInstitutionLinks,
        jobs: RecordingJobInvoker,
        coordinator: ReviewCoordinator<InMemoryLinkRequests, InMemoryInstitutionLinks, RecordingJobInvoker>,
    }

    fn fixture_with(jobs: RecordingJobInvoker) -> Fixture {
        let requests = InMemoryLinkRequests::default();
        let links = InMemoryInstitutionLinks::default();
        let coordinator = ReviewCoordinator::new(requests.clone(), links.clone(), jobs.clone());
        Fixture {
            requests,
            links,
            jobs,
            coordinator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingJobInvoker::succeeding())
    }

    fn reviewer() -> RequestContext {
        RequestContext::new(None, Some(UserId::generate()))
    }

    /// Active link attributed to `request`, last written long before the grace period
    fn abandoned_link_for(request: &LinkRequest) -> InstitutionLink {
        let mut link = link_for(request, true);
        link.source_request_id = Some(request.id);
        link.updated_at = Utc::now() - chrono::Duration::minutes(5);
        link
    }

    /// Holds the first status update until released
    #[derive(Clone, Default)]
    struct GatedRequests {
        inner: InMemoryLinkRequests,
        armed: Arc<AtomicBool>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl GatedRequests {
        fn armed() -> Self {
            let gated = Self::default();
            gated.armed.store(true, Ordering::SeqCst);
            gated
        }
    }

    impl LinkRequestRepository for GatedRequests {
        async fn find(&self, filter: &LinkRequestFilter) -> Result<Vec<LinkRequest>, RepositoryError> {
            self.inner.find(filter).await
        }

        async fn find_by_id(&self, id: LinkRequestId) -> Result<LinkRequest, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn update(&self, id: LinkRequestId, patch: LinkRequestPatch) -> Result<LinkRequest, RepositoryError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.update(id, patch).await
        }
    }

    struct GatedFixture {
        requests: GatedRequests,
        links: InMemoryInstitutionLinks,
        jobs: RecordingJobInvoker,
        coordinator: ReviewCoordinator<GatedRequests, InMemoryInstitutionLinks, RecordingJobInvoker>,
    }

    fn gated_fixture(repair_grace: Duration) -> GatedFixture {
        let requests = GatedRequests::armed();
        let links = InMemoryInstitutionLinks::default();
        let jobs = RecordingJobInvoker::succeeding();
        let coordinator = ReviewCoordinator::new(requests.clone(), links.clone(), jobs.clone())
            .with_repair_grace(repair_grace);
        GatedFixture {
            requests,
            links,
            jobs,
            coordinator,
        }
    }

    #[tokio::test]
    async fn approval_creates_link_and_notifies() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let ctx = reviewer();

        let result = f
            .coordinator
            .review_one(&ctx, request.id, ReviewDecision::Approve, Some("  welcome ".to_string()))
            .await
            .unwrap();

        assert_eq!(result.request.status, RequestStatus::Approved);
        assert_eq!(result.request.review_notes.as_deref(), Some("welcome"));
        assert_eq!(result.request.reviewed_by, ctx.actor_id);
        assert!(result.request.reviewed_at.is_some());
        assert!(!result.duplicate_detected);
        assert_eq!(result.notification_warning, None);

        let link = result.link.unwrap();
        assert!(link.active);
        assert_eq!(link.source_request_id, Some(request.id));
        assert_eq!(f.links.all().await.len(), 1);

        let calls = f.jobs.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, NOTIFY_INSTITUTION_LINK_JOB);
        assert_eq!(calls[0].1["email"], request.requester.email.as_str());
        assert_eq!(calls[0].1["isNewUser"], false);
    }

    #[tokio::test]
    async fn rejection_touches_neither_links_nor_notifications() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;

        let result = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Reject, Some("   ".to_string()))
            .await
            .unwrap();

        assert_eq!(result.request.status, RequestStatus::Rejected);
        assert_eq!(result.request.review_notes, None);
        assert!(result.request.reviewed_at.is_some());
        assert!(result.link.is_none());
        assert!(f.links.all().await.is_empty());
        assert!(f.jobs.calls().await.is_empty());
    }

    #[tokio::test]
    async fn second_review_conflicts_in_either_order() {
        for (first, second) in [
            (ReviewDecision::Approve, ReviewDecision::Reject),
            (ReviewDecision::Reject, ReviewDecision::Approve),
            (ReviewDecision::Approve, ReviewDecision::Approve),
        ] {
            let f = fixture();
            let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
            let ctx = reviewer();

            let winner = f.coordinator.review_one(&ctx, request.id, first, None).await.unwrap();
            let loser = f.coordinator.review_one(&ctx, request.id, second, None).await;

            assert_eq!(
                loser,
                Err(ReviewError::Conflict {
                    id: request.id,
                    status: winner.request.status
                })
            );
            let stored = f.requests.find_by_id(request.id).await.unwrap();
            assert_eq!(stored, winner.request);
        }
    }

    #[tokio::test]
    async fn concurrent_reviews_record_exactly_one_decision() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let ctx = reviewer();

        let (approve, reject) = tokio::join!(
            f.coordinator.review_one(&ctx, request.id, ReviewDecision::Approve, None),
            f.coordinator.review_one(&ctx, request.id, ReviewDecision::Reject, None),
        );

        assert_eq!(approve.is_ok() as u8 + reject.is_ok() as u8, 1);
        let stored = f.requests.find_by_id(request.id).await.unwrap();
        let active_links = f.links.all().await.into_iter().filter(|l| l.active).count();
        match stored.status {
            RequestStatus::Approved => assert_eq!(active_links, 1),
            RequestStatus::Rejected => assert_eq!(active_links, 0),
            RequestStatus::Pending => panic!("request left pending"),
        }
    }

    #[tokio::test]
    async fn batch_failures_do_not_affect_other_items() {
        let f = fixture();
        let ctx = reviewer();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(f.requests.insert(LinkRequestBuilder::new().build()).await.id);
        }
        let approved = f
            .requests
            .insert(
                LinkRequestBuilder::new()
                    .reviewed(RequestStatus::Approved, chrono::Utc::now())
                    .build(),
            )
            .await;
        ids.push(approved.id);

        let result = f
            .coordinator
            .review_batch(&ctx, ids.clone(), ReviewDecision::Approve, None)
            .await
            .unwrap();

        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 1);
        assert!(result.is_partial_failure());
        assert_eq!(
            result.outcomes[&approved.id],
            Err(ReviewError::Conflict {
                id: approved.id,
                status: RequestStatus::Approved
            })
        );
        for id in &ids[..3] {
            let outcome = result.outcomes[id].as_ref().unwrap();
            assert_eq!(outcome.request.status, RequestStatus::Approved);
        }
        assert_eq!(f.links.all().await.len(), 3);
    }

    #[tokio::test]
    async fn batch_reports_missing_ids_and_deduplicates() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let missing = LinkRequestId::generate();

        let result = f
            .coordinator
            .review_batch(
                &reviewer(),
                vec![request.id, missing, request.id],
                ReviewDecision::Reject,
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.outcomes[&missing], Err(ReviewError::NotFound(missing)));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let f = fixture();
        let result = f
            .coordinator
            .review_batch(&reviewer(), Vec::new(), ReviewDecision::Approve, None)
            .await;
        assert!(matches!(result, Err(ReviewError::Invalid(_))));
    }

    #[tokio::test]
    async fn duplicate_does_not_block_approval_nor_add_a_second_link() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let existing = f.links.insert(link_for(&request, true)).await;

        let result = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Approve, None)
            .await
            .unwrap();

        assert!(result.duplicate_detected);
        assert_eq!(result.request.status, RequestStatus::Approved);
        assert_eq!(result.link, Some(existing.clone()));
        assert_eq!(f.links.all().await, vec![existing]);
    }

    #[tokio::test]
    async fn failed_approval_of_a_linked_pairing_stays_pending() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let existing = f.links.insert(link_for(&request, true)).await;
        f.requests.fail_updates_for(request.id).await;

        let result = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Approve, None)
            .await;
        assert!(result.is_err());
        f.requests.clear_failures().await;

        let loaded = f.coordinator.load(&reviewer(), request.id).await.unwrap();
        assert_eq!(loaded.status, RequestStatus::Pending);
        assert_eq!(f.links.all().await, vec![existing]);
        assert!(f.jobs.calls().await.is_empty());

        let retried = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(retried.request.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn inactive_link_is_reactivated() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let previous = f.links.insert(link_for(&request, false)).await;

        let result = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Approve, None)
            .await
            .unwrap();

        let link = result.link.unwrap();
        assert_eq!(link.id, previous.id);
        assert!(link.active);
        assert!(!result.duplicate_detected);
        assert_eq!(f.links.all().await.len(), 1);
    }

    #[tokio::test]
    async fn notification_failure_is_a_warning() {
        let f = fixture_with(RecordingJobInvoker::failing("mailer down"));
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;

        let result = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Approve, None)
            .await
            .unwrap();

        assert_eq!(result.request.status, RequestStatus::Approved);
        assert!(result.notification_warning.unwrap().contains("mailer down"));
    }

    #[tokio::test]
    async fn failed_status_update_releases_the_new_link() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        f.requests.fail_updates_for(request.id).await;

        let result = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Approve, None)
            .await;

        assert!(matches!(result, Err(ReviewError::Repository(RepositoryError::DatabaseError(_)))));
        let stored = f.requests.find_by_id(request.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        assert!(f.links.all().await.iter().all(|link| !link.active));
        assert!(f.jobs.calls().await.is_empty());
    }

    #[tokio::test]
    async fn interrupted_approval_is_completed_on_read() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let link = f.links.insert(abandoned_link_for(&request)).await;

        let loaded = f.coordinator.load(&reviewer(), request.id).await.unwrap();

        assert_eq!(loaded.status, RequestStatus::Approved);
        assert_eq!(loaded.reviewed_at, Some(link.updated_at));
        assert_eq!(f.jobs.calls().await.len(), 1);

        let again = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Reject, None)
            .await;
        assert!(matches!(again, Err(ReviewError::Conflict { .. })));
    }

    #[tokio::test]
    async fn reconciliation_pass_repairs_only_attributed_requests() {
        let f = fixture();
        let interrupted = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let untouched = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let recent = f.requests.insert(LinkRequestBuilder::new().build()).await;
        f.links.insert(abandoned_link_for(&interrupted)).await;
        // an unattributed active link is a duplicate, not an interrupted approval
        f.links.insert(link_for(&untouched, true)).await;
        let mut running = link_for(&recent, true);
        running.source_request_id = Some(recent.id);
        f.links.insert(running).await;

        let repaired = f.coordinator.reconcile_pending(&reviewer()).await.unwrap();

        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].id, interrupted.id);
        for id in [untouched.id, recent.id] {
            let stored = f.requests.find_by_id(id).await.unwrap();
            assert_eq!(stored.status, RequestStatus::Pending);
        }
    }

    #[tokio::test]
    async fn reconciliation_pass_continues_past_a_failed_repair() {
        let f = fixture();
        let broken = f.requests.insert(LinkRequestBuilder::new().build()).await;
        let healthy = f.requests.insert(LinkRequestBuilder::new().build()).await;
        f.links.insert(abandoned_link_for(&broken)).await;
        f.links.insert(abandoned_link_for(&healthy)).await;
        f.requests.fail_updates_for(broken.id).await;

        let repaired = f.coordinator.reconcile_pending(&reviewer()).await.unwrap();

        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].id, healthy.id);
        let broken = f.requests.find_by_id(broken.id).await.unwrap();
        assert_eq!(broken.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn reads_during_a_running_approval_leave_it_alone() {
        let f = gated_fixture(DEFAULT_REPAIR_GRACE);
        let request = f.requests.inner.insert(LinkRequestBuilder::new().build()).await;
        let approver = reviewer();

        let approving = tokio::spawn({
            let coordinator = f.coordinator.clone();
            async move {
                coordinator
                    .review_one(&approver, request.id, ReviewDecision::Approve, Some("checked".to_string()))
                    .await
            }
        });
        f.requests.entered.notified().await;

        let loaded = f.coordinator.load(&reviewer(), request.id).await.unwrap();
        assert_eq!(loaded.status, RequestStatus::Pending);
        let rejected = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Reject, None)
            .await;

        f.requests.release.notify_one();
        let approved = approving.await.unwrap();

        assert!(rejected.is_ok());
        assert_eq!(
            approved,
            Err(ReviewError::Conflict {
                id: request.id,
                status: RequestStatus::Rejected
            })
        );
        assert!(f.links.all().await.iter().all(|link| !link.active));
        assert!(f.jobs.calls().await.is_empty());
    }

    #[tokio::test]
    async fn approval_finished_by_reconciliation_still_succeeds() {
        let f = gated_fixture(Duration::ZERO);
        let request = f.requests.inner.insert(LinkRequestBuilder::new().build()).await;
        let approver = reviewer();

        let approving = tokio::spawn({
            let coordinator = f.coordinator.clone();
            async move {
                coordinator
                    .review_one(&approver, request.id, ReviewDecision::Approve, None)
                    .await
            }
        });
        f.requests.entered.notified().await;

        let rejected = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Reject, None)
            .await;
        f.requests.release.notify_one();
        let approved = approving.await.unwrap().unwrap();

        assert_eq!(
            rejected,
            Err(ReviewError::Conflict {
                id: request.id,
                status: RequestStatus::Approved
            })
        );
        assert_eq!(approved.request.status, RequestStatus::Approved);
        assert_eq!(approved.notification_warning, None);
        assert!(approved.link.unwrap().active);
        assert_eq!(f.jobs.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn other_tenants_requests_are_invisible() {
        let f = fixture();
        let request = f
            .requests
            .insert(LinkRequestBuilder::new().tenant(Some(TenantId::generate())).build())
            .await;
        let ctx = RequestContext::new(Some(TenantId::generate()), None);

        let result = f
            .coordinator
            .review_one(&ctx, request.id, ReviewDecision::Approve, None)
            .await;

        assert_eq!(result, Err(ReviewError::NotFound(request.id)));
    }

    #[tokio::test]
    async fn overly_long_notes_are_invalid() {
        let f = fixture();
        let request = f.requests.insert(LinkRequestBuilder::new().build()).await;

        let result = f
            .coordinator
            .review_one(&reviewer(), request.id, ReviewDecision::Reject, Some("x".repeat(2001)))
            .await;

        assert!(matches!(result, Err(ReviewError::Invalid(_))));
        let stored = f.requests.find_by_id(request.id).await.unwrap();
        assert!(stored.is_pending());
    }
}
