use std::future::Future;

use carebridge_common::{
    LinkRequest, LinkRequestId, RequestStatus, TenantId, UserCategory, UserId,
};
use chrono::{DateTime, Utc};

use crate::domain::RepositoryError;

pub mod duplicates;
pub mod links;
pub mod metrics;
pub mod review;

/// Largest page a single query may return
pub const MAX_PAGE_SIZE: i64 = 200;

/// Persisted link requests. Every mutation returns the fresh row.
pub trait LinkRequestRepository: Clone + Send + Sync + 'static {
    /// Find requests matching the filter, newest first
    fn find(
        &self,
        filter: &LinkRequestFilter,
    ) -> impl Future<Output = Result<Vec<LinkRequest>, RepositoryError>> + Send;

    /// Find single request by ID, `NotFound` when absent
    fn find_by_id(
        &self,
        id: LinkRequestId,
    ) -> impl Future<Output = Result<LinkRequest, RepositoryError>> + Send;

    /// Apply a review to a pending request.
    ///
    /// The pending check and the write are one step: a request that is no
    /// longer pending fails with `Conflict` and is left untouched.
    fn update(
        &self,
        id: LinkRequestId,
        patch: LinkRequestPatch,
    ) -> impl Future<Output = Result<LinkRequest, RepositoryError>> + Send;
}

/// Closed filter over link requests. Absent fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkRequestFilter {
    pub status: Option<RequestStatus>,
    pub user_category: Option<UserCategory>,
    pub tenant_id: Option<TenantId>,
    /// Lowercase needle matched against requester name, email and institution name
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LinkRequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_user_category(mut self, user_category: UserCategory) -> Self {
        self.user_category = Some(user_category);
        self
    }

    pub fn with_tenant(mut self, tenant_id: Option<TenantId>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Blank searches are ignored
    pub fn with_search(mut self, search: &str) -> Self {
        let needle = search.trim().to_lowercase();
        self.search = (!needle.is_empty()).then_some(needle);
        self
    }

    /// Set pagination
    ///
    /// Enforces invariants:
    /// - limit is capped at MAX_PAGE_SIZE
    /// - negative values are treated as absent
    pub fn paginate(mut self, limit: Option<i64>, offset: Option<i64>) -> Self {
        self.limit = limit.filter(|l| *l > 0).map(|l| l.min(MAX_PAGE_SIZE));
        self.offset = offset.filter(|o| *o > 0);
        self
    }

    /// In-process evaluation of the filter, pagination excluded
    pub fn matches(&self, request: &LinkRequest) -> bool {
        self.status.is_none_or(|status| request.status == status)
            && self
                .user_category
                .is_none_or(|category| request.requester.category == category)
            && self
                .tenant_id
                .is_none_or(|tenant| request.tenant_id == Some(tenant))
            && self
                .search
                .as_deref()
                .is_none_or(|needle| request.matches_search(needle))
    }
}

/// The only mutation a link request supports: its review.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequestPatch {
    pub status: RequestStatus,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<UserId>,
    /// Stamped with the current time by the store when absent
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl LinkRequestPatch {
    pub fn review(status: RequestStatus, review_notes: Option<String>, reviewed_by: Option<UserId>) -> Self {
        Self {
            status,
            review_notes,
            reviewed_by,
            reviewed_at: None,
        }
    }

    pub fn reviewed_at(mut self, reviewed_at: DateTime<Utc>) -> Self {
        self.reviewed_at = Some(reviewed_at);
        self
    }

    /// Rejects patches that do not lead to a terminal status
    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.status.is_terminal() {
            Ok(())
        } else {
            Err(RepositoryError::ValidationFailed(format!(
                "a review must set a terminal status, got `{}`",
                self.status
            )))
        }
    }
}
