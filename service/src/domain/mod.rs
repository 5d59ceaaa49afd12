use carebridge_common::{TenantId, UserId};

use crate::domain::notifications::JobInvoker;
use crate::domain::posts::PostRepository;
use crate::domain::requests::duplicates::DuplicateDetector;
use crate::domain::requests::links::InstitutionLinkRepository;
use crate::domain::requests::review::ReviewCoordinator;
use crate::domain::requests::LinkRequestRepository;

pub mod notifications;
pub mod posts;
pub mod requests;

/// Who is acting and on behalf of which tenant.
///
/// Threaded explicitly through every store and coordinator call.
/// A missing tenant means a platform-wide administrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: Option<TenantId>,
    pub actor_id: Option<UserId>,
}

impl RequestContext {
    pub fn new(tenant_id: Option<TenantId>, actor_id: Option<UserId>) -> Self {
        Self { tenant_id, actor_id }
    }

    pub fn platform() -> Self {
        Self::default()
    }

    /// Platform administrators see every tenant, tenant administrators only their own rows.
    pub fn can_see(&self, tenant_id: Option<TenantId>) -> bool {
        match self.tenant_id {
            None => true,
            Some(own) => tenant_id == Some(own),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("entity not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("database error: {0}")]
    DatabaseError(String),
}

//// The global application state shared between all request handlers.
pub trait AppState: Clone + Send + Sync + 'static {
    type R: LinkRequestRepository;
    type L: InstitutionLinkRepository;
    type J: JobInvoker;
    type P: PostRepository;

    fn link_requests(&self) -> &Self::R;
    fn reviews(&self) -> &ReviewCoordinator<Self::R, Self::L, Self::J>;
    fn duplicates(&self) -> &DuplicateDetector<Self::L>;
    fn posts(&self) -> &Self::P;
}
