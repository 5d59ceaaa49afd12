use std::future::Future;

use carebridge_common::{InstitutionLink, LinkId, LinkPairing, LinkRequestId, NewInstitutionLink};

use crate::domain::RepositoryError;

/// Persisted institution links. Rows are deactivated, never deleted.
pub trait InstitutionLinkRepository: Clone + Send + Sync + 'static {
    /// All links of a pairing, active or not, newest first
    fn find_for_pairing(
        &self,
        pairing: &LinkPairing,
    ) -> impl Future<Output = Result<Vec<InstitutionLink>, RepositoryError>> + Send;

    /// Active links of a pairing, newest first
    fn find_active(
        &self,
        pairing: &LinkPairing,
    ) -> impl Future<Output = Result<Vec<InstitutionLink>, RepositoryError>> + Send;

    /// Active links that were created or reactivated by one of the given requests
    fn find_active_by_sources(
        &self,
        request_ids: &[LinkRequestId],
    ) -> impl Future<Output = Result<Vec<InstitutionLink>, RepositoryError>> + Send;

    /// Insert a new active link. Uniqueness is only checked when the storage enforces it.
    fn create(
        &self,
        link: NewInstitutionLink,
    ) -> impl Future<Output = Result<InstitutionLink, RepositoryError>> + Send;

    /// Mark a link active and attribute it to `source_request_id`
    fn activate(
        &self,
        id: LinkId,
        source_request_id: LinkRequestId,
    ) -> impl Future<Output = Result<InstitutionLink, RepositoryError>> + Send;

    fn deactivate(
        &self,
        id: LinkId,
    ) -> impl Future<Output = Result<InstitutionLink, RepositoryError>> + Send;
}
