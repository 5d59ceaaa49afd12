use carebridge_common::{InstitutionId, InstitutionLink, LinkPairing, UserCategory, UserId};

use crate::domain::requests::links::InstitutionLinkRepository;
use crate::domain::{RepositoryError, RequestContext};

/// Answers whether approving a pairing would create a second active link.
///
/// Looks at the links table, never at the requests: a pending request for a
/// pairing is not a link.
#[derive(Debug, Clone)]
pub struct DuplicateDetector<L: InstitutionLinkRepository> {
    links: L,
}

impl<L: InstitutionLinkRepository> DuplicateDetector<L> {
    pub fn new(links: L) -> Self {
        Self { links }
    }

    pub async fn has_active_link(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        institution_id: InstitutionId,
        user_category: UserCategory,
    ) -> Result<bool, RepositoryError> {
        let links = self
            .find_active_links(ctx, user_id, institution_id, user_category)
            .await?;
        Ok(!links.is_empty())
    }

    /// Active links of the pairing within the caller's tenant
    pub async fn find_active_links(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        institution_id: InstitutionId,
        user_category: UserCategory,
    ) -> Result<Vec<InstitutionLink>, RepositoryError> {
        let pairing = LinkPairing {
            user_id,
            institution_id,
            tenant_id: ctx.tenant_id,
            role: user_category,
        };
        self.active_for(&pairing).await
    }

    pub async fn active_for(&self, pairing: &LinkPairing) -> Result<Vec<InstitutionLink>, RepositoryError> {
        let links = self.links.find_active(pairing).await?;
        if links.len() > 1 {
            tracing::warn!(
                user_id = %pairing.user_id,
                institution_id = %pairing.institution_id,
                count = links.len(),
                "pairing has more than one active link"
            );
        }
        Ok(links)
    }
}
