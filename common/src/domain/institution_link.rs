use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{InstitutionId, LinkId, LinkRequestId, TenantId, UserCategory, UserId};

/// Relationship between a user and an institution, created by an approval.
///
/// Links are deactivated, never deleted. At most one active row per
/// (user, institution, tenant, role) is expected; storage does not enforce it
/// unless the unique index is enabled at migration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionLink {
    pub id: LinkId,
    pub user_id: UserId,
    pub institution_id: InstitutionId,
    pub tenant_id: Option<TenantId>,
    pub role: UserCategory,
    pub active: bool,
    /// Request whose approval created or last reactivated this link
    pub source_request_id: Option<LinkRequestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstitutionLink {
    pub fn pairing(&self) -> LinkPairing {
        LinkPairing {
            user_id: self.user_id,
            institution_id: self.institution_id,
            tenant_id: self.tenant_id,
            role: self.role,
        }
    }
}

/// The combination under which at most one link should be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkPairing {
    pub user_id: UserId,
    pub institution_id: InstitutionId,
    pub tenant_id: Option<TenantId>,
    pub role: UserCategory,
}

impl LinkPairing {
    pub fn new_link(&self, source_request_id: Option<LinkRequestId>) -> NewInstitutionLink {
        NewInstitutionLink {
            user_id: self.user_id,
            institution_id: self.institution_id,
            tenant_id: self.tenant_id,
            role: self.role,
            source_request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInstitutionLink {
    pub user_id: UserId,
    pub institution_id: InstitutionId,
    pub tenant_id: Option<TenantId>,
    pub role: UserCategory,
    pub source_request_id: Option<LinkRequestId>,
}
