use chrono::{DateTime, Utc};

use crate::domain::{
    InstitutionId, InstitutionInfo, InstitutionLink, LinkId, LinkRequest, LinkRequestId,
    RequestStatus, RequesterInfo, TenantId, UserCategory, UserId,
};

/// Fluent builder for `LinkRequest` fixtures.
///
/// Public so that other crates can reuse it for their own tests.
#[derive(Debug, Clone)]
pub struct LinkRequestBuilder {
    request: LinkRequest,
}

impl Default for LinkRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkRequestBuilder {
    pub fn new() -> Self {
        let user_id = UserId::generate();
        Self {
            request: LinkRequest {
                id: LinkRequestId::generate(),
                requester: RequesterInfo {
                    id: user_id,
                    name: "Test User".to_string(),
                    email: format!("user-{}@example.org", user_id),
                    category: UserCategory::Student,
                },
                institution: InstitutionInfo {
                    id: InstitutionId::generate(),
                    name: "Test Institution".to_string(),
                    institution_type: "university".to_string(),
                    is_partner: false,
                },
                relationship_type: None,
                enrollment_type: None,
                message: None,
                status: RequestStatus::Pending,
                review_notes: None,
                reviewed_at: None,
                reviewed_by: None,
                created_at: Utc::now(),
                tenant_id: None,
            },
        }
    }

    pub fn id(mut self, id: LinkRequestId) -> Self {
        self.request.id = id;
        self
    }

    pub fn requester(mut self, id: UserId) -> Self {
        self.request.requester.id = id;
        self
    }

    pub fn requester_name(mut self, name: &str) -> Self {
        self.request.requester.name = name.to_string();
        self
    }

    pub fn category(mut self, category: UserCategory) -> Self {
        self.request.requester.category = category;
        self
    }

    pub fn institution(mut self, id: InstitutionId, name: &str) -> Self {
        self.request.institution.id = id;
        self.request.institution.name = name.to_string();
        self
    }

    pub fn institution_name(mut self, name: &str) -> Self {
        self.request.institution.name = name.to_string();
        self
    }

    pub fn tenant(mut self, tenant_id: Option<TenantId>) -> Self {
        self.request.tenant_id = tenant_id;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.request.created_at = created_at;
        self
    }

    pub fn status(mut self, status: RequestStatus) -> Self {
        self.request.status = status;
        self
    }

    /// Marks the request as reviewed with the given terminal status.
    pub fn reviewed(mut self, status: RequestStatus, reviewed_at: DateTime<Utc>) -> Self {
        self.request.status = status;
        self.request.reviewed_at = Some(reviewed_at);
        self
    }

    pub fn build(self) -> LinkRequest {
        self.request
    }
}

/// Link fixture for the pairing of `request`, active or not.
pub fn link_for(request: &LinkRequest, active: bool) -> InstitutionLink {
    let now = Utc::now();
    InstitutionLink {
        id: LinkId::generate(),
        user_id: request.requester.id,
        institution_id: request.institution.id,
        tenant_id: request.tenant_id,
        role: request.requester.category,
        active,
        source_request_id: None,
        created_at: now,
        updated_at: now,
    }
}
