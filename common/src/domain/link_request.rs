use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    InstitutionId, LinkPairing, LinkRequestId, TenantId, UnknownVariant, UserId,
};

/// A user's request to be linked to an institution.
///
/// Created by the user outside of this workspace, reviewed exactly once,
/// never deleted (the history feeds the review metrics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRequest {
    pub id: LinkRequestId,
    pub requester: RequesterInfo,
    pub institution: InstitutionInfo,
    pub relationship_type: Option<String>,
    pub enrollment_type: Option<String>,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterInfo {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub category: UserCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionInfo {
    pub id: InstitutionId,
    pub name: String,
    pub institution_type: String,
    pub is_partner: bool,
}

impl LinkRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Pairing the approval of this request links together.
    pub fn pairing(&self) -> LinkPairing {
        LinkPairing {
            user_id: self.requester.id,
            institution_id: self.institution.id,
            tenant_id: self.tenant_id,
            role: self.requester.category,
        }
    }

    /// Time between submission and review, if the request was reviewed.
    pub fn response_time(&self) -> Option<Duration> {
        match (self.status.is_terminal(), self.reviewed_at) {
            (true, Some(reviewed_at)) => Some(reviewed_at - self.created_at),
            _ => None,
        }
    }

    /// Case-insensitive match over requester name, email and institution name.
    /// `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        [
            &self.requester.name,
            &self.requester.email,
            &self.institution.name,
        ]
        .iter()
        .any(|haystack| haystack.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// `approved` and `rejected` never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(UnknownVariant::new("request status", other)),
        }
    }
}

/// Closed set of user categories that may ask to be linked to an institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserCategory {
    Student,
    Professional,
    Staff,
    Patient,
}

impl UserCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserCategory::Student => "student",
            UserCategory::Professional => "professional",
            UserCategory::Staff => "staff",
            UserCategory::Patient => "patient",
        }
    }
}

impl fmt::Display for UserCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserCategory {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "student" => Ok(UserCategory::Student),
            "professional" => Ok(UserCategory::Professional),
            "staff" => Ok(UserCategory::Staff),
            "patient" => Ok(UserCategory::Patient),
            other => Err(UnknownVariant::new("user category", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target_status(&self) -> RequestStatus {
        match self {
            ReviewDecision::Approve => RequestStatus::Approved,
            ReviewDecision::Reject => RequestStatus::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::LinkRequestBuilder;

    #[test]
    fn terminal_states_do_not_transition() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Approved));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Rejected));
        assert!(!RequestStatus::Approved.can_transition_to(RequestStatus::Rejected));
        assert!(!RequestStatus::Rejected.can_transition_to(RequestStatus::Approved));
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Pending));
    }

    #[test]
    fn status_parses_from_storage_value() {
        assert_eq!("approved".parse::<RequestStatus>(), Ok(RequestStatus::Approved));
        let err = "archived".parse::<RequestStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown request status value `archived`");
    }

    #[test]
    fn response_time_only_for_reviewed_requests() {
        let created = Utc::now() - Duration::hours(30);
        let pending = LinkRequestBuilder::new().created_at(created).build();
        assert_eq!(pending.response_time(), None);

        let approved = LinkRequestBuilder::new()
            .created_at(created)
            .reviewed(RequestStatus::Approved, created + Duration::hours(6))
            .build();
        assert_eq!(approved.response_time(), Some(Duration::hours(6)));
    }

    #[test]
    fn search_covers_name_email_and_institution() {
        let request = LinkRequestBuilder::new()
            .requester_name("Ana Popescu")
            .institution_name("Northside Counselling")
            .build();

        assert!(request.matches_search("popescu"));
        assert!(request.matches_search("northside"));
        assert!(request.matches_search("@example.org"));
        assert!(!request.matches_search("southside"));
    }
}
