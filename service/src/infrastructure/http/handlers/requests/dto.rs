use std::str::FromStr;

use carebridge_common::{
    InstitutionId, InstitutionLink, LinkId, LinkRequest, LinkRequestId, RequestStatus,
    ReviewDecision, TenantId, UserCategory, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::requests::review::{BatchReviewResult, ReviewError, ReviewResult};
use crate::infrastructure::http::api::ApiError;

/// Parses an optional query value, unknown values are a 422
pub fn parse_param<T>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse()
                .map_err(|e: T::Err| ApiError::UnprocessableEntity(format!("{}: {}", name, e)))
        })
        .transpose()
}

pub fn required_param<T>(name: &str, value: Option<&str>) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_param(name, value)?
        .ok_or_else(|| ApiError::UnprocessableEntity(format!("{} is required", name)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub user_category: Option<String>,
    pub tenant_id: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DuplicateParams {
    pub user_id: Option<String>,
    pub institution_id: Option<String>,
    pub user_category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub period: Option<String>,
    pub top: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchReviewRequest {
    pub ids: Vec<LinkRequestId>,
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequestResponse {
    id: LinkRequestId,
    user_id: UserId,
    user_name: String,
    user_email: String,
    user_category: UserCategory,
    institution_id: InstitutionId,
    institution_name: String,
    institution_type: String,
    institution_is_partner: bool,
    relationship_type: Option<String>,
    enrollment_type: Option<String>,
    message: Option<String>,
    status: RequestStatus,
    review_notes: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewed_by: Option<UserId>,
    created_at: DateTime<Utc>,
    tenant_id: Option<TenantId>,
}

impl From<LinkRequest> for LinkRequestResponse {
    fn from(value: LinkRequest) -> Self {
        Self {
            id: value.id,
            user_id: value.requester.id,
            user_name: value.requester.name,
            user_email: value.requester.email,
            user_category: value.requester.category,
            institution_id: value.institution.id,
            institution_name: value.institution.name,
            institution_type: value.institution.institution_type,
            institution_is_partner: value.institution.is_partner,
            relationship_type: value.relationship_type,
            enrollment_type: value.enrollment_type,
            message: value.message,
            status: value.status,
            review_notes: value.review_notes,
            reviewed_at: value.reviewed_at,
            reviewed_by: value.reviewed_by,
            created_at: value.created_at,
            tenant_id: value.tenant_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    id: LinkId,
    user_id: UserId,
    institution_id: InstitutionId,
    tenant_id: Option<TenantId>,
    role: UserCategory,
    active: bool,
    source_request_id: Option<LinkRequestId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InstitutionLink> for LinkResponse {
    fn from(value: InstitutionLink) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            institution_id: value.institution_id,
            tenant_id: value.tenant_id,
            role: value.role,
            active: value.active,
            source_request_id: value.source_request_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    request: LinkRequestResponse,
    link: Option<LinkResponse>,
    duplicate_detected: bool,
    notification_warning: Option<String>,
}

impl From<ReviewResult> for ReviewResponse {
    fn from(value: ReviewResult) -> Self {
        Self {
            request: value.request.into(),
            link: value.link.map(LinkResponse::from),
            duplicate_detected: value.duplicate_detected,
            notification_warning: value.notification_warning,
        }
    }
}

/// Machine-readable failure reason of one batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Conflict,
    Invalid,
    Internal,
}

impl From<&ReviewError> for FailureKind {
    fn from(value: &ReviewError) -> Self {
        match value {
            ReviewError::NotFound(_) => FailureKind::NotFound,
            ReviewError::Conflict { .. } => FailureKind::Conflict,
            ReviewError::Invalid(_) => FailureKind::Invalid,
            ReviewError::Repository(_) => FailureKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum BatchItemResponse {
    Reviewed {
        id: LinkRequestId,
        #[serde(flatten)]
        result: ReviewResponse,
    },
    Failed {
        id: LinkRequestId,
        kind: FailureKind,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReviewResponse {
    succeeded: usize,
    failed: usize,
    partial_failure: bool,
    outcomes: Vec<BatchItemResponse>,
}

impl From<BatchReviewResult> for BatchReviewResponse {
    fn from(value: BatchReviewResult) -> Self {
        let partial_failure = value.is_partial_failure();
        let outcomes = value
            .outcomes
            .into_iter()
            .map(|(id, outcome)| match outcome {
                Ok(result) => BatchItemResponse::Reviewed {
                    id,
                    result: result.into(),
                },
                Err(error) => BatchItemResponse::Failed {
                    id,
                    kind: FailureKind::from(&error),
                    error: error.to_string(),
                },
            })
            .collect();

        Self {
            succeeded: value.succeeded,
            failed: value.failed,
            partial_failure,
            outcomes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateResponse {
    has_active_link: bool,
    links: Vec<LinkResponse>,
}

impl From<Vec<InstitutionLink>> for DuplicateResponse {
    fn from(value: Vec<InstitutionLink>) -> Self {
        Self {
            has_active_link: !value.is_empty(),
            links: value.into_iter().map(LinkResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    repaired: usize,
    requests: Vec<LinkRequestResponse>,
}

impl From<Vec<LinkRequest>> for ReconcileResponse {
    fn from(value: Vec<LinkRequest>) -> Self {
        Self {
            repaired: value.len(),
            requests: value.into_iter().map(LinkRequestResponse::from).collect(),
        }
    }
}
