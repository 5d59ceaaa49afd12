use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use carebridge_common::{LinkRequestId, TenantId, UserCategory};
use chrono::Utc;

use crate::domain::requests::metrics::{self, LinkRequestMetrics, MetricsOptions};
use crate::domain::requests::{LinkRequestFilter, LinkRequestRepository};
use crate::domain::{AppState, RequestContext};
use crate::infrastructure::http::api::{ApiError, ApiSuccess};
use crate::infrastructure::http::handlers::requests::dto::{
    BatchReviewRequest, BatchReviewResponse, DuplicateParams, DuplicateResponse, LinkRequestResponse,
    ListParams, MetricsParams, ReconcileResponse, ReviewRequest, ReviewResponse, parse_param,
    required_param,
};
use crate::infrastructure::http::querystring::QueryString;

mod dto;

fn parse_id(id: &str) -> Result<LinkRequestId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::UnprocessableEntity(format!("`{}` is not a valid link request id", id)))
}

pub async fn list_link_requests<S: AppState>(
    State(state): State<S>,
    ctx: RequestContext,
    QueryString(params): QueryString<ListParams>,
) -> Result<ApiSuccess<Vec<LinkRequestResponse>>, ApiError> {
    // tenant administrators are pinned to their own tenant
    let tenant_id = match ctx.tenant_id {
        Some(own) => Some(own),
        None => parse_param::<TenantId>("tenant_id", params.tenant_id.as_deref())?,
    };

    let mut filter = LinkRequestFilter::new()
        .with_tenant(tenant_id)
        .with_search(params.search.as_deref().unwrap_or_default())
        .paginate(params.limit, params.offset);
    if let Some(status) = parse_param("status", params.status.as_deref())? {
        filter = filter.with_status(status);
    }
    if let Some(category) = parse_param("user_category", params.user_category.as_deref())? {
        filter = filter.with_user_category(category);
    }

    let requests = state.link_requests().find(&filter).await?;
    let result = requests.into_iter().map(LinkRequestResponse::from).collect();
    Ok(ApiSuccess::new(StatusCode::OK, result))
}

pub async fn find_link_request<S: AppState>(
    Path(id): Path<String>,
    State(state): State<S>,
    ctx: RequestContext,
) -> Result<ApiSuccess<LinkRequestResponse>, ApiError> {
    let id = parse_id(&id)?;
    let request = state.reviews().load(&ctx, id).await?;
    Ok(ApiSuccess::new(StatusCode::OK, request.into()))
}

pub async fn review_link_request<S: AppState>(
    Path(id): Path<String>,
    State(state): State<S>,
    ctx: RequestContext,
    Json(body): Json<ReviewRequest>,
) -> Result<ApiSuccess<ReviewResponse>, ApiError> {
    let id = parse_id(&id)?;
    let result = state
        .reviews()
        .review_one(&ctx, id, body.decision, body.notes)
        .await?;
    Ok(ApiSuccess::new(StatusCode::OK, result.into()))
}

pub async fn review_link_requests<S: AppState>(
    State(state): State<S>,
    ctx: RequestContext,
    Json(body): Json<BatchReviewRequest>,
) -> Result<ApiSuccess<BatchReviewResponse>, ApiError> {
    let result = state
        .reviews()
        .review_batch(&ctx, body.ids, body.decision, body.notes)
        .await?;
    Ok(ApiSuccess::new(StatusCode::OK, result.into()))
}

pub async fn reconcile_link_requests<S: AppState>(
    State(state): State<S>,
    ctx: RequestContext,
) -> Result<ApiSuccess<ReconcileResponse>, ApiError> {
    let repaired = state.reviews().reconcile_pending(&ctx).await?;
    Ok(ApiSuccess::new(StatusCode::OK, repaired.into()))
}

pub async fn find_duplicates<S: AppState>(
    State(state): State<S>,
    ctx: RequestContext,
    QueryString(params): QueryString<DuplicateParams>,
) -> Result<ApiSuccess<DuplicateResponse>, ApiError> {
    let user_id = required_param("user_id", params.user_id.as_deref())?;
    let institution_id = required_param("institution_id", params.institution_id.as_deref())?;
    let user_category: UserCategory = required_param("user_category", params.user_category.as_deref())?;

    let links = state
        .duplicates()
        .find_active_links(&ctx, user_id, institution_id, user_category)
        .await?;
    Ok(ApiSuccess::new(StatusCode::OK, links.into()))
}

pub async fn link_request_metrics<S: AppState>(
    State(state): State<S>,
    ctx: RequestContext,
    QueryString(params): QueryString<MetricsParams>,
) -> Result<ApiSuccess<LinkRequestMetrics>, ApiError> {
    let mut options = MetricsOptions::default();
    if let Some(period) = parse_param("period", params.period.as_deref())? {
        options.period = period;
    }
    if let Some(top) = params.top {
        options.top_institutions = top;
    }

    let filter = LinkRequestFilter::new().with_tenant(ctx.tenant_id);
    let requests = state.link_requests().find(&filter).await?;
    let result = metrics::compute(&requests, Utc::now(), options);
    Ok(ApiSuccess::new(StatusCode::OK, result))
}
