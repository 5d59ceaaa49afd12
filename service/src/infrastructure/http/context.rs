use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::RequestContext;
use crate::infrastructure::http::api::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const REVIEWER_HEADER: &str = "x-reviewer-id";

/// Reads the acting tenant and reviewer from the request headers.
/// Requests without a tenant header act platform-wide.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_id(&parts.headers, TENANT_HEADER)?;
        let actor_id = header_id(&parts.headers, REVIEWER_HEADER)?;
        Ok(RequestContext::new(tenant_id, actor_id))
    }
}

fn header_id<T: FromStr>(headers: &HeaderMap, name: &str) -> Result<Option<T>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .map(str::trim)
        .and_then(|value| value.parse().ok())
        .map(Some)
        .ok_or_else(|| ApiError::UnprocessableEntity(format!("header `{}` must be a UUID", name)))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Request};
    use carebridge_common::TenantId;

    use super::*;

    async fn extract(request: Request<()>) -> Result<RequestContext, ApiError> {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_headers_mean_platform_scope() {
        let ctx = extract(Request::new(())).await.unwrap();
        assert_eq!(ctx, RequestContext::platform());
    }

    #[tokio::test]
    async fn tenant_header_is_parsed() {
        let tenant = TenantId::generate();
        let mut request = Request::new(());
        request
            .headers_mut()
            .insert(TENANT_HEADER, HeaderValue::from_str(&tenant.to_string()).unwrap());

        assert_eq!(extract(request).await.unwrap().tenant_id, Some(tenant));
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let mut request = Request::new(());
        request
            .headers_mut()
            .insert(REVIEWER_HEADER, HeaderValue::from_static("not-a-uuid"));

        assert!(matches!(extract(request).await, Err(ApiError::UnprocessableEntity(_))));
    }
}
