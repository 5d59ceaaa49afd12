use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use carebridge_common::PostId;
use chrono::Utc;

use crate::domain::posts::{Post, PostRepository};
use crate::domain::{AppState, RequestContext};
use crate::infrastructure::http::api::{ApiError, ApiSuccess};
use crate::infrastructure::http::handlers::posts::dto::{PostResponse, SavePostRequest};

mod dto;

fn parse_id(id: &str) -> Result<PostId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::UnprocessableEntity(format!("`{}` is not a valid post id", id)))
}

/// Posts of another tenant are reported as missing
async fn visible_post<S: AppState>(state: &S, ctx: &RequestContext, id: PostId) -> Result<Post, ApiError> {
    let post = state.posts().find_by_id(id).await?;
    if !ctx.can_see(post.tenant_id) {
        return Err(ApiError::NotFound);
    }
    Ok(post)
}

pub async fn find_post<S: AppState>(
    Path(id): Path<String>,
    State(state): State<S>,
    ctx: RequestContext,
) -> Result<ApiSuccess<PostResponse>, ApiError> {
    let id = parse_id(&id)?;
    let post = visible_post(&state, &ctx, id).await?;
    Ok(ApiSuccess::new(StatusCode::OK, post.into()))
}

pub async fn create_post<S: AppState>(
    State(state): State<S>,
    ctx: RequestContext,
    Json(body): Json<SavePostRequest>,
) -> Result<ApiSuccess<PostResponse>, ApiError> {
    let snapshot = body.into_snapshot(Utc::now());
    let post = state.posts().create(ctx.tenant_id, snapshot).await?;
    Ok(ApiSuccess::new(StatusCode::CREATED, post.into()))
}

pub async fn update_post<S: AppState>(
    Path(id): Path<String>,
    State(state): State<S>,
    ctx: RequestContext,
    Json(body): Json<SavePostRequest>,
) -> Result<ApiSuccess<PostResponse>, ApiError> {
    let id = parse_id(&id)?;
    visible_post(&state, &ctx, id).await?;

    let post = state.posts().update(id, body.into_snapshot(Utc::now())).await?;
    Ok(ApiSuccess::new(StatusCode::OK, post.into()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use carebridge_common::TenantId;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::infrastructure::http::api_router;
    use crate::infrastructure::http::context::TENANT_HEADER;
    use crate::infrastructure::memory::{TestState, test_state};

    async fn call(state: &TestState, request: Request<Body>) -> (StatusCode, Value) {
        let response = api_router(state.app.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn send(method: &str, uri: &str, tenant: Option<TenantId>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(tenant) = tenant {
            builder = builder.header(TENANT_HEADER, tenant.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn create_then_publish() {
        let state = test_state();
        let (status, created) = call(
            &state,
            send("POST", "/api/posts", None, json!({"title": "Exam stress", "content": "breathe"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "draft");
        assert_eq!(created["publishedAt"], Value::Null);

        let uri = format!("/api/posts/{}", created["id"].as_str().unwrap());
        let (status, updated) = call(
            &state,
            send(
                "PUT",
                &uri,
                None,
                json!({"title": "Exam stress", "slug": "Exam-Stress", "status": "published"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["slug"], "exam-stress");
        assert!(updated["publishedAt"].is_string());
    }

    #[tokio::test]
    async fn publishing_without_slug_is_unprocessable() {
        let state = test_state();
        let (status, body) = call(
            &state,
            send("POST", "/api/posts", None, json!({"title": "Hello", "status": "published"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status_code"], 422);
    }

    #[tokio::test]
    async fn other_tenants_posts_are_hidden() {
        let state = test_state();
        let owner = TenantId::generate();
        let (_, created) = call(
            &state,
            send("POST", "/api/posts", Some(owner), json!({"title": "Private"})),
        )
        .await;
        let uri = format!("/api/posts/{}", created["id"].as_str().unwrap());

        let request = Request::get(&uri)
            .header(TENANT_HEADER, TenantId::generate().to_string())
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&state, send("PUT", &uri, Some(TenantId::generate()), json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&state, Request::get(&uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tenantId"], owner.to_string());
    }
}
