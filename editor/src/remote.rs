use std::future::Future;
use std::time::Duration;

use carebridge_common::{DraftSnapshot, PostId, PostStatus, TagId, TenantId};
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Header carrying the acting tenant, as read by the service
const TENANT_HEADER: &str = "x-tenant-id";

/// Result of a durable save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedPost {
    pub id: PostId,
    pub saved_at: DateTime<Utc>,
}

/// Durable storage of posts.
pub trait DurablePostStore: Clone + Send + Sync + 'static {
    fn load(&self, id: PostId) -> impl Future<Output = Result<DraftSnapshot, RemoteError>> + Send;

    /// Creates the post when `id` is `None`, replaces it otherwise
    fn save(
        &self,
        id: Option<PostId>,
        snapshot: DraftSnapshot,
    ) -> impl Future<Output = Result<SavedPost, RemoteError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpPostStoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub timeout_secs: u64,
}

impl Default for HttpPostStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            tenant_id: None,
            timeout_secs: 10,
        }
    }
}

/// [`DurablePostStore`] backed by the service's `/api/posts` endpoints
#[derive(Debug, Clone)]
pub struct HttpPostStore {
    client: Client,
    base_url: String,
}

impl HttpPostStore {
    pub fn new(config: HttpPostStoreConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| RemoteError::InvalidConfig("api key is not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(tenant_id) = config.tenant_id {
            let value = HeaderValue::from_str(&tenant_id.to_string())
                .map_err(|e| RemoteError::InvalidConfig(e.to_string()))?;
            headers.insert(TENANT_HEADER, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, id: Option<PostId>) -> String {
        match id {
            Some(id) => format!("{}/api/posts/{}", self.base_url, id),
            None => format!("{}/api/posts", self.base_url),
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<PostBody, RemoteError> {
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected { status, message });
        }

        Ok(response.json().await?)
    }
}

impl DurablePostStore for HttpPostStore {
    async fn load(&self, id: PostId) -> Result<DraftSnapshot, RemoteError> {
        let response = self.client.get(self.url(Some(id))).send().await?;
        let body = self.handle_response(response).await?;
        Ok(body.into_snapshot())
    }

    async fn save(&self, id: Option<PostId>, snapshot: DraftSnapshot) -> Result<SavedPost, RemoteError> {
        let body = SavePostBody::from(&snapshot);
        let request = match id {
            Some(_) => self.client.put(self.url(id)),
            None => self.client.post(self.url(None)),
        };

        let response = request.json(&body).send().await?;
        let saved = self.handle_response(response).await?;
        tracing::debug!(post_id = %saved.id, "post saved");
        Ok(SavedPost {
            id: saved.id,
            saved_at: saved.updated_at,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SavePostBody<'a> {
    title: &'a str,
    slug: &'a str,
    excerpt: &'a str,
    content: &'a str,
    status: PostStatus,
    featured: bool,
    reading_time_minutes: Option<u32>,
    cover_image_url: Option<&'a str>,
    tag_ids: &'a [TagId],
}

impl<'a> From<&'a DraftSnapshot> for SavePostBody<'a> {
    fn from(value: &'a DraftSnapshot) -> Self {
        Self {
            title: &value.title,
            slug: &value.slug,
            excerpt: &value.excerpt,
            content: &value.content,
            status: value.status,
            featured: value.featured,
            reading_time_minutes: value.reading_time_minutes,
            cover_image_url: value.cover_image_url.as_deref(),
            tag_ids: &value.tag_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostBody {
    id: PostId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    excerpt: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    status: PostStatus,
    #[serde(default)]
    featured: bool,
    reading_time_minutes: Option<u32>,
    cover_image_url: Option<String>,
    #[serde(default)]
    tag_ids: Vec<TagId>,
    updated_at: DateTime<Utc>,
}

impl PostBody {
    fn into_snapshot(self) -> DraftSnapshot {
        DraftSnapshot {
            title: self.title,
            slug: self.slug,
            excerpt: self.excerpt,
            content: self.content,
            status: self.status,
            featured: self.featured,
            reading_time_minutes: self.reading_time_minutes,
            cover_image_url: self.cover_image_url,
            tag_ids: self.tag_ids,
            saved_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn urls_target_the_posts_api() {
        let store = HttpPostStore::new(HttpPostStoreConfig {
            base_url: "http://api.example.org/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let id = PostId::generate();

        assert_eq!(store.url(None), "http://api.example.org/api/posts");
        assert_eq!(store.url(Some(id)), format!("http://api.example.org/api/posts/{}", id));
    }

    #[test]
    fn invalid_api_key_is_a_configuration_error() {
        let result = HttpPostStore::new(HttpPostStoreConfig {
            api_key: Some("line\nbreak".to_string()),
            ..Default::default()
        });

        assert!(matches!(result, Err(RemoteError::InvalidConfig(_))));
    }

    #[test]
    fn service_response_becomes_a_snapshot() {
        let id = PostId::generate();
        let body: PostBody = serde_json::from_value(json!({
            "id": id,
            "tenantId": null,
            "title": "Sleep and you",
            "slug": "sleep-and-you",
            "excerpt": "",
            "content": "Rest well",
            "status": "published",
            "featured": true,
            "readingTimeMinutes": 1,
            "coverImageUrl": null,
            "tagIds": [],
            "createdAt": "2026-01-01T10:00:00Z",
            "updatedAt": "2026-01-02T10:00:00Z",
            "publishedAt": "2026-01-02T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(body.id, id);
        let snapshot = body.into_snapshot();
        assert_eq!(snapshot.status, PostStatus::Published);
        assert_eq!(snapshot.saved_at.to_rfc3339(), "2026-01-02T10:00:00+00:00");
    }

    #[test]
    fn save_body_uses_the_service_field_names() {
        let mut snapshot = DraftSnapshot::blank(Utc::now());
        snapshot.cover_image_url = Some("https://cdn.example.org/a.png".to_string());

        let value = serde_json::to_value(SavePostBody::from(&snapshot)).unwrap();

        assert_eq!(value["coverImageUrl"], "https://cdn.example.org/a.png");
        assert_eq!(value["status"], "draft");
        assert!(value.get("savedAt").is_none());
    }
}
