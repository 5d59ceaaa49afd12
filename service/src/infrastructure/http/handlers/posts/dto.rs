use carebridge_common::{DraftSnapshot, PostId, PostStatus, TagId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::posts::Post;

/// Body of `POST /api/posts` and `PUT /api/posts/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub featured: bool,
    pub reading_time_minutes: Option<u32>,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

impl SavePostRequest {
    /// Snapshot to store. Missing reading times are estimated from the body.
    pub fn into_snapshot(self, now: DateTime<Utc>) -> DraftSnapshot {
        let mut snapshot = DraftSnapshot {
            title: self.title,
            slug: self.slug,
            excerpt: self.excerpt,
            content: self.content,
            status: self.status,
            featured: self.featured,
            reading_time_minutes: self.reading_time_minutes,
            cover_image_url: self.cover_image_url.filter(|url| !url.trim().is_empty()),
            tag_ids: self.tag_ids,
            saved_at: now,
        };
        if snapshot.reading_time_minutes.is_none() {
            snapshot.reading_time_minutes = snapshot.estimated_reading_time();
        }
        snapshot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    id: PostId,
    tenant_id: Option<TenantId>,
    title: String,
    slug: String,
    excerpt: String,
    content: String,
    status: PostStatus,
    featured: bool,
    reading_time_minutes: Option<u32>,
    cover_image_url: Option<String>,
    tag_ids: Vec<TagId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

impl From<Post> for PostResponse {
    fn from(value: Post) -> Self {
        let snapshot = value.snapshot;
        Self {
            id: value.id,
            tenant_id: value.tenant_id,
            title: snapshot.title,
            slug: snapshot.slug,
            excerpt: snapshot.excerpt,
            content: snapshot.content,
            status: snapshot.status,
            featured: snapshot.featured,
            reading_time_minutes: snapshot.reading_time_minutes,
            cover_image_url: snapshot.cover_image_url,
            tag_ids: snapshot.tag_ids,
            created_at: value.created_at,
            updated_at: value.updated_at,
            published_at: value.published_at,
        }
    }
}
