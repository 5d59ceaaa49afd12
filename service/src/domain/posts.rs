use std::future::Future;

use carebridge_common::{DraftSnapshot, PostId, PostStatus, Slug, TenantId};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::RepositoryError;

/// Durable copy of a blog post
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub tenant_id: Option<TenantId>,
    /// Saved state, `saved_at` equals `updated_at`
    pub snapshot: DraftSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

pub trait PostRepository: Clone + Send + Sync + 'static {
    fn find_by_id(
        &self,
        id: PostId,
    ) -> impl Future<Output = Result<Post, RepositoryError>> + Send;

    fn create(
        &self,
        tenant_id: Option<TenantId>,
        snapshot: DraftSnapshot,
    ) -> impl Future<Output = Result<Post, RepositoryError>> + Send;

    /// Replace the saved state. `published_at` is stamped on the first publish and kept afterwards.
    fn update(
        &self,
        id: PostId,
        snapshot: DraftSnapshot,
    ) -> impl Future<Output = Result<Post, RepositoryError>> + Send;
}

/// Checks a snapshot before it is stored durably.
///
/// Drafts may be incomplete. A non-empty slug must always be well formed, and
/// a published post needs a title and a slug.
pub fn validate_snapshot(snapshot: &DraftSnapshot) -> Result<Option<Slug>, RepositoryError> {
    let slug = if snapshot.slug.trim().is_empty() {
        None
    } else {
        let slug = Slug::try_new(snapshot.slug.clone())
            .map_err(|e| RepositoryError::ValidationFailed(format!("slug: {}", e)))?;
        Some(slug)
    };

    if snapshot.status == PostStatus::Published {
        if snapshot.title.trim().is_empty() {
            return Err(RepositoryError::ValidationFailed(
                "a published post needs a title".to_string(),
            ));
        }
        if slug.is_none() {
            return Err(RepositoryError::ValidationFailed(
                "a published post needs a slug".to_string(),
            ));
        }
    }

    Ok(slug)
}
