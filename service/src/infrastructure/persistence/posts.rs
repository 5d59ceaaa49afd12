use carebridge_common::database::Database;
use carebridge_common::{
    BLOG_POSTS_TABLE_NAME, CREATED_FIELD_NAME, DraftSnapshot, ID_FIELD_NAME, PUBLISHED_FIELD_NAME,
    PostId, STATUS_FIELD_NAME, TENANT_ID_FIELD_NAME, TagId, TenantId, UPDATED_FIELD_NAME,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::types::Uuid;

use crate::domain::RepositoryError;
use crate::domain::posts::{Post, PostRepository, validate_snapshot};
use crate::infrastructure::persistence::{FromRow, plain_columns};

const CONTENT_COLUMNS: [&str; 9] = [
    "title",
    "slug",
    "excerpt",
    "content",
    STATUS_FIELD_NAME,
    "featured",
    "reading_time_minutes",
    "cover_image_url",
    "tag_ids",
];

const COLUMNS: [&str; 14] = [
    ID_FIELD_NAME,
    "title",
    "slug",
    "excerpt",
    "content",
    STATUS_FIELD_NAME,
    "featured",
    "reading_time_minutes",
    "cover_image_url",
    "tag_ids",
    TENANT_ID_FIELD_NAME,
    CREATED_FIELD_NAME,
    UPDATED_FIELD_NAME,
    PUBLISHED_FIELD_NAME,
];

#[derive(Clone)]
pub struct PostgresPostRepository {
    database: &'static Database,
}

impl PostgresPostRepository {
    pub fn new(database: &'static Database) -> Self {
        Self { database }
    }
}

/// Binds the content columns in `CONTENT_COLUMNS` order, empty slugs become NULL
fn bind_content<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    snapshot: DraftSnapshot,
    slug: Option<String>,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    query
        .bind(snapshot.title)
        .bind(slug)
        .bind(snapshot.excerpt)
        .bind(snapshot.content)
        .bind(snapshot.status.as_str())
        .bind(snapshot.featured)
        .bind(snapshot.reading_time_minutes.map(|minutes| minutes as i32))
        .bind(snapshot.cover_image_url)
        .bind(snapshot.tag_ids.iter().map(|tag| tag.as_uuid()).collect::<Vec<_>>())
}

impl PostRepository for PostgresPostRepository {
    async fn find_by_id(&self, id: PostId) -> Result<Post, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE \"{}\" = $1",
            plain_columns(&COLUMNS),
            BLOG_POSTS_TABLE_NAME,
            ID_FIELD_NAME
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.database.database_pool())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Post::from_row(&row)
    }

    async fn create(&self, tenant_id: Option<TenantId>, snapshot: DraftSnapshot) -> Result<Post, RepositoryError> {
        let slug = validate_snapshot(&snapshot)?.map(|slug| slug.into_inner());

        // $1..$9 content, $10 tenant
        let sql = format!(
            "INSERT INTO \"{table}\" ({content}, \"{tenant}\", \"{published}\")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, CASE WHEN $5 = 'published' THEN now() END)
            RETURNING {columns}",
            table = BLOG_POSTS_TABLE_NAME,
            content = plain_columns(&CONTENT_COLUMNS),
            tenant = TENANT_ID_FIELD_NAME,
            published = PUBLISHED_FIELD_NAME,
            columns = plain_columns(&COLUMNS),
        );

        let row = bind_content(sqlx::query(&sql), snapshot, slug)
            .bind(tenant_id.map(|tenant| tenant.as_uuid()))
            .fetch_one(self.database.database_pool())
            .await?;

        let post = Post::from_row(&row)?;
        tracing::info!(post_id = %post.id, "post created");
        Ok(post)
    }

    async fn update(&self, id: PostId, snapshot: DraftSnapshot) -> Result<Post, RepositoryError> {
        let slug = validate_snapshot(&snapshot)?.map(|slug| slug.into_inner());

        let assignments = CONTENT_COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("\"{}\" = ${}", column, index + 1))
            .collect::<Vec<_>>()
            .join(", ");

        // $1..$9 content, $10 id
        let sql = format!(
            "UPDATE \"{table}\"
            SET {assignments}, \"{updated}\" = now(),
                \"{published}\" = COALESCE(\"{published}\", CASE WHEN $5 = 'published' THEN now() END)
            WHERE \"{id}\" = $10
            RETURNING {columns}",
            table = BLOG_POSTS_TABLE_NAME,
            updated = UPDATED_FIELD_NAME,
            published = PUBLISHED_FIELD_NAME,
            id = ID_FIELD_NAME,
            columns = plain_columns(&COLUMNS),
        );

        let row = bind_content(sqlx::query(&sql), snapshot, slug)
            .bind(id.as_uuid())
            .fetch_optional(self.database.database_pool())
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let post = Post::from_row(&row)?;
        tracing::debug!(post_id = %post.id, "post saved");
        Ok(post)
    }
}

impl FromRow for Post {
    fn from_row(row: &PgRow) -> Result<Self, RepositoryError> {
        let status: String = row.try_get(STATUS_FIELD_NAME)?;
        let slug: Option<String> = row.try_get("slug")?;
        let reading_time: Option<i32> = row.try_get("reading_time_minutes")?;
        let tag_ids: Vec<Uuid> = row.try_get("tag_ids")?;
        let tenant_id: Option<Uuid> = row.try_get(TENANT_ID_FIELD_NAME)?;
        let updated_at: DateTime<Utc> = row.try_get(UPDATED_FIELD_NAME)?;

        Ok(Post {
            id: row.try_get::<Uuid, _>(ID_FIELD_NAME)?.into(),
            tenant_id: tenant_id.map(Into::into),
            snapshot: DraftSnapshot {
                title: row.try_get("title")?,
                slug: slug.unwrap_or_default(),
                excerpt: row.try_get("excerpt")?,
                content: row.try_get("content")?,
                status: status.parse()?,
                featured: row.try_get("featured")?,
                reading_time_minutes: reading_time.map(|minutes| minutes.max(0) as u32),
                cover_image_url: row.try_get("cover_image_url")?,
                tag_ids: tag_ids.into_iter().map(TagId::from).collect(),
                saved_at: updated_at,
            },
            created_at: row.try_get(CREATED_FIELD_NAME)?,
            updated_at,
            published_at: row.try_get(PUBLISHED_FIELD_NAME)?,
        })
    }
}
