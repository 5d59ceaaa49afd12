pub mod domain;
mod infrastructure;
pub mod test_utils;

// Persisted table names

pub const LINK_REQUESTS_TABLE_NAME: &str = "link_requests";
pub const INSTITUTION_LINKS_TABLE_NAME: &str = "institution_links";
pub const BLOG_POSTS_TABLE_NAME: &str = "blog_posts";

// Persisted field names shared by every table

pub const ID_FIELD_NAME: &str = "id";
pub const TENANT_ID_FIELD_NAME: &str = "tenant_id";
pub const USER_ID_FIELD_NAME: &str = "user_id";
pub const INSTITUTION_ID_FIELD_NAME: &str = "institution_id";
pub const STATUS_FIELD_NAME: &str = "status";

pub const CREATED_FIELD_NAME: &str = "created_at";
pub const UPDATED_FIELD_NAME: &str = "updated_at";
pub const PUBLISHED_FIELD_NAME: &str = "published_at";
pub const REVIEWED_FIELD_NAME: &str = "reviewed_at";
pub const REVIEWED_BY_FIELD_NAME: &str = "reviewed_by";

// expose domain module

pub use domain::*;

// expose database module

pub use infrastructure::database;
pub use infrastructure::database::connect as connect_to_database;
