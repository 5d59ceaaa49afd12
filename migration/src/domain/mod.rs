use carebridge_common::{
    BLOG_POSTS_TABLE_NAME, CREATED_FIELD_NAME, ID_FIELD_NAME, INSTITUTION_ID_FIELD_NAME,
    INSTITUTION_LINKS_TABLE_NAME, LINK_REQUESTS_TABLE_NAME, PUBLISHED_FIELD_NAME,
    REVIEWED_BY_FIELD_NAME, REVIEWED_FIELD_NAME, STATUS_FIELD_NAME, TENANT_ID_FIELD_NAME,
    UPDATED_FIELD_NAME, USER_ID_FIELD_NAME,
};

use crate::domain::tables::{Column, ColumnType, ForeignKeyConstraint, Index, OnDelete, Table};

pub mod migration;
pub mod persistence;
pub mod tables;

/// Tenant-less links are compared against this id in the unique index,
/// NULLs would otherwise never collide.
const NIL_TENANT: &str = "'00000000-0000-0000-0000-000000000000'::uuid";

/// Switches applied while deriving the schema
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaOptions {
    /// Adds a partial unique index so storage rejects a second active link
    /// for the same (user, institution, role, tenant)
    pub enforce_unique_active_links: bool,
}

/// returns database tables, sorted conform dependency order
pub fn required_tables(options: SchemaOptions) -> Vec<Table> {
    vec![
        link_requests_table(),
        institution_links_table(options),
        blog_posts_table(),
    ]
}

fn primary_key() -> Column {
    Column::primary_key(ID_FIELD_NAME, ColumnType::Uuid, Some("gen_random_uuid()"))
}

fn created_at() -> Column {
    Column::new(CREATED_FIELD_NAME, ColumnType::TimestampTZ, true, Some("now()"))
}

fn updated_at() -> Column {
    Column::new(UPDATED_FIELD_NAME, ColumnType::TimestampTZ, true, Some("now()"))
}

fn link_requests_table() -> Table {
    let columns = vec![
        primary_key(),
        Column::new(USER_ID_FIELD_NAME, ColumnType::Uuid, true, None),
        Column::new("user_name", ColumnType::Text, true, None),
        Column::new("user_email", ColumnType::Text, true, None),
        Column::new("user_category", ColumnType::Text, true, None)
            .one_of(&["student", "professional", "staff", "patient"]),
        Column::new(INSTITUTION_ID_FIELD_NAME, ColumnType::Uuid, true, None),
        Column::new("institution_name", ColumnType::Text, true, None),
        Column::new("institution_type", ColumnType::Text, true, None),
        Column::new("institution_is_partner", ColumnType::Boolean, true, Some("false")),
        Column::new("relationship_type", ColumnType::Text, false, None),
        Column::new("enrollment_type", ColumnType::Text, false, None),
        Column::new("message", ColumnType::Text, false, None),
        Column::new(STATUS_FIELD_NAME, ColumnType::Text, true, Some("'pending'"))
            .one_of(&["pending", "approved", "rejected"]),
        Column::new("review_notes", ColumnType::Text, false, None),
        Column::new(REVIEWED_FIELD_NAME, ColumnType::TimestampTZ, false, None),
        Column::new(REVIEWED_BY_FIELD_NAME, ColumnType::Uuid, false, None),
        created_at(),
        Column::new(TENANT_ID_FIELD_NAME, ColumnType::Uuid, false, None),
    ];

    let indexes = vec![
        Index::new(LINK_REQUESTS_TABLE_NAME, vec![STATUS_FIELD_NAME], false),
        Index::new(LINK_REQUESTS_TABLE_NAME, vec![TENANT_ID_FIELD_NAME], false),
        Index::new(
            LINK_REQUESTS_TABLE_NAME,
            vec![USER_ID_FIELD_NAME, INSTITUTION_ID_FIELD_NAME],
            false,
        ),
        Index::new(LINK_REQUESTS_TABLE_NAME, vec![CREATED_FIELD_NAME], false),
    ];

    Table::new(LINK_REQUESTS_TABLE_NAME.to_string(), columns, Vec::new(), indexes)
}

fn institution_links_table(options: SchemaOptions) -> Table {
    let columns = vec![
        primary_key(),
        Column::new(USER_ID_FIELD_NAME, ColumnType::Uuid, true, None),
        Column::new(INSTITUTION_ID_FIELD_NAME, ColumnType::Uuid, true, None),
        Column::new(TENANT_ID_FIELD_NAME, ColumnType::Uuid, false, None),
        Column::new("role", ColumnType::Text, true, None),
        Column::new("active", ColumnType::Boolean, true, Some("true")),
        Column::new("source_request_id", ColumnType::Uuid, false, None),
        created_at(),
        updated_at(),
    ];

    let foreign_keys = vec![ForeignKeyConstraint::new(
        INSTITUTION_LINKS_TABLE_NAME,
        "source_request_id",
        LINK_REQUESTS_TABLE_NAME,
        ID_FIELD_NAME,
        OnDelete::SetNull,
    )];

    let mut indexes = vec![
        Index::new(
            INSTITUTION_LINKS_TABLE_NAME,
            vec![USER_ID_FIELD_NAME, INSTITUTION_ID_FIELD_NAME, "active"],
            false,
        ),
        Index::new(INSTITUTION_LINKS_TABLE_NAME, vec!["source_request_id"], false),
    ];

    if options.enforce_unique_active_links {
        let tenant_expression = format!("COALESCE(\"{}\", {})", TENANT_ID_FIELD_NAME, NIL_TENANT);
        indexes.push(
            Index::new(
                INSTITUTION_LINKS_TABLE_NAME,
                vec!["\"user_id\"", "\"institution_id\"", "\"role\"", &tenant_expression],
                true,
            )
            .named(format!("{}_one_active_idx", INSTITUTION_LINKS_TABLE_NAME))
            .partial("\"active\""),
        );
    }

    Table::new(
        INSTITUTION_LINKS_TABLE_NAME.to_string(),
        columns,
        foreign_keys,
        indexes,
    )
}

fn blog_posts_table() -> Table {
    let columns = vec![
        primary_key(),
        Column::new("title", ColumnType::Text, true, Some("''")),
        Column::new("slug", ColumnType::Text, false, None),
        Column::new("excerpt", ColumnType::Text, true, Some("''")),
        Column::new("content", ColumnType::Text, true, Some("''")),
        Column::new(STATUS_FIELD_NAME, ColumnType::Text, true, Some("'draft'"))
            .one_of(&["draft", "published"]),
        Column::new("featured", ColumnType::Boolean, true, Some("false")),
        Column::new("reading_time_minutes", ColumnType::Integer, false, None),
        Column::new("cover_image_url", ColumnType::Text, false, None),
        Column::new("tag_ids", ColumnType::UuidArray, true, Some("'{}'")),
        Column::new(TENANT_ID_FIELD_NAME, ColumnType::Uuid, false, None),
        created_at(),
        updated_at(),
        Column::new(PUBLISHED_FIELD_NAME, ColumnType::TimestampTZ, false, None),
    ];

    let indexes = vec![
        Index::new(BLOG_POSTS_TABLE_NAME, vec!["slug"], true)
            .partial(format!("\"{}\" = 'published'", STATUS_FIELD_NAME)),
        Index::new(BLOG_POSTS_TABLE_NAME, vec![TENANT_ID_FIELD_NAME], false),
    ];

    Table::new(BLOG_POSTS_TABLE_NAME.to_string(), columns, Vec::new(), indexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_ordered_by_dependency() {
        let names = required_tables(SchemaOptions::default())
            .into_iter()
            .map(|t| t.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["link_requests", "institution_links", "blog_posts"]);
    }

    #[test]
    fn unique_active_link_index_is_opt_in() {
        let advisory = institution_links_table(SchemaOptions::default());
        assert!(advisory.indexes.iter().all(|i| !i.unique));

        let enforced = institution_links_table(SchemaOptions {
            enforce_unique_active_links: true,
        });
        let index = enforced
            .indexes
            .iter()
            .find(|i| i.unique)
            .expect("unique index present");
        assert_eq!(index.name, "institution_links_one_active_idx");
        assert_eq!(index.predicate.as_deref(), Some("\"active\""));
    }
}
